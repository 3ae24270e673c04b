use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::desired::DesiredState;
use crate::error::StoreError;
use crate::registry::{ResourceType, TypeRegistry};
use crate::store::ObjectStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrerequisiteOutcome {
    Satisfied,
    /// Human readable items in probe order, without duplicates.
    Missing(Vec<String>),
}

impl PrerequisiteOutcome {
    /// `missing prerequisites: a; b`, or `None` when satisfied.
    pub fn message(&self) -> Option<String> {
        match self {
            PrerequisiteOutcome::Satisfied => None,
            PrerequisiteOutcome::Missing(items) => {
                Some(format!("missing prerequisites: {}", items.join("; ")))
            }
        }
    }
}

fn missing_class_message(class: &str) -> String {
    format!(
        "GatewayClass '{}' (install gateway implementation: kgateway, istio, or gke)",
        class
    )
}

/// Probe the cluster for every capability the deployment depends on.
///
/// A type that is not installed is reported as missing; any other store
/// failure aborts validation and is returned.
#[instrument(skip_all, fields(class = %desired.gateway.class_name.as_str()))]
pub async fn validate(
    store: &dyn ObjectStore,
    registry: &TypeRegistry,
    desired: &DesiredState,
) -> Result<PrerequisiteOutcome, StoreError> {
    let mut missing: Vec<String> = Vec::new();
    let mut reported_bundles: HashSet<&'static str> = HashSet::new();
    let mut class_type_present = false;

    for cap in registry.capabilities() {
        let api = registry.api_resource(cap.resource);
        match store.list_names(api, None, Some(1)).await {
            Ok(_) => {
                if cap.resource == ResourceType::GatewayClass {
                    class_type_present = true;
                }
            }
            Err(StoreError::NoMatchingType(_)) => {
                debug!(kind = %cap.resource, "capability type not installed");
                if reported_bundles.insert(cap.bundle) {
                    missing.push(cap.missing_message.to_string());
                }
            }
            Err(e) => return Err(e),
        }
    }

    if class_type_present {
        let class = desired.gateway.class_name.as_str();
        let api = registry.api_resource(ResourceType::GatewayClass);
        let installed = store.list_names(api, None, None).await?;
        if !installed.iter().any(|c| c == class) {
            missing.push(missing_class_message(class));
        }
    }

    let mut seen = HashSet::new();
    missing.retain(|m| seen.insert(m.clone()));

    if missing.is_empty() {
        Ok(PrerequisiteOutcome::Satisfied)
    } else {
        Ok(PrerequisiteOutcome::Missing(missing))
    }
}
