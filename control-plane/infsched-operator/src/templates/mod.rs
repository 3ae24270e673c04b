//! Pure builders turning a [`DesiredState`] into wire objects.
//!
//! Every builder is deterministic and performs no I/O. The owner reference is
//! carried next to the payload and attached by the upsert step, not here.

pub mod endpoint_picker;
pub mod gateway_api;
pub mod model_server;
pub mod routing_config;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::Serialize;

use crate::desired::DesiredState;
use crate::naming::{ChildKind, child_name};
use crate::registry::ResourceType;

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("failed to encode {kind} payload: {source}")]
    Json {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to render routing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// One object to converge: where it lives, who owns it and its full payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDescriptor {
    pub resource: ResourceType,
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    pub payload: serde_json::Value,
}

impl ResourceDescriptor {
    pub fn from_typed<T: Serialize>(
        resource: ResourceType,
        name: String,
        desired: &DesiredState,
        typed: &T,
    ) -> Result<Self, TemplateError> {
        let payload = serde_json::to_value(typed).map_err(|source| {
            TemplateError::Json {
                kind: resource.kind(),
                source,
            }
        })?;
        Ok(Self {
            resource,
            name,
            namespace: desired.namespace.clone(),
            owner: desired.owner.clone(),
            payload,
        })
    }
}

/// Build every descriptor of one child kind, in creation order.
pub fn build(
    kind: ChildKind,
    desired: &DesiredState,
) -> Result<Vec<ResourceDescriptor>, TemplateError> {
    match kind {
        ChildKind::Workload => Ok(vec![model_server::deployment(desired)?]),
        ChildKind::AccessPoint => Ok(vec![model_server::service(desired)?]),
        ChildKind::RoutingIdentity => endpoint_picker::identity(desired),
        ChildKind::RoutingConfig => Ok(vec![routing_config::config_map(desired)?]),
        ChildKind::RoutingWorkload => Ok(vec![endpoint_picker::deployment(desired)?]),
        ChildKind::RoutingAccessPoint => Ok(vec![endpoint_picker::service(desired)?]),
        ChildKind::Pool => Ok(vec![gateway_api::inference_pool(desired)?]),
        ChildKind::Gateway => Ok(vec![gateway_api::gateway(desired)?]),
        ChildKind::Route => Ok(vec![gateway_api::http_route(desired)?]),
    }
}

/// Build the whole child set; used to compare passes.
pub fn build_all(desired: &DesiredState) -> Result<Vec<ResourceDescriptor>, TemplateError> {
    let mut out = Vec::new();
    for kind in ChildKind::ALL {
        out.extend(build(kind, desired)?);
    }
    Ok(out)
}

pub(crate) fn meta(
    desired: &DesiredState,
    kind: ChildKind,
    labels: Option<BTreeMap<String, String>>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(child_name(&desired.name, kind)),
        namespace: Some(desired.namespace.clone()),
        labels,
        ..Default::default()
    }
}

pub(crate) fn labels<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::desired;
    use super::*;
    use crate::naming::child_objects;

    #[test]
    fn build_all_matches_naming_contract() {
        let d = desired();
        let all = build_all(&d).unwrap();
        let got: Vec<_> = all.iter().map(|r| (r.resource, r.name.clone())).collect();
        assert_eq!(got, child_objects("llama"));
        for r in &all {
            assert_eq!(r.payload["metadata"]["name"], r.name.as_str());
            assert_eq!(r.payload["metadata"]["namespace"], "models");
            assert_eq!(r.payload["kind"], r.resource.kind());
            assert!(r.payload["metadata"].get("ownerReferences").is_none());
            assert_eq!(r.owner.uid, "uid-1");
        }
    }

    #[test]
    fn builders_are_deterministic() {
        let d = desired();
        assert_eq!(build_all(&d).unwrap(), build_all(&d).unwrap());
    }
}
