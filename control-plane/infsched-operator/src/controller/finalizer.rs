use std::str::FromStr;

use kube::ResourceExt;
use tracing::{debug, info};

use crate::crd::InferenceScheduler;
use crate::error::StoreError;
use crate::naming::child_objects;
use crate::registry::TypeRegistry;
use crate::store::ObjectStore;

pub const FINALIZER: &str = "llm.llm-d.io/finalizer";

/// How children are removed before the finalizer is released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Leave it to owner-reference garbage collection.
    #[default]
    Cascade,
    /// Delete every child by name, newest first.
    Sweep,
}

impl FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(CleanupPolicy::Cascade),
            "sweep" => Ok(CleanupPolicy::Sweep),
            other => Err(format!(
                "unknown cleanup mode '{other}' (expected cascade or sweep)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Marker already gone; nothing was done.
    NotPresent,
    Released,
}

pub fn has_finalizer(root: &InferenceScheduler) -> bool {
    root.finalizers().iter().any(|f| f == FINALIZER)
}

/// Attach the marker if missing. Returns true when a write was issued.
pub async fn ensure_finalizer(
    store: &dyn ObjectStore,
    root: &InferenceScheduler,
) -> Result<bool, StoreError> {
    if has_finalizer(root) {
        return Ok(false);
    }
    let mut finals = root.finalizers().to_vec();
    finals.push(FINALIZER.to_string());
    info!(ns = %root.namespace().unwrap_or_default(), name = %root.name_any(), "adding finalizer");
    store.set_finalizers(root, finals).await?;
    Ok(true)
}

/// Run cleanup for a deleting root and drop our marker.
pub async fn finalize(
    store: &dyn ObjectStore,
    registry: &TypeRegistry,
    root: &InferenceScheduler,
    policy: CleanupPolicy,
) -> Result<FinalizeOutcome, StoreError> {
    if !has_finalizer(root) {
        return Ok(FinalizeOutcome::NotPresent);
    }
    let ns = root.namespace().unwrap_or_default();
    let name = root.name_any();

    if policy == CleanupPolicy::Sweep {
        for (rt, child) in child_objects(&name).into_iter().rev() {
            let entry = registry.entry(rt);
            let child_ns = entry.namespaced.then_some(ns.as_str());
            match store.delete(&entry.api, child_ns, &child).await {
                Ok(()) => debug!(kind = %rt, name = %child, "deleted child"),
                Err(e) if e.is_not_found() => {}
                Err(StoreError::NoMatchingType(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    let remaining: Vec<String> = root
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();
    info!(%ns, %name, ?policy, "removing finalizer");
    store.set_finalizers(root, remaining).await?;
    Ok(FinalizeOutcome::Released)
}
