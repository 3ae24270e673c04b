use k8s_openapi::api::apps::v1::Deployment;
use serde_json::Value;

use crate::error::StoreError;
use crate::registry::{ResourceType, TypeRegistry};
use crate::store::ObjectStore;

/// Point-in-time replica snapshot of a workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkloadReadiness {
    pub present: bool,
    pub desired: i32,
    pub ready: i32,
}

impl WorkloadReadiness {
    pub const MISSING: WorkloadReadiness = WorkloadReadiness {
        present: false,
        desired: 0,
        ready: 0,
    };

    pub fn is_ready(&self) -> bool {
        self.present && self.ready == self.desired
    }

    pub fn summary(&self) -> String {
        if self.present {
            format!("{}/{} replicas ready", self.ready, self.desired)
        } else {
            "workload not found".to_string()
        }
    }

    pub fn from_object(obj: &Value) -> Result<Self, StoreError> {
        let dep: Deployment = serde_json::from_value(obj.clone())?;
        Ok(Self {
            present: true,
            desired: dep.spec.and_then(|s| s.replicas).unwrap_or(1),
            ready: dep.status.and_then(|s| s.ready_replicas).unwrap_or(0),
        })
    }
}

pub async fn probe_workload(
    store: &dyn ObjectStore,
    registry: &TypeRegistry,
    ns: &str,
    name: &str,
) -> Result<WorkloadReadiness, StoreError> {
    let api = registry.api_resource(ResourceType::Deployment);
    match store.get(api, Some(ns), name).await? {
        Some(obj) => WorkloadReadiness::from_object(&obj),
        None => Ok(WorkloadReadiness::MISSING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dep(spec_replicas: Option<i32>, ready: Option<i32>) -> Value {
        let mut v = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "d"},
            "spec": {"selector": {}, "template": {}}
        });
        if let Some(r) = spec_replicas {
            v["spec"]["replicas"] = json!(r);
        }
        if let Some(r) = ready {
            v["status"] = json!({"readyReplicas": r});
        }
        v
    }

    #[test]
    fn ready_only_when_counts_match() {
        assert!(WorkloadReadiness::from_object(&dep(Some(2), Some(2))).unwrap().is_ready());
        assert!(!WorkloadReadiness::from_object(&dep(Some(2), Some(1))).unwrap().is_ready());
    }

    #[test]
    fn absent_fields_use_defaults() {
        let r = WorkloadReadiness::from_object(&dep(None, None)).unwrap();
        assert_eq!((r.desired, r.ready), (1, 0));
        assert!(!r.is_ready());
        let r = WorkloadReadiness::from_object(&dep(None, Some(1))).unwrap();
        assert!(r.is_ready());
    }

    #[test]
    fn missing_workload_is_not_ready() {
        assert!(!WorkloadReadiness::MISSING.is_ready());
        assert_eq!(WorkloadReadiness::MISSING.summary(), "workload not found");
    }
}
