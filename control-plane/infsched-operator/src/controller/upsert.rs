use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::registry::{ResourceType, TypeRegistry};
use crate::store::ObjectStore;
use crate::templates::ResourceDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Service fields assigned by the API server that a full replace must keep.
const SERVICE_SERVER_FIELDS: [&str; 2] = ["clusterIP", "clusterIPs"];

/// Create the object, or replace it whole if it already exists.
pub async fn upsert(
    store: &dyn ObjectStore,
    registry: &TypeRegistry,
    desc: &ResourceDescriptor,
) -> Result<UpsertOutcome, StoreError> {
    let api = registry.api_resource(desc.resource);
    let ns = registry
        .entry(desc.resource)
        .namespaced
        .then_some(desc.namespace.as_str());
    let owner = serde_json::to_value(&desc.owner)?;

    match store.get(api, ns, &desc.name).await? {
        None => {
            let mut payload = desc.payload.clone();
            payload["metadata"]["ownerReferences"] = json!([owner]);
            store.create(api, ns, &payload).await?;
            debug!(kind = %desc.resource, name = %desc.name, "created");
            Ok(UpsertOutcome::Created)
        }
        Some(existing) => {
            let payload = merge_for_replace(desc, &existing, owner);
            store.replace(api, ns, &desc.name, &payload).await?;
            trace!(kind = %desc.resource, name = %desc.name, "replaced");
            Ok(UpsertOutcome::Replaced)
        }
    }
}

/// New payload plus what must survive from the stored object: the
/// resourceVersion precondition, foreign owner references and
/// server-assigned Service addresses.
fn merge_for_replace(desc: &ResourceDescriptor, existing: &Value, owner: Value) -> Value {
    let mut payload = desc.payload.clone();
    payload["metadata"]["resourceVersion"] =
        existing["metadata"]["resourceVersion"].clone();

    let mut refs: Vec<Value> = existing["metadata"]["ownerReferences"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    match refs.iter().position(|r| r["uid"] == owner["uid"]) {
        Some(i) => refs[i] = owner,
        None => refs.push(owner),
    }
    payload["metadata"]["ownerReferences"] = Value::Array(refs);

    if desc.resource == ResourceType::Service {
        for field in SERVICE_SERVER_FIELDS {
            let current = &existing["spec"][field];
            if !current.is_null() && payload["spec"][field].is_null() {
                payload["spec"][field] = current.clone();
            }
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "llm.llm-d.io/v1alpha1".into(),
            kind: "InferenceScheduler".into(),
            name: "demo".into(),
            uid: uid.into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn svc_desc() -> ResourceDescriptor {
        ResourceDescriptor {
            resource: ResourceType::Service,
            name: "demo-model-server-svc".into(),
            namespace: "ns".into(),
            owner: owner("u1"),
            payload: json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": {"name": "demo-model-server-svc", "namespace": "ns"},
                "spec": {"ports": [{"port": 8000}]}
            }),
        }
    }

    #[tokio::test]
    async fn first_call_creates_with_owner() {
        let reg = TypeRegistry::builtin();
        let store = MemoryStore::with_core_types(&reg);
        let out = upsert(&store, &reg, &svc_desc()).await.unwrap();
        assert_eq!(out, UpsertOutcome::Created);
        let stored = store
            .object(reg.api_resource(ResourceType::Service), Some("ns"), "demo-model-server-svc")
            .unwrap();
        assert_eq!(stored["metadata"]["ownerReferences"][0]["uid"], "u1");
        assert_eq!(stored["metadata"]["ownerReferences"][0]["controller"], true);
    }

    #[tokio::test]
    async fn second_call_is_a_logical_noop() {
        let reg = TypeRegistry::builtin();
        let store = MemoryStore::with_core_types(&reg);
        let desc = svc_desc();
        upsert(&store, &reg, &desc).await.unwrap();
        let out = upsert(&store, &reg, &desc).await.unwrap();
        assert_eq!(out, UpsertOutcome::Replaced);
        let last = store.writes().pop().unwrap();
        assert_eq!(last.op, StoreOp::Replace);
        assert!(!last.changed);
    }

    #[test]
    fn replace_keeps_foreign_owners_without_duplicating_ours() {
        let desc = svc_desc();
        let existing = json!({
            "metadata": {
                "resourceVersion": "7",
                "ownerReferences": [{"uid": "other"}, {"uid": "u1", "name": "old"}]
            },
            "spec": {"clusterIP": "10.0.0.9", "clusterIPs": ["10.0.0.9"]}
        });
        let owner = serde_json::to_value(&desc.owner).unwrap();
        let merged = merge_for_replace(&desc, &existing, owner);
        let refs = merged["metadata"]["ownerReferences"].as_array().unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0]["uid"], "other");
        assert_eq!(refs[1]["name"], "demo");
        assert_eq!(merged["metadata"]["resourceVersion"], "7");
        assert_eq!(merged["spec"]["clusterIP"], "10.0.0.9");
        assert_eq!(merged["spec"]["clusterIPs"], json!(["10.0.0.9"]));
    }

    #[tokio::test]
    async fn create_errors_propagate() {
        let reg = TypeRegistry::builtin();
        let store = MemoryStore::with_core_types(&reg);
        store.fail_on(StoreOp::Create, "Service", StoreError::Rejected("forbidden".into()));
        let err = upsert(&store, &reg, &svc_desc()).await.unwrap_err();
        assert_eq!(err, StoreError::Rejected("forbidden".into()));
    }
}
