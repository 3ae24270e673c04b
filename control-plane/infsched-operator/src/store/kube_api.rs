use async_trait::async_trait;
use kube::api::{
    Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use serde_json::{Value, json};
use tracing::trace;

use super::{ObjectStore, object_key};
use crate::crd::{InferenceScheduler, InferenceSchedulerStatus};
use crate::error::StoreError;

/// Optional status fields that must be nulled explicitly in a merge patch.
const CLEARABLE_STATUS_FIELDS: [&str; 3] =
    ["phase", "prerequisiteMessage", "observedGeneration"];

/// Object store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic(&self, api: &ApiResource, ns: Option<&str>) -> Api<DynamicObject> {
        match ns {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, api),
            None => Api::all_with(self.client.clone(), api),
        }
    }
}

/// A 404 on a collection means the type itself is not served.
fn missing_type(api: &ApiResource, e: kube::Error) -> StoreError {
    match StoreError::from(e) {
        StoreError::NotFound(_) => {
            StoreError::NoMatchingType(format!("{}/{}", api.api_version, api.kind))
        }
        other => other,
    }
}

pub(crate) fn status_patch(status: &InferenceSchedulerStatus) -> Result<Value, StoreError> {
    let mut body = serde_json::to_value(status)?;
    if let Some(map) = body.as_object_mut() {
        for field in CLEARABLE_STATUS_FIELDS {
            map.entry(field).or_insert(Value::Null);
        }
        map.entry("conditions").or_insert_with(|| json!([]));
    }
    Ok(json!({ "status": body }))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_root(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<InferenceScheduler>, StoreError> {
        let api: Api<InferenceScheduler> = Api::namespaced(self.client.clone(), ns);
        Ok(api.get_opt(name).await?)
    }

    async fn set_finalizers(
        &self,
        root: &InferenceScheduler,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let ns = root.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<InferenceScheduler> = Api::namespaced(self.client.clone(), &ns);
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": root.resource_version(),
            }
        });
        api.patch(&root.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn write_status(
        &self,
        ns: &str,
        name: &str,
        status: &InferenceSchedulerStatus,
    ) -> Result<(), StoreError> {
        let api: Api<InferenceScheduler> = Api::namespaced(self.client.clone(), ns);
        let patch = status_patch(status)?;
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError> {
        let found = self.dynamic(api, ns).get_opt(name).await?;
        found.map(|o| serde_json::to_value(&o)).transpose().map_err(Into::into)
    }

    async fn create(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        let data: DynamicObject = serde_json::from_value(obj.clone())?;
        trace!(key = %object_key(api, ns, &data.name_any()), "create");
        let created = self
            .dynamic(api, ns)
            .create(&PostParams::default(), &data)
            .await
            .map_err(|e| missing_type(api, e))?;
        Ok(serde_json::to_value(&created)?)
    }

    async fn replace(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        let data: DynamicObject = serde_json::from_value(obj.clone())?;
        trace!(key = %object_key(api, ns, name), "replace");
        let replaced = self
            .dynamic(api, ns)
            .replace(name, &PostParams::default(), &data)
            .await?;
        Ok(serde_json::to_value(&replaced)?)
    }

    async fn delete(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        trace!(key = %object_key(api, ns, name), "delete");
        self.dynamic(api, ns)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn list_names(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<String>, StoreError> {
        let mut lp = ListParams::default();
        if let Some(limit) = limit {
            lp = lp.limit(limit);
        }
        let list = self
            .dynamic(api, ns)
            .list(&lp)
            .await
            .map_err(|e| missing_type(api, e))?;
        Ok(list.items.iter().map(|o| o.name_any()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Phase;

    #[test]
    fn status_patch_nulls_cleared_fields() {
        let status = InferenceSchedulerStatus {
            phase: Some(Phase::Deploying),
            ..Default::default()
        };
        let patch = status_patch(&status).unwrap();
        assert_eq!(patch["status"]["phase"], "Deploying");
        assert!(patch["status"]["prerequisiteMessage"].is_null());
        assert!(
            patch["status"]
                .as_object()
                .unwrap()
                .contains_key("prerequisiteMessage")
        );
        assert_eq!(patch["status"]["conditions"], json!([]));
    }
}
