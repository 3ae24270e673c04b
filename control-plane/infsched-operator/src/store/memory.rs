use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube::discovery::ApiResource;
use serde_json::{Value, json};
use tracing::trace;

use super::{ObjectStore, object_key};
use crate::crd::{InferenceScheduler, InferenceSchedulerSpec, InferenceSchedulerStatus};
use crate::error::StoreError;
use crate::registry::{ResourceType, TypeRegistry};

const ROOT_KIND: &str = "InferenceScheduler";

/// Operation kinds, used for failure injection and the write log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Replace,
    Delete,
    SetFinalizers,
    WriteStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    /// False when a replace or status write left the stored object as it was.
    pub changed: bool,
}

#[derive(Clone, Debug)]
struct InjectedFailure {
    op: StoreOp,
    kind: String,
    error: StoreError,
}

type TypeKey = (String, String);
type ObjectKey = (String, String, String, String);

#[derive(Default)]
struct State {
    types: BTreeSet<TypeKey>,
    roots: BTreeMap<(String, String), InferenceScheduler>,
    objects: BTreeMap<ObjectKey, Value>,
    next_rv: u64,
    next_uid: u64,
    next_ip: u32,
    auto_ready: bool,
    failures: Vec<InjectedFailure>,
    writes: Vec<WriteRecord>,
}

impl State {
    fn bump_rv(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn check(&self, op: StoreOp, kind: &str) -> Result<(), StoreError> {
        match self.failures.iter().find(|f| f.op == op && f.kind == kind) {
            Some(f) => Err(f.error.clone()),
            None => Ok(()),
        }
    }

    fn require_type(&self, api: &ApiResource) -> Result<(), StoreError> {
        if self.types.contains(&type_key(api)) {
            Ok(())
        } else {
            Err(StoreError::NoMatchingType(format!(
                "{}/{}",
                api.api_version, api.kind
            )))
        }
    }

    fn record(&mut self, op: StoreOp, kind: &str, ns: Option<&str>, name: &str, changed: bool) {
        self.writes.push(WriteRecord {
            op,
            kind: kind.to_string(),
            namespace: ns.map(str::to_string),
            name: name.to_string(),
            changed,
        });
    }

    /// Owner-reference cascade once a root is gone.
    fn collect_garbage(&mut self, owner_uid: &str) {
        self.objects.retain(|_, obj| {
            let owned = obj["metadata"]["ownerReferences"]
                .as_array()
                .map(|refs| refs.iter().any(|r| r["uid"] == owner_uid))
                .unwrap_or(false);
            !owned
        });
    }

    fn simulate_workload(&mut self, kind: &str, obj: &mut Value) {
        if kind == "Service" && obj["spec"]["clusterIP"].is_null() {
            self.next_ip += 1;
            let ip = format!("10.96.{}.{}", self.next_ip / 250, self.next_ip % 250 + 1);
            obj["spec"]["clusterIP"] = json!(ip);
            obj["spec"]["clusterIPs"] = json!([ip]);
        }
        if kind == "Deployment" && self.auto_ready {
            let replicas = obj["spec"]["replicas"].as_i64().unwrap_or(1);
            obj["status"] = json!({"replicas": replicas, "readyReplicas": replicas});
        }
    }
}

fn type_key(api: &ApiResource) -> TypeKey {
    (api.api_version.clone(), api.kind.clone())
}

fn object_key_of(api: &ApiResource, ns: Option<&str>, name: &str) -> ObjectKey {
    (
        api.api_version.clone(),
        api.kind.clone(),
        ns.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// Comparable view of an object: no resourceVersion, no status.
fn logical(obj: &Value) -> Value {
    let mut v = obj.clone();
    if let Some(meta) = v.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("resourceVersion");
    }
    if let Some(map) = v.as_object_mut() {
        map.remove("status");
    }
    v
}

/// In-process object store with API-server-like semantics.
///
/// * writes to types that are not installed fail with `NoMatchingType`
/// * replace honours the resourceVersion precondition and keeps status
/// * a replace that changes nothing keeps the resourceVersion
/// * Services get a clusterIP on create and reject clearing it
/// * removing the last finalizer of a deleting root deletes it and
///   garbage-collects the objects it owns
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the built-in workload and RBAC types installed.
    pub fn with_core_types(registry: &TypeRegistry) -> Self {
        let store = Self::new();
        for rt in [
            ResourceType::Deployment,
            ResourceType::Service,
            ResourceType::ServiceAccount,
            ResourceType::Role,
            ResourceType::RoleBinding,
            ResourceType::ConfigMap,
        ] {
            store.install_type(registry.api_resource(rt));
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn install_type(&self, api: &ApiResource) {
        self.lock().types.insert(type_key(api));
    }

    pub fn uninstall_type(&self, api: &ApiResource) {
        self.lock().types.remove(&type_key(api));
    }

    /// Make created or replaced Deployments report all replicas ready.
    pub fn set_auto_ready(&self, on: bool) {
        self.lock().auto_ready = on;
    }

    /// Fail every `op` on `kind` with `error` until [`Self::clear_failures`].
    pub fn fail_on(&self, op: StoreOp, kind: &str, error: StoreError) {
        self.lock().failures.push(InjectedFailure {
            op,
            kind: kind.to_string(),
            error,
        });
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Add a root as a user would; assigns uid, generation and resourceVersion.
    pub fn insert_root(&self, mut root: InferenceScheduler) -> InferenceScheduler {
        let mut st = self.lock();
        if root.metadata.namespace.is_none() {
            root.metadata.namespace = Some("default".into());
        }
        if root.metadata.uid.is_none() {
            st.next_uid += 1;
            root.metadata.uid = Some(format!("uid-{:04}", st.next_uid));
        }
        root.metadata.generation = Some(root.metadata.generation.unwrap_or(1));
        root.metadata.resource_version = Some(st.bump_rv());
        let key = (root.namespace().unwrap_or_default(), root.name_any());
        st.roots.insert(key, root.clone());
        root
    }

    pub fn root(&self, ns: &str, name: &str) -> Option<InferenceScheduler> {
        self.lock().roots.get(&(ns.to_string(), name.to_string())).cloned()
    }

    /// Edit a root's spec, bumping its generation.
    pub fn update_root_spec(
        &self,
        ns: &str,
        name: &str,
        edit: impl FnOnce(&mut InferenceSchedulerSpec),
    ) -> Result<(), StoreError> {
        let mut st = self.lock();
        let rv = st.bump_rv();
        let root = st
            .roots
            .get_mut(&(ns.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{ROOT_KIND} {ns}/{name}")))?;
        edit(&mut root.spec);
        root.metadata.generation = Some(root.metadata.generation.unwrap_or(0) + 1);
        root.metadata.resource_version = Some(rv);
        Ok(())
    }

    /// Mark a root for deletion; without finalizers it disappears at once.
    pub fn request_deletion(&self, ns: &str, name: &str) -> Result<(), StoreError> {
        let mut st = self.lock();
        let key = (ns.to_string(), name.to_string());
        let rv = st.bump_rv();
        let root = st
            .roots
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{ROOT_KIND} {ns}/{name}")))?;
        if root.metadata.deletion_timestamp.is_none() {
            root.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
        root.metadata.resource_version = Some(rv);
        if root.finalizers().is_empty() {
            let uid = root.metadata.uid.clone().unwrap_or_default();
            st.roots.remove(&key);
            st.collect_garbage(&uid);
        }
        Ok(())
    }

    /// Seed an object directly, bypassing failure injection and the write log.
    pub fn insert_object(&self, api: &ApiResource, ns: Option<&str>, mut obj: Value) {
        let mut st = self.lock();
        let name = obj["metadata"]["name"].as_str().unwrap_or_default().to_string();
        obj["apiVersion"] = json!(api.api_version);
        obj["kind"] = json!(api.kind);
        if let Some(ns) = ns {
            obj["metadata"]["namespace"] = json!(ns);
        }
        obj["metadata"]["resourceVersion"] = json!(st.bump_rv());
        st.objects.insert(object_key_of(api, ns, &name), obj);
    }

    pub fn object(&self, api: &ApiResource, ns: Option<&str>, name: &str) -> Option<Value> {
        self.lock().objects.get(&object_key_of(api, ns, name)).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Simulate pods becoming (un)ready for a Deployment.
    pub fn set_ready_replicas(
        &self,
        api: &ApiResource,
        ns: &str,
        name: &str,
        ready: i32,
    ) -> Result<(), StoreError> {
        let mut st = self.lock();
        let rv = st.bump_rv();
        let obj = st
            .objects
            .get_mut(&object_key_of(api, Some(ns), name))
            .ok_or_else(|| StoreError::NotFound(object_key(api, Some(ns), name)))?;
        obj["status"]["readyReplicas"] = json!(ready);
        obj["metadata"]["resourceVersion"] = json!(rv);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_root(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<InferenceScheduler>, StoreError> {
        let st = self.lock();
        st.check(StoreOp::Get, ROOT_KIND)?;
        Ok(st.roots.get(&(ns.to_string(), name.to_string())).cloned())
    }

    async fn set_finalizers(
        &self,
        root: &InferenceScheduler,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut st = self.lock();
        st.check(StoreOp::SetFinalizers, ROOT_KIND)?;
        let ns = root.namespace().unwrap_or_default();
        let name = root.name_any();
        let key = (ns.clone(), name.clone());
        let rv = st.bump_rv();
        let stored = st
            .roots
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{ROOT_KIND} {ns}/{name}")))?;
        if stored.metadata.resource_version != root.metadata.resource_version {
            return Err(StoreError::Conflict(format!(
                "{ROOT_KIND} {ns}/{name} has been modified"
            )));
        }
        let changed = stored.finalizers() != finalizers.as_slice();
        stored.metadata.finalizers = if finalizers.is_empty() {
            None
        } else {
            Some(finalizers)
        };
        stored.metadata.resource_version = Some(rv);
        let released = stored.metadata.deletion_timestamp.is_some()
            && stored.finalizers().is_empty();
        let uid = stored.metadata.uid.clone().unwrap_or_default();
        st.record(StoreOp::SetFinalizers, ROOT_KIND, Some(&ns), &name, changed);
        if released {
            trace!(%ns, %name, "root released; deleting");
            st.roots.remove(&key);
            st.collect_garbage(&uid);
        }
        Ok(())
    }

    async fn write_status(
        &self,
        ns: &str,
        name: &str,
        status: &InferenceSchedulerStatus,
    ) -> Result<(), StoreError> {
        let mut st = self.lock();
        st.check(StoreOp::WriteStatus, ROOT_KIND)?;
        let rv = st.bump_rv();
        let stored = st
            .roots
            .get_mut(&(ns.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound(format!("{ROOT_KIND} {ns}/{name}")))?;
        let changed = stored.status.as_ref() != Some(status);
        if changed {
            stored.status = Some(status.clone());
            stored.metadata.resource_version = Some(rv);
        }
        st.record(StoreOp::WriteStatus, ROOT_KIND, Some(ns), name, changed);
        Ok(())
    }

    async fn get(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError> {
        let st = self.lock();
        st.check(StoreOp::Get, &api.kind)?;
        Ok(st.objects.get(&object_key_of(api, ns, name)).cloned())
    }

    async fn create(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        let mut st = self.lock();
        st.check(StoreOp::Create, &api.kind)?;
        st.require_type(api)?;
        let name = obj["metadata"]["name"]
            .as_str()
            .ok_or_else(|| StoreError::Rejected("metadata.name is required".into()))?
            .to_string();
        let key = object_key_of(api, ns, &name);
        if st.objects.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} already exists",
                object_key(api, ns, &name)
            )));
        }
        let mut stored = obj.clone();
        if let Some(ns) = ns {
            stored["metadata"]["namespace"] = json!(ns);
        }
        stored["metadata"]["resourceVersion"] = json!(st.bump_rv());
        st.simulate_workload(&api.kind, &mut stored);
        st.objects.insert(key, stored.clone());
        st.record(StoreOp::Create, &api.kind, ns, &name, true);
        Ok(stored)
    }

    async fn replace(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        let mut st = self.lock();
        st.check(StoreOp::Replace, &api.kind)?;
        st.require_type(api)?;
        let key = object_key_of(api, ns, name);
        let existing = st
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(object_key(api, ns, name)))?;

        let wanted_rv = &obj["metadata"]["resourceVersion"];
        if !wanted_rv.is_null() && *wanted_rv != existing["metadata"]["resourceVersion"] {
            return Err(StoreError::Conflict(format!(
                "{} has been modified",
                object_key(api, ns, name)
            )));
        }
        if api.kind == "Service" {
            let old_ip = &existing["spec"]["clusterIP"];
            if !old_ip.is_null() && obj["spec"]["clusterIP"] != *old_ip {
                return Err(StoreError::Rejected(format!(
                    "{}: spec.clusterIP: field is immutable",
                    object_key(api, ns, name)
                )));
            }
        }

        let mut stored = obj.clone();
        if let Some(ns) = ns {
            stored["metadata"]["namespace"] = json!(ns);
        }
        if let Some(status) = existing.get("status") {
            stored["status"] = status.clone();
        }
        let changed = logical(&existing) != logical(&stored);
        stored["metadata"]["resourceVersion"] = if changed {
            json!(st.bump_rv())
        } else {
            existing["metadata"]["resourceVersion"].clone()
        };
        st.simulate_workload(&api.kind, &mut stored);
        st.objects.insert(key, stored.clone());
        st.record(StoreOp::Replace, &api.kind, ns, name, changed);
        Ok(stored)
    }

    async fn delete(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut st = self.lock();
        st.check(StoreOp::Delete, &api.kind)?;
        st.require_type(api)?;
        match st.objects.remove(&object_key_of(api, ns, name)) {
            Some(_) => {
                st.record(StoreOp::Delete, &api.kind, ns, name, true);
                Ok(())
            }
            None => Err(StoreError::NotFound(object_key(api, ns, name))),
        }
    }

    async fn list_names(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<String>, StoreError> {
        let st = self.lock();
        st.check(StoreOp::List, &api.kind)?;
        st.require_type(api)?;
        let names = st
            .objects
            .keys()
            .filter(|(v, k, n, _)| {
                *v == api.api_version && *k == api.kind && ns.is_none_or(|ns| ns == n.as_str())
            })
            .map(|(_, _, _, name)| name.clone())
            .take(limit.map(|l| l as usize).unwrap_or(usize::MAX))
            .collect();
        Ok(names)
    }
}
