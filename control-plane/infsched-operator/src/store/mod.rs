//! Seam between the reconciliation engine and the API server.
//!
//! [`KubeStore`] talks to a real cluster; [`MemoryStore`] keeps the same
//! optimistic-concurrency and type-registration rules in process and is only
//! built for tests and under the `testing` feature.

mod cancellable;
mod kube_api;
#[cfg(any(test, feature = "testing"))]
mod memory;

pub use self::cancellable::CancellableStore;
pub use self::kube_api::KubeStore;
#[cfg(any(test, feature = "testing"))]
pub use self::memory::{MemoryStore, StoreOp, WriteRecord};

use async_trait::async_trait;
use kube::discovery::ApiResource;
use serde_json::Value;

use crate::crd::{InferenceScheduler, InferenceSchedulerStatus};
use crate::error::StoreError;

/// Object store operations used by the engine.
///
/// `ns` is `None` for cluster-scoped objects and for listing across all
/// namespaces.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a root object, `None` if it does not exist.
    async fn get_root(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<InferenceScheduler>, StoreError>;

    /// Replace the root's finalizer list, conditional on the root's
    /// resourceVersion.
    async fn set_finalizers(
        &self,
        root: &InferenceScheduler,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Write the status subresource of a root.
    async fn write_status(
        &self,
        ns: &str,
        name: &str,
        status: &InferenceSchedulerStatus,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError>;

    async fn create(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        obj: &Value,
    ) -> Result<Value, StoreError>;

    /// Whole-object replace. A resourceVersion in `obj` makes it conditional.
    async fn replace(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
        obj: &Value,
    ) -> Result<Value, StoreError>;

    async fn delete(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError>;

    /// Names of existing objects. Fails with `NoMatchingType` when the type
    /// itself is not installed.
    async fn list_names(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<String>, StoreError>;
}

/// Display key used in logs and error messages.
pub(crate) fn object_key(api: &ApiResource, ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) => format!("{} {}/{}", api.kind, ns, name),
        None => format!("{} {}", api.kind, name),
    }
}
