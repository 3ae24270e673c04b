use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use kube::discovery::ApiResource;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::ObjectStore;
use crate::crd::{InferenceScheduler, InferenceSchedulerStatus};
use crate::error::StoreError;

/// Wraps a store so that every call gives up once the token is cancelled.
#[derive(Clone)]
pub struct CancellableStore {
    inner: Arc<dyn ObjectStore>,
    token: CancellationToken,
}

impl CancellableStore {
    pub fn new(inner: Arc<dyn ObjectStore>, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(StoreError::Cancelled),
            res = fut => res,
        }
    }
}

#[async_trait]
impl ObjectStore for CancellableStore {
    async fn get_root(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<InferenceScheduler>, StoreError> {
        self.guard(self.inner.get_root(ns, name)).await
    }

    async fn set_finalizers(
        &self,
        root: &InferenceScheduler,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        self.guard(self.inner.set_finalizers(root, finalizers)).await
    }

    async fn write_status(
        &self,
        ns: &str,
        name: &str,
        status: &InferenceSchedulerStatus,
    ) -> Result<(), StoreError> {
        self.guard(self.inner.write_status(ns, name, status)).await
    }

    async fn get(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, StoreError> {
        self.guard(self.inner.get(api, ns, name)).await
    }

    async fn create(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        self.guard(self.inner.create(api, ns, obj)).await
    }

    async fn replace(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
        obj: &Value,
    ) -> Result<Value, StoreError> {
        self.guard(self.inner.replace(api, ns, name, obj)).await
    }

    async fn delete(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        self.guard(self.inner.delete(api, ns, name)).await
    }

    async fn list_names(
        &self,
        api: &ApiResource,
        ns: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<String>, StoreError> {
        self.guard(self.inner.list_names(api, ns, limit)).await
    }
}
