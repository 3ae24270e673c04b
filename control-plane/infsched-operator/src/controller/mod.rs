use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
use kube::{
    Client, Resource, ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, watcher::Config},
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::InferenceScheduler;
use crate::desired::SpecError;
use crate::error::{ErrorClass, StoreError};
use crate::registry::TypeRegistry;
use crate::store::{CancellableStore, KubeStore, ObjectStore};
use crate::templates::TemplateError;

pub mod finalizer;
pub mod fsm;
pub mod prerequisites;
pub mod readiness;
pub mod reconcile;
pub mod status;
pub mod upsert;

#[cfg(test)]
mod status_tests;

pub use finalizer::{CleanupPolicy, FINALIZER};
pub use fsm::{Requeue, RequeueTiming};
pub use reconcile::{EngineSettings, PREREQUISITES_OK, ReconciliationEngine};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl ReconcileErr {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileErr::Store(e) => e.class(),
            ReconcileErr::InvalidSpec(_) | ReconcileErr::Template(_) => ErrorClass::Permanent,
        }
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<dyn ObjectStore>,
    pub settings: EngineSettings,
    /// Cancelled on process shutdown; each pass works on a child token.
    pub shutdown: CancellationToken,
}

impl ControllerContext {
    pub fn new(
        client: Client,
        cfg: OperatorConfig,
        registry: Arc<TypeRegistry>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let settings = cfg.engine_settings()?;
        Ok(Self {
            store: Arc::new(KubeStore::new(client.clone())),
            client,
            cfg,
            registry,
            settings,
            shutdown,
        })
    }
}

fn scoped<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn owns<K>(
    controller: Controller<InferenceScheduler>,
    client: &Client,
    ns: Option<&str>,
) -> Controller<InferenceScheduler>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug
        + Send
        + 'static,
{
    controller.owns(scoped::<K>(client, ns), Config::default())
}

pub async fn run_controller(ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    let ns = ctx.cfg.watch_namespace().map(str::to_string);
    let client = ctx.client.clone();
    info!(namespace = ns.as_deref().unwrap_or("*"), "starting InferenceScheduler controller");

    let api: Api<InferenceScheduler> = scoped(&client, ns.as_deref());
    let mut controller = Controller::new(api, Config::default());
    controller = owns::<Deployment>(controller, &client, ns.as_deref());
    controller = owns::<Service>(controller, &client, ns.as_deref());
    controller = owns::<ServiceAccount>(controller, &client, ns.as_deref());
    controller = owns::<ConfigMap>(controller, &client, ns.as_deref());
    controller = owns::<Role>(controller, &client, ns.as_deref());
    controller = owns::<RoleBinding>(controller, &client, ns.as_deref());

    controller
        .graceful_shutdown_on(ctx.shutdown.clone().cancelled_owned())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => warn!(error = %e, "reconcile error"),
            }
        })
        .await;

    info!("controller stopped");
    Ok(())
}

async fn reconcile(
    obj: Arc<InferenceScheduler>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let store = CancellableStore::new(ctx.store.clone(), ctx.shutdown.child_token());
    let engine = ReconciliationEngine::new(&store, &ctx.registry, &ctx.settings);
    let requeue = engine.reconcile(&ns, &name).await?;
    Ok(requeue.into_action())
}

fn error_policy(
    obj: Arc<InferenceScheduler>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    let class = err.class();
    let delay = ctx.cfg.retry.delay(class);
    error!(name = %obj.name_any(), error = %err, ?class, ?delay, "reconcile failed");
    Action::requeue(delay)
}
