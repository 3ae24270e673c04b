use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, trace, warn};

use super::ReconcileErr;
use super::finalizer::{self, CleanupPolicy, ensure_finalizer, has_finalizer};
use super::fsm::{Directive, Outcome, Requeue, RequeueTiming, transition};
use super::prerequisites::{self, PrerequisiteOutcome};
use super::readiness::{WorkloadReadiness, probe_workload};
use super::status::StatusAggregator;
use super::upsert::upsert;
use crate::crd::{ConditionStatus, ConditionType, InferenceScheduler};
use crate::desired::DesiredState;
use crate::error::StoreError;
use crate::naming::{ChildKind, child_name};
use crate::registry::TypeRegistry;
use crate::store::ObjectStore;
use crate::templates;

/// `prerequisiteMessage` after a successful validation.
pub const PREREQUISITES_OK: &str = "All prerequisites validated successfully";

/// Knobs the engine reads on every pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub timing: RequeueTiming,
    pub cleanup: CleanupPolicy,
}

/// Condition and failure reason reported when a child kind cannot be written.
fn step_condition(kind: ChildKind) -> (ConditionType, &'static str) {
    match kind {
        ChildKind::Workload | ChildKind::AccessPoint => {
            (ConditionType::ModelServerReady, "DeploymentFailed")
        }
        ChildKind::RoutingIdentity
        | ChildKind::RoutingConfig
        | ChildKind::RoutingWorkload
        | ChildKind::RoutingAccessPoint => (ConditionType::EppReady, "DeploymentFailed"),
        ChildKind::Pool => (ConditionType::InferencePoolReady, "CreationFailed"),
        ChildKind::Gateway | ChildKind::Route => {
            (ConditionType::GatewayReady, "CreationFailed")
        }
    }
}

/// Drives one root object towards its desired child set.
///
/// A pass is sequential and stateless between calls; everything it needs is
/// re-read from the store, and "try again later" is expressed as the
/// returned [`Requeue`].
pub struct ReconciliationEngine<'a> {
    store: &'a dyn ObjectStore,
    registry: &'a TypeRegistry,
    settings: &'a EngineSettings,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        registry: &'a TypeRegistry,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    #[instrument(skip_all, fields(%ns, %name))]
    pub async fn reconcile(&self, ns: &str, name: &str) -> Result<Requeue, ReconcileErr> {
        let Some(root) = self.store.get_root(ns, name).await? else {
            debug!("root not found; treating as deleted");
            return Ok(Requeue::Never);
        };

        if root.meta().deletion_timestamp.is_some() {
            return self.finalize(root).await;
        }

        match ensure_finalizer(self.store, &root).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(Requeue::Never),
            Err(e) => return Err(e.into()),
        }

        let mut status = StatusAggregator::new(root.status.as_ref(), root.meta().generation);
        let result = self.converge(&root, &mut status).await;

        match self.flush(ns, name, &mut status).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("root disappeared before status write");
                return Ok(Requeue::Never);
            }
            Err(e) => {
                warn!(error = %e, "status write failed");
                return match result {
                    Err(step) => Err(step),
                    Ok(_) => Err(e.into()),
                };
            }
        }
        result
    }

    async fn converge(
        &self,
        root: &InferenceScheduler,
        status: &mut StatusAggregator,
    ) -> Result<Requeue, ReconcileErr> {
        let ns = root.namespace().unwrap_or_else(|| "default".to_string());
        let name = root.name_any();

        if status.stored_phase().is_none() {
            self.advance(status, Outcome::FirstObserved);
            self.flush(&ns, &name, status).await?;
        }

        let desired = match DesiredState::resolve(root) {
            Ok(desired) => {
                status.set_condition(
                    ConditionType::SpecValid,
                    ConditionStatus::True,
                    "Valid",
                    "spec accepted",
                );
                desired
            }
            Err(e) => {
                warn!(error = %e, "rejecting spec");
                status.set_condition(
                    ConditionType::SpecValid,
                    ConditionStatus::False,
                    "InvalidSpec",
                    e.to_string(),
                );
                self.advance(status, Outcome::StepFailed);
                return Err(e.into());
            }
        };

        match prerequisites::validate(self.store, self.registry, &desired).await {
            Ok(PrerequisiteOutcome::Satisfied) => {
                status.set_prerequisites(true, Some(PREREQUISITES_OK.to_string()));
                status.set_condition(
                    ConditionType::PrerequisitesValidated,
                    ConditionStatus::True,
                    "ValidationSucceeded",
                    "all prerequisites are installed",
                );
                self.advance(status, Outcome::PrerequisitesSatisfied);
            }
            Ok(missing @ PrerequisiteOutcome::Missing(_)) => {
                let message = missing.message().unwrap_or_default();
                info!(%message, "prerequisites missing");
                status.set_prerequisites(false, Some(message.clone()));
                status.set_condition(
                    ConditionType::PrerequisitesValidated,
                    ConditionStatus::False,
                    "ValidationFailed",
                    message,
                );
                return Ok(self.requeue(status, Outcome::PrerequisitesMissing));
            }
            Err(e) => {
                error!(error = %e, "prerequisite validation failed");
                status.set_condition(
                    ConditionType::PrerequisitesValidated,
                    ConditionStatus::False,
                    "ValidationError",
                    e.to_string(),
                );
                self.advance(status, Outcome::StepFailed);
                return Err(e.into());
            }
        }

        for kind in ChildKind::ALL {
            let descriptors = match templates::build(kind, &desired) {
                Ok(descriptors) => descriptors,
                Err(e) => {
                    self.fail_step(status, kind, e.to_string());
                    return Err(e.into());
                }
            };
            for desc in &descriptors {
                if let Err(e) = upsert(self.store, self.registry, desc).await {
                    error!(kind = %desc.resource, resource = %desc.name, error = %e, "upsert failed");
                    self.fail_step(status, kind, format!("{} {}: {}", desc.resource, desc.name, e));
                    return Err(e.into());
                }
            }

            match kind {
                ChildKind::AccessPoint => {
                    let readiness = self.sample(status, kind, &ns, &name).await?;
                    status.set_model_server_replicas(readiness.ready);
                    if !self.gate(status, ConditionType::ModelServerReady, readiness) {
                        return Ok(self.requeue(status, Outcome::WorkloadNotReady));
                    }
                }
                ChildKind::RoutingAccessPoint => {
                    let readiness = self.sample(status, kind, &ns, &name).await?;
                    status.set_epp_replicas(readiness.ready);
                    if !self.gate(status, ConditionType::EppReady, readiness) {
                        return Ok(self.requeue(status, Outcome::WorkloadNotReady));
                    }
                }
                ChildKind::Pool => {
                    status.set_inference_pool_ready(true);
                    status.set_condition(
                        ConditionType::InferencePoolReady,
                        ConditionStatus::True,
                        "Created",
                        "InferencePool applied",
                    );
                }
                ChildKind::Route => {
                    status.set_gateway_ready(true);
                    status.set_condition(
                        ConditionType::GatewayReady,
                        ConditionStatus::True,
                        "Created",
                        "Gateway and HTTPRoute applied",
                    );
                }
                _ => {}
            }
        }

        info!("all children converged");
        Ok(self.requeue(status, Outcome::Converged))
    }

    async fn finalize(&self, root: InferenceScheduler) -> Result<Requeue, ReconcileErr> {
        if !has_finalizer(&root) {
            trace!("deleting without our finalizer; nothing to do");
            return Ok(Requeue::Never);
        }
        let ns = root.namespace().unwrap_or_else(|| "default".to_string());
        let name = root.name_any();

        let mut status = StatusAggregator::new(root.status.as_ref(), root.meta().generation);
        self.advance(&mut status, Outcome::DeletionRequested);
        let root = if status.changed() {
            match self.flush(&ns, &name, &mut status).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(Requeue::Never),
                Err(e) => return Err(e.into()),
            }
            // The status write moved the resourceVersion the finalizer patch is conditional on.
            match self.store.get_root(&ns, &name).await? {
                Some(fresh) => fresh,
                None => return Ok(Requeue::Never),
            }
        } else {
            root
        };

        match finalizer::finalize(self.store, self.registry, &root, self.settings.cleanup).await {
            Ok(_) => Ok(Requeue::Never),
            Err(e) if e.is_not_found() => Ok(Requeue::Never),
            Err(e) => Err(e.into()),
        }
    }

    fn advance(&self, status: &mut StatusAggregator, outcome: Outcome) -> Directive {
        let t = transition(status.phase(), outcome, &self.settings.timing);
        if status.phase() != Some(t.phase) {
            debug!(from = ?status.phase(), to = %t.phase, ?outcome, "phase transition");
        }
        status.set_phase(t.phase);
        t.directive
    }

    fn requeue(&self, status: &mut StatusAggregator, outcome: Outcome) -> Requeue {
        match self.advance(status, outcome) {
            Directive::Requeue(r) => r,
            Directive::Continue | Directive::Fail => Requeue::Never,
        }
    }

    fn fail_step(&self, status: &mut StatusAggregator, kind: ChildKind, message: String) {
        let (condition, reason) = step_condition(kind);
        status.set_condition(condition, ConditionStatus::False, reason, message);
        self.advance(status, Outcome::StepFailed);
    }

    /// Read the workload fronted by the access point `kind`.
    async fn sample(
        &self,
        status: &mut StatusAggregator,
        kind: ChildKind,
        ns: &str,
        root: &str,
    ) -> Result<WorkloadReadiness, ReconcileErr> {
        let workload = match kind {
            ChildKind::RoutingAccessPoint => ChildKind::RoutingWorkload,
            _ => ChildKind::Workload,
        };
        let name = child_name(root, workload);
        match probe_workload(self.store, self.registry, ns, &name).await {
            Ok(readiness) => Ok(readiness),
            Err(e) => {
                self.fail_step(status, kind, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Record a readiness sample; true when the workload may be built upon.
    fn gate(
        &self,
        status: &mut StatusAggregator,
        condition: ConditionType,
        readiness: WorkloadReadiness,
    ) -> bool {
        let ready = readiness.is_ready();
        let reason = if ready { "Ready" } else { "NotReady" };
        status.set_condition(condition, ready.into(), reason, readiness.summary());
        if !ready {
            debug!(?condition, summary = %readiness.summary(), "workload not ready");
        }
        ready
    }

    async fn flush(
        &self,
        ns: &str,
        name: &str,
        status: &mut StatusAggregator,
    ) -> Result<(), StoreError> {
        if !status.changed() {
            trace!("status unchanged; skipping write");
            return Ok(());
        }
        self.store.write_status(ns, name, status.current()).await?;
        status.mark_flushed();
        Ok(())
    }
}
