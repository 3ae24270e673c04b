use chrono::{DateTime, SecondsFormat, Utc};

use crate::crd::{
    Condition, ConditionStatus, ConditionType, InferenceSchedulerStatus, Phase,
};

/// Accumulates the status of one reconcile pass and tracks whether it
/// differs from what is stored.
#[derive(Clone, Debug)]
pub struct StatusAggregator {
    stored: InferenceSchedulerStatus,
    current: InferenceSchedulerStatus,
    generation: Option<i64>,
}

impl StatusAggregator {
    pub fn new(stored: Option<&InferenceSchedulerStatus>, generation: Option<i64>) -> Self {
        let stored = stored.cloned().unwrap_or_default();
        let mut current = stored.clone();
        current.observed_generation = generation;
        Self {
            stored,
            current,
            generation,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.current.phase
    }

    pub fn stored_phase(&self) -> Option<Phase> {
        self.stored.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.current.phase = Some(phase);
    }

    pub fn set_condition(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        self.set_condition_at(type_, status, reason, message, Utc::now());
    }

    /// Upsert by type. The transition time only moves when `status` changes.
    pub fn set_condition_at(
        &mut self,
        type_: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        match self.current.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(c) => {
                if c.status != status {
                    c.status = status;
                    c.last_transition_time = Some(rfc3339(now));
                }
                c.reason = Some(reason.to_string());
                c.message = Some(message);
                c.observed_generation = self.generation;
            }
            None => self.current.conditions.push(Condition {
                type_,
                status,
                reason: Some(reason.to_string()),
                message: Some(message),
                last_transition_time: Some(rfc3339(now)),
                observed_generation: self.generation,
            }),
        }
    }

    pub fn set_prerequisites(&mut self, validated: bool, message: Option<String>) {
        self.current.prerequisites_validated = validated;
        self.current.prerequisite_message = message;
    }

    pub fn set_model_server_replicas(&mut self, ready: i32) {
        self.current.model_server_replicas = ready;
    }

    pub fn set_epp_replicas(&mut self, ready: i32) {
        self.current.epp_replicas = ready;
    }

    pub fn set_inference_pool_ready(&mut self, ready: bool) {
        self.current.inference_pool_ready = ready;
    }

    pub fn set_gateway_ready(&mut self, ready: bool) {
        self.current.gateway_ready = ready;
    }

    pub fn changed(&self) -> bool {
        self.current != self.stored
    }

    pub fn current(&self) -> &InferenceSchedulerStatus {
        &self.current
    }

    /// Record that `current` has been persisted.
    pub fn mark_flushed(&mut self) {
        self.stored = self.current.clone();
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
