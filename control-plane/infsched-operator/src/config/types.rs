use std::time::Duration;

use envconfig::Envconfig;

use crate::controller::{CleanupPolicy, EngineSettings, RequeueTiming};
use crate::error::ErrorClass;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "HTTP_PORT", default = "8088")]
    pub http_port: u16,

    /// Restrict the watch to one namespace; all namespaces when unset.
    /// Env: INFSCHED_WATCH_NAMESPACE
    #[envconfig(from = "INFSCHED_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// `cascade` relies on owner references, `sweep` deletes children by name.
    /// Env: INFSCHED_CLEANUP_MODE
    #[envconfig(from = "INFSCHED_CLEANUP_MODE", default = "cascade")]
    pub cleanup_mode: String,

    #[envconfig(nested)]
    pub requeue: RequeueConfig,

    #[envconfig(nested)]
    pub retry: RetryConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RequeueConfig {
    #[envconfig(from = "INFSCHED_REQUEUE_PREREQ_SECS", default = "60")]
    pub prerequisites_secs: u64,
    #[envconfig(from = "INFSCHED_REQUEUE_NOT_READY_SECS", default = "30")]
    pub not_ready_secs: u64,
    #[envconfig(from = "INFSCHED_REQUEUE_STEADY_SECS", default = "300")]
    pub steady_secs: u64,
}

/// Requeue delays after a failed pass, per error class.
#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    #[envconfig(from = "INFSCHED_RETRY_TRANSIENT_SECS", default = "5")]
    pub transient_secs: u64,
    #[envconfig(from = "INFSCHED_RETRY_CONFLICT_SECS", default = "1")]
    pub conflict_secs: u64,
    #[envconfig(from = "INFSCHED_RETRY_PERMANENT_SECS", default = "300")]
    pub permanent_secs: u64,
}

impl RetryConfig {
    pub fn delay(&self, class: ErrorClass) -> Duration {
        let secs = match class {
            ErrorClass::Transient => self.transient_secs,
            ErrorClass::Conflict => self.conflict_secs,
            ErrorClass::Permanent => self.permanent_secs,
        };
        Duration::from_secs(secs)
    }
}

impl RequeueConfig {
    pub fn timing(&self) -> RequeueTiming {
        RequeueTiming {
            prerequisites_missing: Duration::from_secs(self.prerequisites_secs),
            not_ready: Duration::from_secs(self.not_ready_secs),
            steady: Duration::from_secs(self.steady_secs),
        }
    }
}

impl OperatorConfig {
    pub fn cleanup_policy(&self) -> anyhow::Result<CleanupPolicy> {
        self.cleanup_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!("INFSCHED_CLEANUP_MODE: {e}"))
    }

    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        Ok(EngineSettings {
            timing: self.requeue.timing(),
            cleanup: self.cleanup_policy()?,
        })
    }

    /// Blank namespace means "all", same as unset.
    pub fn watch_namespace(&self) -> Option<&str> {
        self.watch_namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
    }
}
