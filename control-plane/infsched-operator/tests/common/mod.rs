#![allow(dead_code)]

use infsched_operator::controller::{EngineSettings, ReconciliationEngine};
use infsched_operator::crd::{
    InferenceScheduler, InferenceSchedulerSpec, InferenceSchedulerStatus,
    ModelServerSpec,
};
use infsched_operator::registry::{ResourceType, TypeRegistry};
use infsched_operator::store::{MemoryStore, StoreOp, WriteRecord};
use serde_json::json;

pub const NS: &str = "models";

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

pub fn spec(replicas: i32) -> InferenceSchedulerSpec {
    InferenceSchedulerSpec {
        model_server: ModelServerSpec {
            model_name: "meta-llama/Llama-3.1-8B-Instruct".into(),
            hf_token_secret_name: "hf-token".into(),
            replicas: Some(replicas),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// In-memory cluster plus the engine inputs, one per test.
pub struct Fixture {
    pub registry: TypeRegistry,
    pub store: MemoryStore,
    pub settings: EngineSettings,
}

impl Fixture {
    /// Only the built-in workload and RBAC types.
    pub fn bare() -> Self {
        let registry = TypeRegistry::builtin();
        let store = MemoryStore::with_core_types(&registry);
        Self {
            registry,
            store,
            settings: EngineSettings::default(),
        }
    }

    /// Gateway API and Inference Extension installed, plus the given classes.
    pub fn full(classes: &[&str]) -> Self {
        let fx = Self::bare();
        for cap in fx.registry.capabilities() {
            fx.store.install_type(fx.registry.api_resource(cap.resource));
        }
        for class in classes {
            fx.store.insert_object(
                fx.registry.api_resource(ResourceType::GatewayClass),
                None,
                json!({"metadata": {"name": class}}),
            );
        }
        fx
    }

    pub fn engine(&self) -> ReconciliationEngine<'_> {
        ReconciliationEngine::new(&self.store, &self.registry, &self.settings)
    }

    pub fn add_root(&self, name: &str, spec: InferenceSchedulerSpec) -> InferenceScheduler {
        let mut root = InferenceScheduler::new(name, spec);
        root.metadata.namespace = Some(NS.into());
        self.store.insert_root(root)
    }

    pub fn status(&self, name: &str) -> InferenceSchedulerStatus {
        self.store
            .root(NS, name)
            .and_then(|r| r.status)
            .unwrap_or_default()
    }

    pub fn object(&self, rt: ResourceType, name: &str) -> Option<serde_json::Value> {
        let ns = self.registry.entry(rt).namespaced.then_some(NS);
        self.store.object(self.registry.api_resource(rt), ns, name)
    }

    /// Writes aimed at children, not at the root.
    pub fn child_writes(&self) -> Vec<WriteRecord> {
        self.store
            .writes()
            .into_iter()
            .filter(|w| {
                matches!(w.op, StoreOp::Create | StoreOp::Replace | StoreOp::Delete)
            })
            .collect()
    }
}
