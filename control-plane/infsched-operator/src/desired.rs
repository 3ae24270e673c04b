//! Resolution of an `InferenceScheduler` spec into a fully defaulted,
//! validated [`DesiredState`]. Builders only ever see resolved values.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::{
    GatewayClassName, InferenceScheduler, ScorerPlugin, ServerType,
    ServiceExposure,
};
use crate::naming::MAX_ROOT_NAME_LEN;

pub const DEFAULT_VLLM_IMAGE: &str = "vllm/vllm-openai:latest";
pub const DEFAULT_TGI_IMAGE: &str =
    "ghcr.io/huggingface/text-generation-inference:latest";
pub const DEFAULT_EPP_IMAGE: &str =
    "ghcr.io/llm-d/llm-d-inference-scheduler:v0.3.2";
pub const DEFAULT_MODEL_SERVER_REPLICAS: i32 = 2;
pub const DEFAULT_MODEL_SERVER_PORT: i32 = 8000;
pub const DEFAULT_GPU_MEMORY_UTILIZATION: f64 = 0.9;
pub const DEFAULT_EPP_REPLICAS: i32 = 1;
pub const DEFAULT_EPP_GRPC_PORT: i32 = 9002;
pub const EPP_HEALTH_PORT: i32 = 9003;
pub const EPP_METRICS_PORT: i32 = 9090;
pub const DEFAULT_LISTENER_PORT: i32 = 80;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SpecError {
    #[error("modelServer.modelName must not be empty")]
    EmptyModelName,
    #[error("modelServer.hfTokenSecretName must not be empty")]
    EmptySecretName,
    #[error("{field} must be at least 1, got {value}")]
    ReplicasOutOfRange { field: &'static str, value: i32 },
    #[error("modelServer.gpuMemoryUtilization must be within [0.0, 1.0], got {0}")]
    GpuMemoryOutOfRange(f64),
    #[error("{field} must be within 1..=65535, got {value}")]
    PortOutOfRange { field: &'static str, value: i32 },
    #[error("weight of {plugin} must be a finite non-negative number, got {value}")]
    InvalidWeight { plugin: &'static str, value: f64 },
    #[error("name '{name}' is longer than {max} characters")]
    NameTooLong { name: String, max: usize },
    #[error("object has no uid yet")]
    MissingUid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesiredState {
    pub name: String,
    pub namespace: String,
    pub owner: OwnerReference,
    pub model_server: ModelServerParams,
    pub endpoint_picker: EndpointPickerParams,
    pub gateway: GatewayParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelServerParams {
    pub server_type: ServerType,
    pub model_name: String,
    pub replicas: i32,
    pub image: String,
    pub resources: Option<ResourceRequirements>,
    pub enable_prefix_caching: bool,
    pub gpu_memory_utilization: f64,
    pub hf_token_secret_name: String,
    pub port: i32,
    pub extra_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointPickerParams {
    pub image: String,
    pub replicas: i32,
    pub grpc_port: i32,
    pub health_port: i32,
    pub metrics_port: i32,
    pub resources: Option<ResourceRequirements>,
    /// Enabled scorers in fixed order.
    pub scorers: Vec<ScorerConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScorerConfig {
    pub plugin_type: &'static str,
    pub weight: f64,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GatewayParams {
    pub class_name: GatewayClassName,
    pub listener_port: i32,
    pub service_type: ServiceExposure,
}

struct ScorerDefaults {
    plugin_type: &'static str,
    weight: f64,
    parameters: &'static [(&'static str, &'static str)],
}

const LOAD_AWARE: ScorerDefaults = ScorerDefaults {
    plugin_type: "load-aware-scorer",
    weight: 1.0,
    parameters: &[("queueThreshold", "128")],
};
const PREFIX_CACHE: ScorerDefaults = ScorerDefaults {
    plugin_type: "prefix-cache-scorer",
    weight: 2.0,
    parameters: &[("cacheHitBonus", "1.0")],
};
const KV_CACHE_UTILIZATION: ScorerDefaults = ScorerDefaults {
    plugin_type: "kv-cache-utilization-scorer",
    weight: 1.0,
    parameters: &[],
};

fn resolve_scorer(
    defaults: &ScorerDefaults,
    plugin: Option<&ScorerPlugin>,
) -> Result<Option<ScorerConfig>, SpecError> {
    let Some(plugin) = plugin else {
        return Ok(None);
    };
    if !plugin.enabled.unwrap_or(true) {
        return Ok(None);
    }
    let weight = plugin.weight.unwrap_or(defaults.weight);
    if !weight.is_finite() || weight < 0.0 {
        return Err(SpecError::InvalidWeight {
            plugin: defaults.plugin_type,
            value: weight,
        });
    }
    let mut parameters: BTreeMap<String, String> = defaults
        .parameters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if let Some(user) = plugin.parameters.as_ref() {
        parameters.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(Some(ScorerConfig {
        plugin_type: defaults.plugin_type,
        weight,
        parameters,
    }))
}

fn check_port(field: &'static str, value: i32) -> Result<i32, SpecError> {
    if (1..=65535).contains(&value) {
        Ok(value)
    } else {
        Err(SpecError::PortOutOfRange { field, value })
    }
}

fn check_replicas(field: &'static str, value: i32) -> Result<i32, SpecError> {
    if value >= 1 {
        Ok(value)
    } else {
        Err(SpecError::ReplicasOutOfRange { field, value })
    }
}

pub fn owner_reference(obj: &InferenceScheduler) -> Result<OwnerReference, SpecError> {
    let uid = obj.meta().uid.clone().ok_or(SpecError::MissingUid)?;
    Ok(OwnerReference {
        api_version: InferenceScheduler::api_version(&()).into_owned(),
        kind: InferenceScheduler::kind(&()).into_owned(),
        name: obj.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

impl DesiredState {
    pub fn resolve(obj: &InferenceScheduler) -> Result<Self, SpecError> {
        let name = obj.name_any();
        if name.len() > MAX_ROOT_NAME_LEN {
            return Err(SpecError::NameTooLong {
                name,
                max: MAX_ROOT_NAME_LEN,
            });
        }
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let owner = owner_reference(obj)?;

        let ms = &obj.spec.model_server;
        if ms.model_name.trim().is_empty() {
            return Err(SpecError::EmptyModelName);
        }
        if ms.hf_token_secret_name.trim().is_empty() {
            return Err(SpecError::EmptySecretName);
        }
        let server_type = ms.server_type.unwrap_or_default();
        let gpu = ms
            .gpu_memory_utilization
            .unwrap_or(DEFAULT_GPU_MEMORY_UTILIZATION);
        if !(0.0..=1.0).contains(&gpu) {
            return Err(SpecError::GpuMemoryOutOfRange(gpu));
        }
        let model_server = ModelServerParams {
            server_type,
            model_name: ms.model_name.clone(),
            replicas: check_replicas(
                "modelServer.replicas",
                ms.replicas.unwrap_or(DEFAULT_MODEL_SERVER_REPLICAS),
            )?,
            image: ms.image.clone().unwrap_or_else(|| {
                match server_type {
                    ServerType::Vllm => DEFAULT_VLLM_IMAGE,
                    ServerType::Tgi => DEFAULT_TGI_IMAGE,
                }
                .to_string()
            }),
            resources: ms.resources.clone(),
            enable_prefix_caching: ms.enable_prefix_caching.unwrap_or(true),
            gpu_memory_utilization: gpu,
            hf_token_secret_name: ms.hf_token_secret_name.clone(),
            port: check_port(
                "modelServer.port",
                ms.port.unwrap_or(DEFAULT_MODEL_SERVER_PORT),
            )?,
            extra_labels: ms.labels.clone().unwrap_or_default(),
        };

        let ep = &obj.spec.endpoint_picker;
        let plugins = ep.plugins.clone().unwrap_or_default();
        let scorers = [
            resolve_scorer(&LOAD_AWARE, plugins.load_aware_scorer.as_ref())?,
            resolve_scorer(&PREFIX_CACHE, plugins.prefix_cache_scorer.as_ref())?,
            resolve_scorer(
                &KV_CACHE_UTILIZATION,
                plugins.kv_cache_utilization_scorer.as_ref(),
            )?,
        ]
        .into_iter()
        .flatten()
        .collect();
        let endpoint_picker = EndpointPickerParams {
            image: ep.image.clone().unwrap_or_else(|| DEFAULT_EPP_IMAGE.into()),
            replicas: check_replicas(
                "endpointPicker.replicas",
                ep.replicas.unwrap_or(DEFAULT_EPP_REPLICAS),
            )?,
            grpc_port: check_port(
                "endpointPicker.grpcPort",
                ep.grpc_port.unwrap_or(DEFAULT_EPP_GRPC_PORT),
            )?,
            health_port: EPP_HEALTH_PORT,
            metrics_port: EPP_METRICS_PORT,
            resources: ep.resources.clone(),
            scorers,
        };

        let gw = &obj.spec.gateway;
        let gateway = GatewayParams {
            class_name: gw.class_name.unwrap_or_default(),
            listener_port: check_port(
                "gateway.listenerPort",
                gw.listener_port.unwrap_or(DEFAULT_LISTENER_PORT),
            )?,
            service_type: gw.service_type.unwrap_or_default(),
        };

        Ok(Self {
            name,
            namespace,
            owner,
            model_server,
            endpoint_picker,
            gateway,
        })
    }
}
