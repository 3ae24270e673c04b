use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const API_GROUP: &str = "llm.llm-d.io";
pub const API_VERSION: &str = "llm.llm-d.io/v1alpha1";
pub const KIND: &str = "InferenceScheduler";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "llm.llm-d.io",
    version = "v1alpha1",
    kind = "InferenceScheduler",
    plural = "inferenceschedulers",
    shortname = "infsch",
    namespaced,
    status = "InferenceSchedulerStatus",
    printcolumn = r#"{"name":"Model","type":"string","jsonPath":".spec.modelServer.modelName"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.modelServer.replicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSchedulerSpec {
    /// Model server (vLLM, TGI) serving the model.
    pub model_server: ModelServerSpec,
    /// Endpoint picker used by the inference pool for routing decisions.
    #[serde(default)]
    pub endpoint_picker: EndpointPickerSpec,
    /// Gateway fronting the inference pool.
    #[serde(default)]
    pub gateway: GatewaySpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelServerSpec {
    /// Model server implementation (default vllm)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<ServerType>,
    /// HuggingFace model name to deploy
    pub model_name: String,
    /// Number of model server instances (minimum 1, default 2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Container image; defaults depend on the server type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Enable prefix caching (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_prefix_caching: Option<bool>,
    /// GPU memory utilization fraction in [0.0, 1.0] (default 0.9)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_utilization: Option<f64>,
    /// Secret holding the HuggingFace token under key `token`
    pub hf_token_secret_name: String,
    /// HTTP port (default 8000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
    /// Extra labels merged over the built-in pod labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    #[default]
    Vllm,
    Tgi,
}

impl ServerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::Vllm => "vllm",
            ServerType::Tgi => "tgi",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPickerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Number of EPP instances (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// gRPC port (default 9002)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<PluginConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Scorer plugins for the endpoint picker; absent blocks are not rendered.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_aware_scorer: Option<ScorerPlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_cache_scorer: Option<ScorerPlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kv_cache_utilization_scorer: Option<ScorerPlugin>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScorerPlugin {
    /// Default true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// GatewayClass to attach to; must be pre-installed (default kgateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<GatewayClassName>,
    /// HTTP listener port (default 80)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_port: Option<i32>,
    /// Exposure of the model server Service (default ClusterIP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceExposure>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum GatewayClassName {
    #[default]
    #[serde(rename = "kgateway")]
    Kgateway,
    #[serde(rename = "istio")]
    Istio,
    #[serde(rename = "gke-l7-regional-external-managed")]
    GkeL7RegionalExternalManaged,
}

impl GatewayClassName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayClassName::Kgateway => "kgateway",
            GatewayClassName::Istio => "istio",
            GatewayClassName::GkeL7RegionalExternalManaged => {
                "gke-l7-regional-external-managed"
            }
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ServiceExposure {
    #[default]
    ClusterIP,
    LoadBalancer,
    NodePort,
}

impl ServiceExposure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceExposure::ClusterIP => "ClusterIP",
            ServiceExposure::LoadBalancer => "LoadBalancer",
            ServiceExposure::NodePort => "NodePort",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSchedulerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub model_server_replicas: i32,
    #[serde(default)]
    pub epp_replicas: i32,
    /// Set once the Gateway and HTTPRoute have been applied. Latched: a later
    /// regression to `Deploying` or `PrerequisitesMissing` does not clear it.
    #[serde(default)]
    pub gateway_ready: bool,
    /// Set once the InferencePool has been applied. Latched like `gateway_ready`.
    #[serde(default)]
    pub inference_pool_ready: bool,
    #[serde(default)]
    pub prerequisites_validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl InferenceSchedulerStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum Phase {
    Initializing,
    PrerequisitesMissing,
    Deploying,
    Ready,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Initializing => "Initializing",
            Phase::PrerequisitesMissing => "PrerequisitesMissing",
            Phase::Deploying => "Deploying",
            Phase::Ready => "Ready",
            Phase::Finalizing => "Finalizing",
        };
        f.write_str(s)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    SpecValid,
    PrerequisitesValidated,
    ModelServerReady,
    #[serde(rename = "EPPReady")]
    EppReady,
    InferencePoolReady,
    GatewayReady,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(v: bool) -> Self {
        if v {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}
