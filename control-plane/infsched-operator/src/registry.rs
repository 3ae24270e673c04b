//! API coordinates of every resource type the operator reads or writes.
//!
//! The registry is built once at startup and handed to the engine by
//! reference. Tests may swap individual entries with [`TypeRegistry::with_override`].

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use std::fmt;

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
pub const INFERENCE_API_GROUP: &str = "inference.networking.k8s.io";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Deployment,
    Service,
    ServiceAccount,
    Role,
    RoleBinding,
    ConfigMap,
    InferencePool,
    Gateway,
    HttpRoute,
    GatewayClass,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        ResourceType::Deployment,
        ResourceType::Service,
        ResourceType::ServiceAccount,
        ResourceType::Role,
        ResourceType::RoleBinding,
        ResourceType::ConfigMap,
        ResourceType::InferencePool,
        ResourceType::Gateway,
        ResourceType::HttpRoute,
        ResourceType::GatewayClass,
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            ResourceType::Deployment => "Deployment",
            ResourceType::Service => "Service",
            ResourceType::ServiceAccount => "ServiceAccount",
            ResourceType::Role => "Role",
            ResourceType::RoleBinding => "RoleBinding",
            ResourceType::ConfigMap => "ConfigMap",
            ResourceType::InferencePool => "InferencePool",
            ResourceType::Gateway => "Gateway",
            ResourceType::HttpRoute => "HTTPRoute",
            ResourceType::GatewayClass => "GatewayClass",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[derive(Clone, Debug)]
pub struct TypeEntry {
    pub api: ApiResource,
    pub namespaced: bool,
}

/// A capability type that must be installed before anything is deployed.
#[derive(Clone, Debug)]
pub struct Capability {
    pub resource: ResourceType,
    /// Capabilities in the same bundle are reported once when missing.
    pub bundle: &'static str,
    pub missing_message: &'static str,
}

#[derive(Clone, Debug)]
pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    capabilities: Vec<Capability>,
}

fn custom(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(group, version, kind),
        plural,
    )
}

fn builtin_entry(rt: ResourceType) -> TypeEntry {
    let (api, namespaced) = match rt {
        ResourceType::Deployment => (ApiResource::erase::<Deployment>(&()), true),
        ResourceType::Service => (ApiResource::erase::<Service>(&()), true),
        ResourceType::ServiceAccount => {
            (ApiResource::erase::<ServiceAccount>(&()), true)
        }
        ResourceType::Role => (ApiResource::erase::<Role>(&()), true),
        ResourceType::RoleBinding => {
            (ApiResource::erase::<RoleBinding>(&()), true)
        }
        ResourceType::ConfigMap => (ApiResource::erase::<ConfigMap>(&()), true),
        ResourceType::InferencePool => (
            custom(INFERENCE_API_GROUP, "v1", "InferencePool", "inferencepools"),
            true,
        ),
        ResourceType::Gateway => {
            (custom(GATEWAY_API_GROUP, "v1", "Gateway", "gateways"), true)
        }
        ResourceType::HttpRoute => {
            (custom(GATEWAY_API_GROUP, "v1", "HTTPRoute", "httproutes"), true)
        }
        ResourceType::GatewayClass => (
            custom(GATEWAY_API_GROUP, "v1", "GatewayClass", "gatewayclasses"),
            false,
        ),
    };
    TypeEntry { api, namespaced }
}

impl TypeRegistry {
    pub fn builtin() -> Self {
        let entries = ResourceType::ALL.iter().map(|rt| builtin_entry(*rt)).collect();
        let capabilities = vec![
            Capability {
                resource: ResourceType::Gateway,
                bundle: "gateway-api",
                missing_message: "Gateway API v1.3.0+ (install: kubectl apply -f https://github.com/kubernetes-sigs/gateway-api/releases/download/v1.3.0/standard-install.yaml)",
            },
            Capability {
                resource: ResourceType::HttpRoute,
                bundle: "gateway-api",
                missing_message: "Gateway API HTTPRoute CRD",
            },
            Capability {
                resource: ResourceType::InferencePool,
                bundle: "inference-extension",
                missing_message: "Gateway API Inference Extension v1.1.0+ (install: kubectl apply -f https://github.com/kubernetes-sigs/gateway-api-inference-extension/releases/download/v1.1.0/manifests.yaml)",
            },
            Capability {
                resource: ResourceType::GatewayClass,
                bundle: "gateway-api",
                missing_message: "GatewayClass CRD",
            },
        ];
        Self {
            entries,
            capabilities,
        }
    }

    /// Replace the coordinates of one type, e.g. to target a different API version.
    pub fn with_override(mut self, rt: ResourceType, api: ApiResource) -> Self {
        self.entries[rt.index()].api = api;
        self
    }

    pub fn entry(&self, rt: ResourceType) -> &TypeEntry {
        &self.entries[rt.index()]
    }

    pub fn api_resource(&self, rt: ResourceType) -> &ApiResource {
        &self.entry(rt).api
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
