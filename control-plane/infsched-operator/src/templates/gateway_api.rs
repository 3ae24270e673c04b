//! Typed payloads for the Gateway API and Inference Extension objects.
//!
//! Only the fields the operator sets are modelled.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model_server::selector_labels;
use super::{ResourceDescriptor, TemplateError, meta};
use crate::desired::DesiredState;
use crate::naming::{ChildKind, child_name};
use crate::registry::{GATEWAY_API_GROUP, INFERENCE_API_GROUP, ResourceType};

pub const ROUTE_PATH_PREFIX: &str = "/v1/";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferencePool {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: InferencePoolSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferencePoolSpec {
    pub selector: PoolSelector,
    pub target_ports: Vec<PortNumber>,
    pub endpoint_picker_ref: EndpointPickerRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PortNumber {
    pub number: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPickerRef {
    pub name: String,
    pub port: PortNumber,
    pub failure_mode: FailureMode,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureMode {
    FailOpen,
    FailClose,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: GatewaySpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub gateway_class_name: String,
    pub listeners: Vec<Listener>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    pub protocol: String,
    pub port: i32,
    pub allowed_routes: AllowedRoutes,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AllowedRoutes {
    pub namespaces: RouteNamespaces,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteNamespaces {
    pub from: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: HttpRouteSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    pub parent_refs: Vec<ParentRef>,
    pub rules: Vec<RouteRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParentRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub matches: Vec<RouteMatch>,
    pub backend_refs: Vec<BackendRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteMatch {
    pub path: PathMatch,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PathMatch {
    #[serde(rename = "type")]
    pub match_type: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BackendRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub port: i32,
}

pub fn inference_pool(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let pool = InferencePool {
        api_version: format!("{}/v1", INFERENCE_API_GROUP),
        kind: "InferencePool".into(),
        metadata: meta(desired, ChildKind::Pool, None),
        spec: InferencePoolSpec {
            selector: PoolSelector {
                match_labels: selector_labels(desired),
            },
            target_ports: vec![PortNumber {
                number: desired.model_server.port,
            }],
            endpoint_picker_ref: EndpointPickerRef {
                name: child_name(&desired.name, ChildKind::RoutingAccessPoint),
                port: PortNumber {
                    number: desired.endpoint_picker.grpc_port,
                },
                failure_mode: FailureMode::FailOpen,
            },
        },
    };
    ResourceDescriptor::from_typed(
        ResourceType::InferencePool,
        child_name(&desired.name, ChildKind::Pool),
        desired,
        &pool,
    )
}

pub fn gateway(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let gw = Gateway {
        api_version: format!("{}/v1", GATEWAY_API_GROUP),
        kind: "Gateway".into(),
        metadata: meta(desired, ChildKind::Gateway, None),
        spec: GatewaySpec {
            gateway_class_name: desired.gateway.class_name.as_str().to_string(),
            listeners: vec![Listener {
                name: "http".into(),
                protocol: "HTTP".into(),
                port: desired.gateway.listener_port,
                allowed_routes: AllowedRoutes {
                    namespaces: RouteNamespaces {
                        from: "Same".into(),
                    },
                },
            }],
        },
    };
    ResourceDescriptor::from_typed(
        ResourceType::Gateway,
        child_name(&desired.name, ChildKind::Gateway),
        desired,
        &gw,
    )
}

pub fn http_route(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let route = HttpRoute {
        api_version: format!("{}/v1", GATEWAY_API_GROUP),
        kind: "HTTPRoute".into(),
        metadata: meta(desired, ChildKind::Route, None),
        spec: HttpRouteSpec {
            parent_refs: vec![ParentRef {
                name: child_name(&desired.name, ChildKind::Gateway),
                namespace: desired.namespace.clone(),
            }],
            rules: vec![RouteRule {
                matches: vec![RouteMatch {
                    path: PathMatch {
                        match_type: "PathPrefix".into(),
                        value: ROUTE_PATH_PREFIX.into(),
                    },
                }],
                backend_refs: vec![BackendRef {
                    group: INFERENCE_API_GROUP.into(),
                    kind: "InferencePool".into(),
                    name: child_name(&desired.name, ChildKind::Pool),
                    port: desired.model_server.port,
                }],
            }],
        },
    };
    ResourceDescriptor::from_typed(
        ResourceType::HttpRoute,
        child_name(&desired.name, ChildKind::Route),
        desired,
        &route,
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{desired, desired_from, spec};
    use super::*;
    use crate::crd::GatewayClassName;
    use serde_json::json;

    #[test]
    fn pool_selects_model_pods_and_references_epp_service() {
        let p = inference_pool(&desired()).unwrap().payload;
        assert_eq!(p["apiVersion"], "inference.networking.k8s.io/v1");
        assert_eq!(p["spec"]["selector"]["matchLabels"]["app"], "vllm");
        assert_eq!(p["spec"]["targetPorts"], json!([{"number": 8000}]));
        assert_eq!(
            p["spec"]["endpointPickerRef"],
            json!({"name": "llama-epp-svc", "port": {"number": 9002}, "failureMode": "FailOpen"})
        );
    }

    #[test]
    fn gateway_uses_requested_class_and_port() {
        let mut s = spec();
        s.gateway.class_name = Some(GatewayClassName::Istio);
        s.gateway.listener_port = Some(8080);
        let g = gateway(&desired_from(s)).unwrap().payload;
        assert_eq!(g["spec"]["gatewayClassName"], "istio");
        assert_eq!(
            g["spec"]["listeners"],
            json!([{
                "name": "http",
                "protocol": "HTTP",
                "port": 8080,
                "allowedRoutes": {"namespaces": {"from": "Same"}}
            }])
        );
    }

    #[test]
    fn route_sends_v1_prefix_to_pool() {
        let r = http_route(&desired()).unwrap().payload;
        assert_eq!(r["kind"], "HTTPRoute");
        assert_eq!(
            r["spec"]["parentRefs"],
            json!([{"name": "llama-gateway", "namespace": "models"}])
        );
        let rule = &r["spec"]["rules"][0];
        assert_eq!(rule["matches"][0]["path"], json!({"type": "PathPrefix", "value": "/v1/"}));
        assert_eq!(
            rule["backendRefs"][0],
            json!({
                "group": "inference.networking.k8s.io",
                "kind": "InferencePool",
                "name": "llama-pool",
                "port": 8000
            })
        );
    }
}
