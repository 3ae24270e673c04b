use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec,
    SecretKeySelector, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{ResourceDescriptor, TemplateError, labels, meta};
use crate::crd::ServerType;
use crate::desired::DesiredState;
use crate::naming::{ChildKind, child_name, sanitize_label_value};
use crate::registry::ResourceType;

pub const HF_TOKEN_SECRET_KEY: &str = "token";

/// Labels used to select model server pods (Service and InferencePool).
pub fn selector_labels(desired: &DesiredState) -> BTreeMap<String, String> {
    let model = sanitize_label_value(&desired.model_server.model_name);
    labels([
        ("app", desired.model_server.server_type.as_str()),
        ("model", model.as_str()),
    ])
}

/// Immutable Deployment selector; user labels stay out of it.
fn workload_selector(desired: &DesiredState) -> BTreeMap<String, String> {
    let mut lbls = selector_labels(desired);
    lbls.insert("app.kubernetes.io/instance".into(), desired.name.clone());
    lbls
}

fn pod_labels(desired: &DesiredState) -> BTreeMap<String, String> {
    let mut lbls = selector_labels(desired);
    lbls.extend(labels([
        ("app.kubernetes.io/name", "model-server"),
        ("app.kubernetes.io/instance", desired.name.as_str()),
        ("app.kubernetes.io/component", "inference"),
    ]));
    lbls.extend(desired.model_server.extra_labels.clone());
    lbls
}

fn args(desired: &DesiredState) -> Vec<String> {
    let ms = &desired.model_server;
    match ms.server_type {
        ServerType::Vllm => {
            let mut args = vec![
                format!("--model={}", ms.model_name),
                format!("--port={}", ms.port),
            ];
            if ms.enable_prefix_caching {
                args.push("--enable-prefix-caching".to_string());
            }
            args.push(format!(
                "--gpu-memory-utilization={:.2}",
                ms.gpu_memory_utilization
            ));
            args
        }
        ServerType::Tgi => vec![
            format!("--model-id={}", ms.model_name),
            format!("--port={}", ms.port),
            format!("--cuda-memory-fraction={:.2}", ms.gpu_memory_utilization),
        ],
    }
}

pub fn deployment(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let ms = &desired.model_server;
    let pod_lbls = pod_labels(desired);
    let container = Container {
        name: ms.server_type.as_str().to_string(),
        image: Some(ms.image.clone()),
        args: Some(args(desired)),
        ports: Some(vec![ContainerPort {
            name: Some("http".into()),
            container_port: ms.port,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        env: Some(vec![EnvVar {
            name: "HF_TOKEN".into(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: ms.hf_token_secret_name.clone(),
                    key: HF_TOKEN_SECRET_KEY.into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        resources: ms.resources.clone(),
        ..Default::default()
    };

    let dep = Deployment {
        metadata: meta(desired, ChildKind::Workload, Some(pod_lbls.clone())),
        spec: Some(DeploymentSpec {
            replicas: Some(ms.replicas),
            selector: LabelSelector {
                match_labels: Some(workload_selector(desired)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_lbls),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::from_typed(
        ResourceType::Deployment,
        child_name(&desired.name, ChildKind::Workload),
        desired,
        &dep,
    )
}

pub fn service(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let port = desired.model_server.port;
    let selector = selector_labels(desired);
    let svc = Service {
        metadata: meta(desired, ChildKind::AccessPoint, Some(selector.clone())),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("http".into()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            type_: Some(desired.gateway.service_type.as_str().to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::from_typed(
        ResourceType::Service,
        child_name(&desired.name, ChildKind::AccessPoint),
        desired,
        &svc,
    )
}
