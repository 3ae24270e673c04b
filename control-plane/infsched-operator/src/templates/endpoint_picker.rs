use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::routing_config::{CONFIG_FILE_KEY, CONFIG_MOUNT_PATH};
use super::{ResourceDescriptor, TemplateError, labels, meta};
use crate::desired::DesiredState;
use crate::naming::{ChildKind, child_name};
use crate::registry::{INFERENCE_API_GROUP, ResourceType};

const READ_VERBS: [&str; 3] = ["get", "list", "watch"];

fn selector(desired: &DesiredState) -> BTreeMap<String, String> {
    labels([
        ("app", "epp"),
        ("app.kubernetes.io/instance", desired.name.as_str()),
    ])
}

fn pod_labels(desired: &DesiredState) -> BTreeMap<String, String> {
    let mut lbls = selector(desired);
    lbls.extend(labels([
        ("app.kubernetes.io/name", "endpoint-picker"),
        ("app.kubernetes.io/component", "routing"),
    ]));
    lbls
}

fn read_rule(group: &str, resource: &str) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(vec![resource.to_string()]),
        verbs: READ_VERBS.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

/// ServiceAccount, Role and RoleBinding sharing the identity name.
pub fn identity(desired: &DesiredState) -> Result<Vec<ResourceDescriptor>, TemplateError> {
    let name = child_name(&desired.name, ChildKind::RoutingIdentity);
    let sa = ServiceAccount {
        metadata: meta(desired, ChildKind::RoutingIdentity, None),
        ..Default::default()
    };
    let role = Role {
        metadata: meta(desired, ChildKind::RoutingIdentity, None),
        rules: Some(vec![
            read_rule("", "pods"),
            read_rule(INFERENCE_API_GROUP, "inferencepools"),
        ]),
    };
    let binding = RoleBinding {
        metadata: meta(desired, ChildKind::RoutingIdentity, None),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".into(),
            kind: "Role".into(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".into(),
            name: name.clone(),
            namespace: Some(desired.namespace.clone()),
            ..Default::default()
        }]),
    };
    Ok(vec![
        ResourceDescriptor::from_typed(ResourceType::ServiceAccount, name.clone(), desired, &sa)?,
        ResourceDescriptor::from_typed(ResourceType::Role, name.clone(), desired, &role)?,
        ResourceDescriptor::from_typed(ResourceType::RoleBinding, name, desired, &binding)?,
    ])
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".into()),
        ..Default::default()
    }
}

pub fn deployment(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let ep = &desired.endpoint_picker;
    let pod_lbls = pod_labels(desired);
    let config_name = child_name(&desired.name, ChildKind::RoutingConfig);
    let container = Container {
        name: "epp".into(),
        image: Some(ep.image.clone()),
        args: Some(vec![
            format!("--pool-name={}", child_name(&desired.name, ChildKind::Pool)),
            format!("--pool-namespace={}", desired.namespace),
            format!("--grpc-port={}", ep.grpc_port),
            format!("--grpc-health-port={}", ep.health_port),
            format!("--config-file={}/{}", CONFIG_MOUNT_PATH, CONFIG_FILE_KEY),
            "--v=2".to_string(),
        ]),
        ports: Some(vec![
            container_port("grpc", ep.grpc_port),
            container_port("health", ep.health_port),
            container_port("metrics", ep.metrics_port),
        ]),
        resources: ep.resources.clone(),
        volume_mounts: Some(vec![VolumeMount {
            name: "config".into(),
            mount_path: CONFIG_MOUNT_PATH.into(),
            ..Default::default()
        }]),
        ..Default::default()
    };
    let dep = Deployment {
        metadata: meta(desired, ChildKind::RoutingWorkload, Some(pod_lbls.clone())),
        spec: Some(DeploymentSpec {
            replicas: Some(ep.replicas),
            selector: LabelSelector {
                match_labels: Some(selector(desired)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_lbls),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(child_name(
                        &desired.name,
                        ChildKind::RoutingIdentity,
                    )),
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: "config".into(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: config_name,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::from_typed(
        ResourceType::Deployment,
        child_name(&desired.name, ChildKind::RoutingWorkload),
        desired,
        &dep,
    )
}

pub fn service(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let ep = &desired.endpoint_picker;
    let sel = selector(desired);
    let svc = Service {
        metadata: meta(desired, ChildKind::RoutingAccessPoint, Some(sel.clone())),
        spec: Some(ServiceSpec {
            selector: Some(sel),
            ports: Some(vec![
                service_port("grpc", ep.grpc_port),
                service_port("health", ep.health_port),
                service_port("metrics", ep.metrics_port),
            ]),
            type_: Some("ClusterIP".into()),
            ..Default::default()
        }),
        ..Default::default()
    };
    ResourceDescriptor::from_typed(
        ResourceType::Service,
        child_name(&desired.name, ChildKind::RoutingAccessPoint),
        desired,
        &svc,
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::desired;
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_binds_service_account_to_role() {
        let objs = identity(&desired()).unwrap();
        let kinds: Vec<_> = objs.iter().map(|o| o.resource).collect();
        assert_eq!(
            kinds,
            vec![ResourceType::ServiceAccount, ResourceType::Role, ResourceType::RoleBinding]
        );
        assert!(objs.iter().all(|o| o.name == "llama-epp-identity"));
        let role = &objs[1].payload;
        assert_eq!(role["rules"][0]["resources"], json!(["pods"]));
        assert_eq!(role["rules"][1]["apiGroups"], json!(["inference.networking.k8s.io"]));
        assert_eq!(role["rules"][1]["verbs"], json!(["get", "list", "watch"]));
        let binding = &objs[2].payload;
        assert_eq!(binding["roleRef"]["name"], "llama-epp-identity");
        assert_eq!(binding["subjects"][0]["name"], "llama-epp-identity");
        assert_eq!(binding["subjects"][0]["namespace"], "models");
    }

    #[test]
    fn deployment_points_at_pool_and_config() {
        let d = deployment(&desired()).unwrap();
        let pod = &d.payload["spec"]["template"]["spec"];
        assert_eq!(pod["serviceAccountName"], "llama-epp-identity");
        assert_eq!(pod["volumes"][0]["configMap"]["name"], "llama-epp-config");
        let c = &pod["containers"][0];
        assert_eq!(
            c["args"],
            json!([
                "--pool-name=llama-pool",
                "--pool-namespace=models",
                "--grpc-port=9002",
                "--grpc-health-port=9003",
                "--config-file=/config/plugins.yaml",
                "--v=2"
            ])
        );
        let ports: Vec<_> = c["ports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["containerPort"].as_i64().unwrap())
            .collect();
        assert_eq!(ports, vec![9002, 9003, 9090]);
    }

    #[test]
    fn service_exposes_grpc_health_and_metrics() {
        let s = service(&desired()).unwrap();
        assert_eq!(s.name, "llama-epp-svc");
        let names: Vec<_> = s.payload["spec"]["ports"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["grpc", "health", "metrics"]);
        assert_eq!(s.payload["spec"]["selector"]["app.kubernetes.io/instance"], "llama");
    }
}
