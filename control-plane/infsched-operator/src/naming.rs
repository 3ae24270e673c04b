use crate::registry::ResourceType;

/// Longest root name for which every child name is still a valid DNS label.
pub const MAX_ROOT_NAME_LEN: usize = 63 - "-model-server-svc".len();

const MAX_LABEL_VALUE_LEN: usize = 63;

/// Child groups in creation order. Each maps to one name suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Workload,
    AccessPoint,
    RoutingIdentity,
    RoutingConfig,
    RoutingWorkload,
    RoutingAccessPoint,
    Pool,
    Gateway,
    Route,
}

impl ChildKind {
    pub const ALL: [ChildKind; 9] = [
        ChildKind::Workload,
        ChildKind::AccessPoint,
        ChildKind::RoutingIdentity,
        ChildKind::RoutingConfig,
        ChildKind::RoutingWorkload,
        ChildKind::RoutingAccessPoint,
        ChildKind::Pool,
        ChildKind::Gateway,
        ChildKind::Route,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            ChildKind::Workload => "model-server",
            ChildKind::AccessPoint => "model-server-svc",
            ChildKind::RoutingIdentity => "epp-identity",
            ChildKind::RoutingConfig => "epp-config",
            ChildKind::RoutingWorkload => "epp",
            ChildKind::RoutingAccessPoint => "epp-svc",
            ChildKind::Pool => "pool",
            ChildKind::Gateway => "gateway",
            ChildKind::Route => "route",
        }
    }

    /// Object types created under this kind's name, in creation order.
    pub fn resources(&self) -> &'static [ResourceType] {
        match self {
            ChildKind::Workload | ChildKind::RoutingWorkload => {
                &[ResourceType::Deployment]
            }
            ChildKind::AccessPoint | ChildKind::RoutingAccessPoint => {
                &[ResourceType::Service]
            }
            ChildKind::RoutingIdentity => &[
                ResourceType::ServiceAccount,
                ResourceType::Role,
                ResourceType::RoleBinding,
            ],
            ChildKind::RoutingConfig => &[ResourceType::ConfigMap],
            ChildKind::Pool => &[ResourceType::InferencePool],
            ChildKind::Gateway => &[ResourceType::Gateway],
            ChildKind::Route => &[ResourceType::HttpRoute],
        }
    }
}

pub fn child_name(root: &str, kind: ChildKind) -> String {
    format!("{}-{}", root, kind.suffix())
}

/// Every child object of `root` as `(type, name)` in creation order.
pub fn child_objects(root: &str) -> Vec<(ResourceType, String)> {
    ChildKind::ALL
        .iter()
        .flat_map(|kind| {
            let name = child_name(root, *kind);
            kind.resources().iter().map(move |rt| (*rt, name.clone()))
        })
        .collect()
}

/// Turn an arbitrary string (e.g. `meta-llama/Llama-3.1-8B`) into a label value.
pub fn sanitize_label_value(raw: &str) -> String {
    let mapped: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('-');
    let mut out: String = trimmed.chars().take(MAX_LABEL_VALUE_LEN).collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}
