use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde::{Deserialize, Serialize};

use super::{ResourceDescriptor, TemplateError, meta};
use crate::desired::DesiredState;
use crate::naming::{ChildKind, child_name};
use crate::registry::ResourceType;

pub const CONFIG_FILE_KEY: &str = "plugins.yaml";
pub const CONFIG_MOUNT_PATH: &str = "/config";

/// Plugin configuration file read by the endpoint picker.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPickerConfig {
    pub api_version: String,
    pub kind: String,
    pub plugins: Vec<PluginEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PluginEntry {
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl EndpointPickerConfig {
    pub fn from_desired(desired: &DesiredState) -> Self {
        Self {
            api_version: "inference.networking.x-k8s.io/v1alpha1".into(),
            kind: "EndpointPickerConfig".into(),
            plugins: desired
                .endpoint_picker
                .scorers
                .iter()
                .map(|s| PluginEntry {
                    plugin_type: s.plugin_type.to_string(),
                    weight: s.weight,
                    parameters: s.parameters.clone(),
                })
                .collect(),
        }
    }
}

pub fn config_map(desired: &DesiredState) -> Result<ResourceDescriptor, TemplateError> {
    let rendered = serde_yaml::to_string(&EndpointPickerConfig::from_desired(desired))?;
    let cm = ConfigMap {
        metadata: meta(desired, ChildKind::RoutingConfig, None),
        data: Some(BTreeMap::from([(CONFIG_FILE_KEY.to_string(), rendered)])),
        ..Default::default()
    };
    ResourceDescriptor::from_typed(
        ResourceType::ConfigMap,
        child_name(&desired.name, ChildKind::RoutingConfig),
        desired,
        &cm,
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{desired, desired_from, spec};
    use super::*;
    use crate::crd::{PluginConfig, ScorerPlugin};

    fn parse(d: &ResourceDescriptor) -> EndpointPickerConfig {
        let yaml = d.payload["data"][CONFIG_FILE_KEY].as_str().unwrap();
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn no_plugins_renders_empty_list() {
        let cfg = parse(&config_map(&desired()).unwrap());
        assert_eq!(cfg.kind, "EndpointPickerConfig");
        assert_eq!(cfg.api_version, "inference.networking.x-k8s.io/v1alpha1");
        assert!(cfg.plugins.is_empty());
    }

    #[test]
    fn enabled_scorers_render_with_defaults() {
        let mut s = spec();
        s.endpoint_picker.plugins = Some(PluginConfig {
            load_aware_scorer: Some(ScorerPlugin::default()),
            prefix_cache_scorer: Some(ScorerPlugin::default()),
            kv_cache_utilization_scorer: Some(ScorerPlugin::default()),
        });
        let cm = config_map(&desired_from(s)).unwrap();
        assert_eq!(cm.name, "llama-epp-config");
        let cfg = parse(&cm);
        let types: Vec<_> = cfg.plugins.iter().map(|p| p.plugin_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["load-aware-scorer", "prefix-cache-scorer", "kv-cache-utilization-scorer"]
        );
        assert_eq!(cfg.plugins[0].parameters["queueThreshold"], "128");
        assert_eq!(cfg.plugins[1].weight, 2.0);
        assert_eq!(cfg.plugins[1].parameters["cacheHitBonus"], "1.0");
        assert!(cfg.plugins[2].parameters.is_empty());
    }
}
