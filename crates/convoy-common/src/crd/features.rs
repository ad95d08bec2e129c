//! Per-feature sections of the FleetAgent spec
//!
//! Every section carries an `enabled` toggle. A missing section and a section
//! with `enabled` unset are both treated as "not configured".

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Optional capability modules
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesSpec {
    /// Container and pod log collection on the node agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_collection: Option<LogCollectionFeatureConfig>,

    /// Network performance monitoring (system-probe)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npm: Option<NpmFeatureConfig>,

    /// Cluster checks dispatching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks: Option<ClusterChecksFeatureConfig>,

    /// Kubernetes state core check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_state_metrics_core: Option<KubeStateMetricsCoreFeatureConfig>,

    /// OpenTelemetry agent gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otel_agent_gateway: Option<OtelAgentGatewayFeatureConfig>,
}

/// Log collection settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectionFeatureConfig {
    /// Enable log collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Collect logs from every container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_collect_all: Option<bool>,

    /// Tail container log files instead of using the runtime socket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_collect_using_files: Option<bool>,

    /// Host path of container logs (default `/var/lib/docker/containers`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_logs_path: Option<String>,

    /// Host path of pod logs (default `/var/log/pods`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_logs_path: Option<String>,

    /// Host path of container symlinks (default `/var/log/containers`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_symlinks_path: Option<String>,

    /// Host path used to persist tailing offsets (default `/var/lib/datadog-agent/logs`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_storage_path: Option<String>,

    /// Maximum number of files tailed at once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_files_limit: Option<i32>,
}

/// Network performance monitoring settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NpmFeatureConfig {
    /// Enable network performance monitoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Collect DNS statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_dns_stats: Option<bool>,

    /// Use conntrack to resolve NAT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_conntrack: Option<bool>,
}

/// Cluster checks settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterChecksFeatureConfig {
    /// Enable cluster checks dispatching from the cluster agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Run dispatched checks in dedicated cluster checks runners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cluster_checks_runners: Option<bool>,
}

/// Kubernetes state core check settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeStateMetricsCoreFeatureConfig {
    /// Enable the kubernetes_state_core check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Custom check configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<CustomConfig>,
}

/// OpenTelemetry agent gateway settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtelAgentGatewayFeatureConfig {
    /// Enable the gateway deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Custom collector configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<CustomConfig>,
}

/// Operator-supplied configuration payload
///
/// Either inline data or a reference to an existing ConfigMap, never both:
/// [`FleetAgent::validate`](super::FleetAgent::validate) rejects a document
/// that sets the two together.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfig {
    /// Inline configuration (usually YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_data: Option<String>,

    /// Reference to an existing ConfigMap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapConfig>,
}

impl CustomConfig {
    /// True when neither inline data nor a ConfigMap reference is set
    pub fn is_empty(&self) -> bool {
        self.config_data.is_none() && self.config_map.is_none()
    }
}

/// Reference to a user-managed ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapConfig {
    /// ConfigMap name
    pub name: String,

    /// Keys to project, with their file paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ConfigMapItem>,
}

/// A single key-to-path projection of a ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapItem {
    /// ConfigMap key
    pub key: String,
    /// Relative file path
    pub path: String,
}
