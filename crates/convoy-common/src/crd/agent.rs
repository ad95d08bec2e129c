//! FleetAgent Custom Resource Definition
//!
//! A FleetAgent describes one managed agent deployment: a node-level daemon,
//! a cluster-level singleton, an optional cluster-checks runner and an
//! optional telemetry gateway. Which of these exist, and how they are
//! configured, is decided by the features enabled under `spec.features`.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::features::{CustomConfig, FeaturesSpec};

/// Desired state for a fleet of monitoring agents.
///
/// Example:
/// ```yaml
/// apiVersion: convoy.dev/v1alpha1
/// kind: FleetAgent
/// metadata:
///   name: datadog
///   namespace: monitoring
/// spec:
///   global:
///     clusterName: prod-eu-1
///     site: datadoghq.eu
///   features:
///     logCollection:
///       enabled: true
///     kubeStateMetricsCore:
///       enabled: true
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "convoy.dev",
    version = "v1alpha1",
    kind = "FleetAgent",
    namespaced,
    status = "FleetAgentStatus",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.global.clusterName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FleetAgentSpec {
    /// Settings shared by every component
    #[serde(default)]
    pub global: GlobalConfig,

    /// Optional capability modules
    #[serde(default)]
    pub features: FeaturesSpec,
}

/// Settings shared by every component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Cluster name reported by every agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Intake site (e.g. "datadoghq.com")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Agent log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Override for the cluster agent service account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_agent_service_account: Option<String>,

    /// Override for the cluster checks runner service account name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_checks_runner_service_account: Option<String>,
}

/// FleetAgent status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetAgentStatus {
    /// Generation last composed by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Ids of the features active in the last composition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_features: Vec<String>,
}

impl FleetAgent {
    /// Name of the owning FleetAgent object
    pub fn owner_name(&self) -> String {
        self.name_any()
    }

    /// Namespace of the FleetAgent, defaulting to "default"
    pub fn owner_namespace(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Check what the engine cannot degrade around: the owner name and every
    /// referenced ConfigMap end up in object names and volume sources.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.metadata.name.as_deref().map_or(true, str::is_empty) {
            return Err(crate::Error::validation("FleetAgent must have a name"));
        }

        let features = &self.spec.features;
        let confs = [
            (
                "spec.features.kubeStateMetricsCore.conf",
                features.kube_state_metrics_core.as_ref().and_then(|f| f.conf.as_ref()),
            ),
            (
                "spec.features.otelAgentGateway.conf",
                features.otel_agent_gateway.as_ref().and_then(|f| f.conf.as_ref()),
            ),
        ];
        for (field, conf) in confs {
            if let Some(conf) = conf {
                self.validate_custom_config(field, conf)?;
            }
        }
        Ok(())
    }

    fn validate_custom_config(&self, field: &str, conf: &CustomConfig) -> Result<(), crate::Error> {
        let Some(cm) = &conf.config_map else {
            return Ok(());
        };
        if conf.config_data.is_some() {
            return Err(crate::Error::validation_for_field(
                self.owner_name(),
                field,
                "configData and configMap can't be set together",
            ));
        }
        if cm.name.trim().is_empty() {
            return Err(crate::Error::validation_for_field(
                self.owner_name(),
                format!("{field}.configMap.name"),
                "ConfigMap reference must name a ConfigMap",
            ));
        }
        if let Some(item) = cm.items.iter().find(|i| i.key.is_empty() || i.path.is_empty()) {
            return Err(crate::Error::validation_for_field(
                self.owner_name(),
                format!("{field}.configMap.items"),
                format!("item {:?} needs both a key and a path", item.key),
            ));
        }
        Ok(())
    }

    /// Service account used by the cluster agent
    pub fn cluster_agent_service_account(&self) -> String {
        self.spec
            .global
            .cluster_agent_service_account
            .clone()
            .unwrap_or_else(|| format!("{}-cluster-agent", self.owner_name()))
    }

    /// Service account used by the cluster checks runner
    pub fn cluster_checks_runner_service_account(&self) -> String {
        self.spec
            .global
            .cluster_checks_runner_service_account
            .clone()
            .unwrap_or_else(|| format!("{}-cluster-checks-runner", self.owner_name()))
    }
}
