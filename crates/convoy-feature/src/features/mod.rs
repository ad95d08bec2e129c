//! Built-in features
//!
//! Each module holds one [`Feature`](crate::Feature) and its plan. The
//! helpers below build the typed objects they share.

mod cluster_checks;
mod enable_default;
mod kube_state_core;
mod log_collection;
mod npm;
mod otel_gateway;

pub use cluster_checks::ClusterChecksFeature;
pub use enable_default::EnableDefaultFeature;
pub use kube_state_core::KubeStateCoreFeature;
pub use log_collection::LogCollectionFeature;
pub use npm::NpmFeature;
pub use otel_gateway::OtelGatewayFeature;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, EmptyDirVolumeSource, EnvVar, HostPathVolumeSource,
    KeyToPath, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use convoy_common::crd::ConfigMapConfig;

use crate::config::FeatureOptions;
use crate::error::Result;
use crate::feature::{Feature, FeatureId, FeatureRegistry};

/// Check configuration directory inside every agent image
pub(crate) const CONFD_PATH: &str = "/etc/datadog-agent/conf.d";

/// Register every built-in feature
pub fn register_builtin(registry: &mut FeatureRegistry) -> Result<()> {
    registry.register(FeatureId::EnableDefault, enable_default)?;
    registry.register(FeatureId::ClusterChecks, cluster_checks)?;
    registry.register(FeatureId::KubernetesStateCore, kube_state_core)?;
    registry.register(FeatureId::LogCollection, log_collection)?;
    registry.register(FeatureId::Npm, npm)?;
    registry.register(FeatureId::OtelAgentGateway, otel_gateway)?;
    Ok(())
}

fn enable_default(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(EnableDefaultFeature)
}

fn cluster_checks(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(ClusterChecksFeature)
}

fn kube_state_core(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(KubeStateCoreFeature)
}

fn log_collection(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(LogCollectionFeature)
}

fn npm(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(NpmFeature)
}

fn otel_gateway(_: &FeatureOptions) -> Box<dyn Feature> {
    Box::new(OtelGatewayFeature)
}

// =============================================================================
// Object helpers
// =============================================================================

/// Literal env var
pub(crate) fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Host path volume and its mount
pub(crate) fn host_path_volume(
    name: &str,
    host_path: &str,
    mount_path: &str,
    read_only: bool,
) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: host_path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };
    (volume, mount(name, mount_path, read_only))
}

/// EmptyDir volume and its mount
pub(crate) fn empty_dir_volume(
    name: &str,
    mount_path: &str,
    read_only: bool,
) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    (volume, mount(name, mount_path, read_only))
}

/// ConfigMap volume and its read-only mount.
///
/// A user-supplied reference projects its own items; otherwise the whole
/// ConfigMap named `default_name` is mounted.
pub(crate) fn config_map_volume(
    name: &str,
    reference: Option<&ConfigMapConfig>,
    default_name: &str,
    mount_path: &str,
) -> (Volume, VolumeMount) {
    let source = match reference {
        Some(cm) => ConfigMapVolumeSource {
            name: cm.name.clone(),
            items: (!cm.items.is_empty()).then(|| {
                cm.items
                    .iter()
                    .map(|item| KeyToPath {
                        key: item.key.clone(),
                        path: item.path.clone(),
                        ..Default::default()
                    })
                    .collect()
            }),
            ..Default::default()
        },
        None => ConfigMapVolumeSource {
            name: default_name.to_string(),
            ..Default::default()
        },
    };
    let volume = Volume {
        name: name.to_string(),
        config_map: Some(source),
        ..Default::default()
    };
    (volume, mount(name, mount_path, true))
}

/// ConfigMap holding one file, annotated with its config hash when known
pub(crate) fn config_map(
    name: &str,
    namespace: &str,
    file_name: &str,
    contents: &str,
    checksum: Option<(String, String)>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: checksum.map(|(k, v)| BTreeMap::from([(k, v)])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(file_name.to_string(), contents.to_string())])),
        ..Default::default()
    }
}

fn mount(name: &str, mount_path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for running one feature in isolation

    use convoy_common::crd::{FleetAgent, FleetAgentSpec};
    use k8s_openapi::api::core::v1::{EnvVar, PodTemplateSpec};

    use crate::config::FeatureOptions;
    use crate::feature::{ConfigureContext, Configured, Feature};
    use crate::platform::{PlatformInfo, StaticPlatformInfo};
    use crate::template::{ContainerName, WorkloadTarget, WorkloadTemplateSet};

    pub fn agent(spec: FleetAgentSpec) -> FleetAgent {
        let mut agent = FleetAgent::new("datadog", spec);
        agent.metadata.namespace = Some("monitoring".to_string());
        agent
    }

    pub fn configure(feature: &dyn Feature, desired: &FleetAgent) -> Configured {
        configure_with(feature, desired, &FeatureOptions::default(), &StaticPlatformInfo::default())
    }

    pub fn configure_with(
        feature: &dyn Feature,
        desired: &FleetAgent,
        options: &FeatureOptions,
        platform: &dyn PlatformInfo,
    ) -> Configured {
        let ctx = ConfigureContext { options, platform };
        feature.configure(desired, &ctx)
    }

    /// Templates for the feature's own requirements, with every manage step applied
    pub fn apply(configured: &Configured) -> WorkloadTemplateSet {
        let mut set = WorkloadTemplateSet::from_required(&configured.required);
        for target in configured.required.configured_targets() {
            let Some(template) = set.get_mut(target) else { continue };
            let mut managers = template.managers();
            let plan = &configured.plan;
            let result = match target {
                WorkloadTarget::NodeAgent => plan.manage_node_agent(&mut managers),
                WorkloadTarget::ClusterAgent => plan.manage_cluster_agent(&mut managers),
                WorkloadTarget::ClusterChecksRunner => {
                    plan.manage_cluster_checks_runner(&mut managers)
                }
                WorkloadTarget::OtelAgentGateway => plan.manage_otel_agent_gateway(&mut managers),
            };
            result.expect("manage step");
        }
        set
    }

    pub fn pod(set: &WorkloadTemplateSet, target: WorkloadTarget) -> PodTemplateSpec {
        set.get(target).expect("target present").pod_template().clone()
    }

    pub fn envs(
        set: &WorkloadTemplateSet,
        target: WorkloadTarget,
        container: ContainerName,
    ) -> Vec<EnvVar> {
        set.get(target)
            .and_then(|t| t.container(container))
            .and_then(|c| c.env.clone())
            .unwrap_or_default()
    }

    pub fn env_value(
        set: &WorkloadTemplateSet,
        target: WorkloadTarget,
        container: ContainerName,
        name: &str,
    ) -> Option<String> {
        envs(set, target, container)
            .into_iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value)
    }
}
