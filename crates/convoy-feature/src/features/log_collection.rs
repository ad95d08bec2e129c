//! Container and pod log collection on the node agent

use convoy_common::crd::{is_enabled, FleetAgent};
use k8s_openapi::api::core::v1::{Volume, VolumeMount};

use super::{env_var, host_path_volume};
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::template::{ContainerName, TemplateManagers};

const POINTER_VOLUME: &str = "pointerdir";
const POINTER_MOUNT_PATH: &str = "/opt/datadog-agent/run";
const POD_LOG_VOLUME: &str = "logpodpath";
const POD_LOG_MOUNT_PATH: &str = "/var/log/pods";
const CONTAINER_LOG_VOLUME: &str = "logcontainerpath";
const CONTAINER_LOG_MOUNT_PATH: &str = "/var/lib/docker/containers";
const SYMLINK_VOLUME: &str = "symlinkcontainerpath";
const SYMLINK_MOUNT_PATH: &str = "/var/log/containers";

const DEFAULT_TEMP_STORAGE_PATH: &str = "/var/lib/datadog-agent/logs";

const DD_LOGS_ENABLED: &str = "DD_LOGS_ENABLED";
const DD_LOGS_COLLECT_ALL: &str = "DD_LOGS_CONFIG_CONTAINER_COLLECT_ALL";
const DD_LOGS_USE_FILE: &str = "DD_LOGS_CONFIG_K8S_CONTAINER_USE_FILE";
const DD_LOGS_OPEN_FILES_LIMIT: &str = "DD_LOGS_CONFIG_OPEN_FILES_LIMIT";

/// Log collection from the host's container and pod log directories
pub struct LogCollectionFeature;

struct Plan {
    collect_all: bool,
    using_files: bool,
    open_files_limit: Option<i32>,
    volumes: Vec<(Volume, VolumeMount)>,
}

impl Feature for LogCollectionFeature {
    fn id(&self) -> FeatureId {
        FeatureId::LogCollection
    }

    fn configure(&self, desired: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
        let Some(cfg) = desired
            .spec
            .features
            .log_collection
            .as_ref()
            .filter(|c| is_enabled(c.enabled))
        else {
            return Configured::inactive();
        };

        let path = |value: &Option<String>, default: &str| {
            value.clone().unwrap_or_else(|| default.to_string())
        };
        let volumes = vec![
            host_path_volume(
                POINTER_VOLUME,
                &path(&cfg.temp_storage_path, DEFAULT_TEMP_STORAGE_PATH),
                POINTER_MOUNT_PATH,
                false,
            ),
            host_path_volume(
                POD_LOG_VOLUME,
                &path(&cfg.pod_logs_path, POD_LOG_MOUNT_PATH),
                POD_LOG_MOUNT_PATH,
                true,
            ),
            host_path_volume(
                CONTAINER_LOG_VOLUME,
                &path(&cfg.container_logs_path, CONTAINER_LOG_MOUNT_PATH),
                CONTAINER_LOG_MOUNT_PATH,
                true,
            ),
            host_path_volume(
                SYMLINK_VOLUME,
                &path(&cfg.container_symlinks_path, SYMLINK_MOUNT_PATH),
                SYMLINK_MOUNT_PATH,
                true,
            ),
        ];

        Configured {
            required: RequiredComponents {
                node_agent: RequiredComponent::with_containers(
                    Requirement::Required,
                    [ContainerName::CoreAgent],
                ),
                ..Default::default()
            },
            plan: Box::new(Plan {
                collect_all: cfg.container_collect_all.unwrap_or(false),
                using_files: cfg.container_collect_using_files.unwrap_or(true),
                open_files_limit: cfg.open_files_limit.filter(|limit| *limit > 0),
                volumes,
            }),
        }
    }
}

impl FeaturePlan for Plan {
    fn manage_node_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let agent = ContainerName::CoreAgent;
        for (volume, mount) in &self.volumes {
            managers
                .volume()
                .add_to_container(volume.clone(), mount.clone(), agent)?;
        }

        let mut env = managers.env_var();
        env.add_to_container(agent, env_var(DD_LOGS_ENABLED, "true"))?;
        env.add_to_container(agent, env_var(DD_LOGS_COLLECT_ALL, self.collect_all.to_string()))?;
        env.add_to_container(agent, env_var(DD_LOGS_USE_FILE, self.using_files.to_string()))?;
        if let Some(limit) = self.open_files_limit {
            env.add_to_container(agent, env_var(DD_LOGS_OPEN_FILES_LIMIT, limit.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{agent, apply, configure, env_value, pod};
    use crate::template::WorkloadTarget;
    use convoy_common::crd::{FeaturesSpec, FleetAgentSpec, LogCollectionFeatureConfig};

    fn spec(cfg: LogCollectionFeatureConfig) -> FleetAgentSpec {
        FleetAgentSpec {
            features: FeaturesSpec {
                log_collection: Some(cfg),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn disabled_or_absent_is_inactive() {
        let absent = configure(&LogCollectionFeature, &agent(FleetAgentSpec::default()));
        assert!(!absent.required.is_configured());

        let disabled = configure(
            &LogCollectionFeature,
            &agent(spec(LogCollectionFeatureConfig {
                enabled: Some(false),
                ..Default::default()
            })),
        );
        assert!(!disabled.required.is_configured());
    }

    #[test]
    fn mounts_log_directories_into_core_agent() {
        let configured = configure(
            &LogCollectionFeature,
            &agent(spec(LogCollectionFeatureConfig {
                enabled: Some(true),
                container_collect_all: Some(true),
                open_files_limit: Some(500),
                ..Default::default()
            })),
        );
        let set = apply(&configured);
        let pod = pod(&set, WorkloadTarget::NodeAgent);
        let spec = pod.spec.expect("pod spec");

        let names: Vec<String> = spec
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(
            names,
            vec![POINTER_VOLUME, POD_LOG_VOLUME, CONTAINER_LOG_VOLUME, SYMLINK_VOLUME]
        );

        let mounts = spec.containers[0].volume_mounts.clone().unwrap_or_default();
        assert_eq!(mounts.len(), 4);
        assert!(mounts
            .iter()
            .all(|m| m.read_only == Some(m.name != POINTER_VOLUME)));

        let value =
            |name| env_value(&set, WorkloadTarget::NodeAgent, ContainerName::CoreAgent, name);
        assert_eq!(value(DD_LOGS_ENABLED).as_deref(), Some("true"));
        assert_eq!(value(DD_LOGS_COLLECT_ALL).as_deref(), Some("true"));
        assert_eq!(value(DD_LOGS_USE_FILE).as_deref(), Some("true"));
        assert_eq!(value(DD_LOGS_OPEN_FILES_LIMIT).as_deref(), Some("500"));
    }

    #[test]
    fn custom_temp_storage_path_backs_pointer_volume() {
        let configured = configure(
            &LogCollectionFeature,
            &agent(spec(LogCollectionFeatureConfig {
                enabled: Some(true),
                temp_storage_path: Some("/data/dd-logs".into()),
                ..Default::default()
            })),
        );
        let set = apply(&configured);
        let volumes = pod(&set, WorkloadTarget::NodeAgent)
            .spec
            .and_then(|s| s.volumes)
            .unwrap_or_default();
        let pointer = volumes
            .iter()
            .find(|v| v.name == POINTER_VOLUME)
            .and_then(|v| v.host_path.as_ref())
            .map(|h| h.path.clone());
        assert_eq!(pointer.as_deref(), Some("/data/dd-logs"));
    }
}
