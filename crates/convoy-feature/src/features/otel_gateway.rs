//! Standalone OTel collector gateway

use convoy_common::checksum_annotation_key;
use convoy_common::crd::{is_enabled, CustomConfig, FleetAgent};

use super::{config_map, config_map_volume, env_var};
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::hash::config_hash;
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::store::{Dependencies, DependencyObject};
use crate::template::{ContainerName, TemplateManagers};

const VOLUME_NAME: &str = "otel-agent-config-volume";
const MOUNT_PATH: &str = "/etc/datadog-agent/otel";
const CONFIG_FILE: &str = "otel-config.yaml";

const DD_OTELCOLLECTOR_ENABLED: &str = "DD_OTELCOLLECTOR_ENABLED";
const DD_OTELCOLLECTOR_CONFIG: &str = "DD_OTELCOLLECTOR_CONFIG_PATH";

const DEFAULT_CONFIG: &str = "receivers:
  otlp:
    protocols:
      grpc:
        endpoint: 0.0.0.0:4317
      http:
        endpoint: 0.0.0.0:4318
exporters:
  datadog:
    api:
      key: ${env:DD_API_KEY}
      site: ${env:DD_SITE}
service:
  pipelines:
    traces:
      receivers: [otlp]
      exporters: [datadog]
    metrics:
      receivers: [otlp]
      exporters: [datadog]
    logs:
      receivers: [otlp]
      exporters: [datadog]
";

/// Gateway deployment receiving OTLP from the node agents
pub struct OtelGatewayFeature;

struct Plan {
    namespace: String,
    config_map_name: String,
    custom: Option<CustomConfig>,
    config_hash: Option<String>,
}

impl Feature for OtelGatewayFeature {
    fn id(&self) -> FeatureId {
        FeatureId::OtelAgentGateway
    }

    fn configure(&self, desired: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
        let Some(cfg) = desired
            .spec
            .features
            .otel_agent_gateway
            .as_ref()
            .filter(|c| is_enabled(c.enabled))
        else {
            return Configured::inactive();
        };

        let custom = cfg.conf.clone().filter(|c| !c.is_empty());
        let config_map_name = custom
            .as_ref()
            .and_then(|c| c.config_map.as_ref())
            .map(|cm| cm.name.clone())
            .unwrap_or_else(|| format!("{}-otel-agent-gateway-config", desired.owner_name()));

        Configured {
            required: RequiredComponents {
                otel_agent_gateway: RequiredComponent::with_containers(
                    Requirement::Required,
                    [ContainerName::OtelAgentGateway],
                ),
                ..Default::default()
            },
            plan: Box::new(Plan {
                namespace: desired.owner_namespace(),
                config_hash: config_hash(self.id().as_str(), custom.as_ref()),
                config_map_name,
                custom,
            }),
        }
    }
}

impl Plan {
    fn user_config_map(&self) -> bool {
        self.custom
            .as_ref()
            .is_some_and(|c| c.config_data.is_none() && c.config_map.is_some())
    }
}

impl FeaturePlan for Plan {
    fn manage_dependencies(&self, deps: &mut Dependencies, _: &RequiredComponents) -> Result<()> {
        if self.user_config_map() {
            return Ok(());
        }
        let data = self
            .custom
            .as_ref()
            .and_then(|c| c.config_data.as_deref())
            .unwrap_or(DEFAULT_CONFIG);
        let checksum = self.config_hash.clone().map(|hash| {
            (checksum_annotation_key(FeatureId::OtelAgentGateway.as_str()), hash)
        });
        deps.add_or_update(DependencyObject::ConfigMap(config_map(
            &self.config_map_name,
            &self.namespace,
            CONFIG_FILE,
            data,
            checksum,
        )));
        Ok(())
    }

    fn manage_otel_agent_gateway(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let gateway = ContainerName::OtelAgentGateway;
        let reference = self
            .custom
            .as_ref()
            .and_then(|c| c.config_map.as_ref())
            .filter(|_| self.user_config_map());
        let (volume, mount) =
            config_map_volume(VOLUME_NAME, reference, &self.config_map_name, MOUNT_PATH);
        managers.volume().add_to_container(volume, mount, gateway)?;

        if let Some(hash) = &self.config_hash {
            managers
                .annotation()
                .add_config_hash(FeatureId::OtelAgentGateway.as_str(), hash.clone());
        }

        let config_path = match reference.and_then(|cm| cm.items.first()) {
            Some(item) => format!("{MOUNT_PATH}/{}", item.path),
            None => format!("{MOUNT_PATH}/{CONFIG_FILE}"),
        };
        let mut env = managers.env_var();
        env.add_to_container(gateway, env_var(DD_OTELCOLLECTOR_ENABLED, "true"))?;
        env.add_to_container(gateway, env_var(DD_OTELCOLLECTOR_CONFIG, config_path))?;
        Ok(())
    }
}
