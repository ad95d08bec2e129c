//! Cluster checks dispatch from the cluster agent

use convoy_common::crd::{is_enabled, FleetAgent};
use tracing::warn;

use super::env_var;
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::hash::digest_value;
use crate::merger::MergeStrategy;
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::template::{ContainerName, TemplateManagers};

const DD_CLUSTER_CHECKS_ENABLED: &str = "DD_CLUSTER_CHECKS_ENABLED";
const DD_EXTRA_CONFIG_PROVIDERS: &str = "DD_EXTRA_CONFIG_PROVIDERS";
const DD_EXTRA_LISTENERS: &str = "DD_EXTRA_LISTENERS";

const KUBE_SERVICES_AND_ENDPOINTS: &str = "kube_services kube_endpoints";
const CLUSTER_CHECKS_PROVIDER: &str = "clusterchecks";
const ENDPOINTS_CHECKS_PROVIDER: &str = "endpointschecks";

/// Dispatches cluster-level checks to node agents or dedicated runners
pub struct ClusterChecksFeature;

struct Plan {
    use_runners: bool,
    config_hash: Option<String>,
}

impl Feature for ClusterChecksFeature {
    fn id(&self) -> FeatureId {
        FeatureId::ClusterChecks
    }

    fn configure(&self, desired: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
        let Some(cfg) = desired
            .spec
            .features
            .cluster_checks
            .as_ref()
            .filter(|c| is_enabled(c.enabled))
        else {
            return Configured::inactive();
        };

        let config_hash = match serde_json::to_value(cfg) {
            Ok(value) => Some(digest_value(&value)),
            Err(error) => {
                warn!(feature = %self.id(), %error, "could not hash cluster checks config");
                None
            }
        };
        let use_runners = cfg.use_cluster_checks_runners.unwrap_or(false);

        Configured {
            required: RequiredComponents {
                node_agent: RequiredComponent::required(),
                cluster_agent: RequiredComponent::required(),
                cluster_checks_runner: RequiredComponent {
                    requirement: Requirement::from_bool(use_runners),
                    containers: Vec::new(),
                },
                ..Default::default()
            },
            plan: Box::new(Plan {
                use_runners,
                config_hash,
            }),
        }
    }
}

impl FeaturePlan for Plan {
    fn manage_node_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let providers = if self.use_runners {
            ENDPOINTS_CHECKS_PROVIDER.to_string()
        } else {
            format!("{CLUSTER_CHECKS_PROVIDER} {ENDPOINTS_CHECKS_PROVIDER}")
        };
        managers.env_var().add_to_container_with_strategy(
            ContainerName::CoreAgent,
            env_var(DD_EXTRA_CONFIG_PROVIDERS, providers),
            MergeStrategy::Append,
        )?;
        Ok(())
    }

    fn manage_cluster_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let agent = ContainerName::ClusterAgent;
        let mut env = managers.env_var();
        env.add_to_container(agent, env_var(DD_CLUSTER_CHECKS_ENABLED, "true"))?;
        env.add_to_container_with_strategy(
            agent,
            env_var(DD_EXTRA_CONFIG_PROVIDERS, KUBE_SERVICES_AND_ENDPOINTS),
            MergeStrategy::Append,
        )?;
        env.add_to_container_with_strategy(
            agent,
            env_var(DD_EXTRA_LISTENERS, KUBE_SERVICES_AND_ENDPOINTS),
            MergeStrategy::Append,
        )?;

        if let Some(hash) = &self.config_hash {
            managers
                .annotation()
                .add_config_hash(FeatureId::ClusterChecks.as_str(), hash.clone());
        }
        Ok(())
    }

    fn manage_cluster_checks_runner(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let runner = ContainerName::ClusterChecksRunner;
        let mut env = managers.env_var();
        env.add_to_container(runner, env_var(DD_CLUSTER_CHECKS_ENABLED, "true"))?;
        env.add_to_container_with_strategy(
            runner,
            env_var(DD_EXTRA_CONFIG_PROVIDERS, CLUSTER_CHECKS_PROVIDER),
            MergeStrategy::Append,
        )?;
        Ok(())
    }
}
