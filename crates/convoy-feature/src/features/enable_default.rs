//! Baseline settings every FleetAgent carries

use convoy_common::crd::FleetAgent;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::env_var;
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::merger::AccessRule;
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::store::{Dependencies, DependencyObject};
use crate::template::{ContainerName, TemplateManagers};

const DD_CLUSTER_NAME: &str = "DD_CLUSTER_NAME";
const DD_SITE: &str = "DD_SITE";
const DD_LOG_LEVEL: &str = "DD_LOG_LEVEL";
const DD_PROCESS_RUN_IN_CORE_AGENT: &str = "DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT_ENABLED";

/// Always-on feature: global env, service accounts and baseline access
pub struct EnableDefaultFeature;

struct Plan {
    namespace: String,
    cluster_agent_sa: String,
    runner_sa: String,
    globals: Vec<(&'static str, String)>,
    process_in_core_agent: bool,
}

impl Feature for EnableDefaultFeature {
    fn id(&self) -> FeatureId {
        FeatureId::EnableDefault
    }

    fn configure(&self, desired: &FleetAgent, ctx: &ConfigureContext<'_>) -> Configured {
        let global = &desired.spec.global;
        let globals = [
            (DD_CLUSTER_NAME, &global.cluster_name),
            (DD_SITE, &global.site),
            (DD_LOG_LEVEL, &global.log_level),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
        .collect();

        let mut node_containers = vec![ContainerName::CoreAgent];
        if ctx.options.otel_agent_enabled {
            node_containers.push(ContainerName::OtelAgent);
        }

        let required = RequiredComponents {
            node_agent: RequiredComponent::with_containers(Requirement::Required, node_containers),
            cluster_agent: RequiredComponent::with_containers(
                Requirement::Required,
                [ContainerName::ClusterAgent],
            ),
            ..Default::default()
        };

        Configured {
            required,
            plan: Box::new(Plan {
                namespace: desired.owner_namespace(),
                cluster_agent_sa: desired.cluster_agent_service_account(),
                runner_sa: desired.cluster_checks_runner_service_account(),
                globals,
                process_in_core_agent: ctx.options.process_checks_in_core_agent,
            }),
        }
    }
}

impl Plan {
    fn service_account(&self, name: &str) -> DependencyObject {
        DependencyObject::ServiceAccount(ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn add_globals(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        for (name, value) in &self.globals {
            managers.env_var().add(env_var(name, value.as_str()))?;
        }
        Ok(())
    }
}

impl FeaturePlan for Plan {
    fn manage_dependencies(
        &self,
        deps: &mut Dependencies,
        required: &RequiredComponents,
    ) -> Result<()> {
        if required.cluster_agent.is_enabled() {
            deps.add_or_update(self.service_account(&self.cluster_agent_sa));
            deps.access_rules_mut().add_cluster_policy_rules(
                &self.namespace,
                &self.cluster_agent_sa,
                &self.cluster_agent_sa,
                [AccessRule::new(
                    "",
                    ["namespaces", "nodes", "events"],
                    ["get", "list", "watch"],
                )],
            );
        }
        if required.cluster_checks_runner.is_enabled() {
            deps.add_or_update(self.service_account(&self.runner_sa));
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        self.add_globals(managers)?;
        managers.env_var().add_to_container(
            ContainerName::CoreAgent,
            env_var(DD_PROCESS_RUN_IN_CORE_AGENT, self.process_in_core_agent.to_string()),
        )?;
        Ok(())
    }

    fn manage_cluster_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        self.add_globals(managers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureOptions;
    use crate::features::test_support::{agent, apply, configure, configure_with, env_value, envs};
    use crate::platform::StaticPlatformInfo;
    use crate::store::{DependencyKind, ObjectKey};
    use crate::template::WorkloadTarget;
    use convoy_common::crd::{FleetAgentSpec, GlobalConfig};

    fn spec_with_site() -> FleetAgentSpec {
        FleetAgentSpec {
            global: GlobalConfig {
                site: Some("datadoghq.eu".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn requires_core_agent_and_cluster_agent() {
        let configured = configure(&EnableDefaultFeature, &agent(FleetAgentSpec::default()));
        assert_eq!(configured.required.node_agent.containers, vec![ContainerName::CoreAgent]);
        assert_eq!(configured.required.cluster_agent.requirement, Requirement::Required);
        assert!(!configured.required.cluster_checks_runner.is_configured());
    }

    #[test]
    fn otel_sidecar_option_adds_container() {
        let options = FeatureOptions {
            otel_agent_enabled: true,
            ..Default::default()
        };
        let configured = configure_with(
            &EnableDefaultFeature,
            &agent(FleetAgentSpec::default()),
            &options,
            &StaticPlatformInfo::default(),
        );
        assert_eq!(
            configured.required.node_agent.containers,
            vec![ContainerName::CoreAgent, ContainerName::OtelAgent]
        );
    }

    #[test]
    fn only_configured_globals_are_set() {
        let configured = configure(&EnableDefaultFeature, &agent(spec_with_site()));
        let set = apply(&configured);

        for target in [WorkloadTarget::NodeAgent, WorkloadTarget::ClusterAgent] {
            let container = target.default_container();
            assert_eq!(
                env_value(&set, target, container, DD_SITE).as_deref(),
                Some("datadoghq.eu")
            );
            assert_eq!(env_value(&set, target, container, DD_CLUSTER_NAME), None);
        }
        assert_eq!(
            env_value(
                &set,
                WorkloadTarget::NodeAgent,
                ContainerName::CoreAgent,
                DD_PROCESS_RUN_IN_CORE_AGENT
            )
            .as_deref(),
            Some("true")
        );
        assert_eq!(envs(&set, WorkloadTarget::ClusterAgent, ContainerName::ClusterAgent).len(), 1);
    }

    #[test]
    fn service_accounts_follow_required_targets() {
        let configured = configure(&EnableDefaultFeature, &agent(FleetAgentSpec::default()));
        let mut required = configured.required.clone();
        required.cluster_checks_runner = RequiredComponent::required();

        let mut deps = Dependencies::new();
        configured
            .plan
            .manage_dependencies(&mut deps, &required)
            .expect("dependencies");

        let key = |name: &str| ObjectKey {
            kind: DependencyKind::ServiceAccount,
            namespace: "monitoring".into(),
            name: name.into(),
        };
        assert!(deps.get(&key("datadog-cluster-agent")).is_some());
        assert!(deps.get(&key("datadog-cluster-checks-runner")).is_some());
        assert_eq!(deps.access_rules().bindings().count(), 1);
    }
}
