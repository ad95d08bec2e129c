//! kube-state-metrics core check, run by the cluster agent or the runners

use convoy_common::checksum_annotation_key;
use convoy_common::crd::{is_enabled, CustomConfig, FleetAgent};
use tracing::debug;

use super::{config_map, config_map_volume, env_var, CONFD_PATH};
use crate::error::Result;
use crate::feature::{ConfigureContext, Configured, Feature, FeatureId, FeaturePlan};
use crate::hash::config_hash;
use crate::merger::{AccessRule, MergeStrategy};
use crate::required::{RequiredComponent, RequiredComponents, Requirement};
use crate::store::{Dependencies, DependencyObject};
use crate::template::{ContainerName, TemplateManagers};

const VOLUME_NAME: &str = "ksm-core-config";
const CHECK_FOLDER: &str = "kubernetes_state_core.d";
const CHECK_FILE: &str = "kubernetes_state_core.yaml.default";
const VPA_KIND: &str = "VerticalPodAutoscaler";

const DD_KSM_CORE_ENABLED: &str = "DD_KUBE_STATE_METRICS_CORE_ENABLED";
const DD_KSM_CORE_CONFIGMAP: &str = "DD_KUBE_STATE_METRICS_CORE_CONFIGMAP_NAME";
const DD_IGNORE_AUTOCONF: &str = "DD_IGNORE_AUTOCONF";
const KSM_AUTOCONF: &str = "kubernetes_state";

const CORE_COLLECTORS: [&str; 13] = [
    "configmaps",
    "endpoints",
    "events",
    "limitranges",
    "namespaces",
    "nodes",
    "persistentvolumeclaims",
    "persistentvolumes",
    "pods",
    "replicationcontrollers",
    "resourcequotas",
    "secrets",
    "services",
];

/// Collectors outside the core API group, as (group, resource)
const GROUP_COLLECTORS: [(&str, &str); 8] = [
    ("apps", "daemonsets"),
    ("apps", "deployments"),
    ("apps", "replicasets"),
    ("apps", "statefulsets"),
    ("batch", "cronjobs"),
    ("batch", "jobs"),
    ("autoscaling", "horizontalpodautoscalers"),
    ("policy", "poddisruptionbudgets"),
];

/// kube-state-metrics core check
pub struct KubeStateCoreFeature;

struct Plan {
    namespace: String,
    config_map_name: String,
    rbac_name: String,
    service_account: String,
    custom: Option<CustomConfig>,
    config_hash: Option<String>,
    in_runner: bool,
    vpa: bool,
}

impl Feature for KubeStateCoreFeature {
    fn id(&self) -> FeatureId {
        FeatureId::KubernetesStateCore
    }

    fn configure(&self, desired: &FleetAgent, ctx: &ConfigureContext<'_>) -> Configured {
        let features = &desired.spec.features;
        let Some(cfg) = features
            .kube_state_metrics_core
            .as_ref()
            .filter(|c| is_enabled(c.enabled))
        else {
            return Configured::inactive();
        };

        let in_runner = features
            .cluster_checks
            .as_ref()
            .is_some_and(|cc| is_enabled(cc.enabled) && is_enabled(cc.use_cluster_checks_runners));
        let owner = desired.owner_name();

        let custom = cfg.conf.clone().filter(|c| !c.is_empty());
        let config_map_name = custom
            .as_ref()
            .and_then(|c| c.config_map.as_ref())
            .map(|cm| cm.name.clone())
            .unwrap_or_else(|| format!("{owner}-kube-state-metrics-core-config"));
        let (rbac_name, service_account) = if in_runner {
            (format!("{owner}-ksm-core-ccr"), desired.cluster_checks_runner_service_account())
        } else {
            (format!("{owner}-ksm-core"), desired.cluster_agent_service_account())
        };
        let vpa = ctx.platform.is_resource_supported(VPA_KIND);
        let config_hash = config_hash(self.id().as_str(), custom.as_ref());
        debug!(
            feature = %self.id(),
            in_runner,
            vpa,
            hash = ?config_hash,
            "kube-state-metrics core configured"
        );

        let mut required = RequiredComponents {
            node_agent: RequiredComponent::with_containers(
                Requirement::Required,
                [ContainerName::CoreAgent],
            ),
            cluster_agent: RequiredComponent::with_containers(
                Requirement::Required,
                [ContainerName::ClusterAgent],
            ),
            ..Default::default()
        };
        if in_runner {
            required.cluster_checks_runner = RequiredComponent::required();
        }

        Configured {
            required,
            plan: Box::new(Plan {
                namespace: desired.owner_namespace(),
                config_map_name,
                rbac_name,
                service_account,
                custom,
                config_hash,
                in_runner,
                vpa,
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

    fn check_config(&self) -> String {
        if let Some(data) = self.custom.as_ref().and_then(|c| c.config_data.clone()) {
            return data;
        }
        let mut collectors: Vec<&str> = CORE_COLLECTORS.to_vec();
        collectors.extend(GROUP_COLLECTORS.iter().map(|(_, resource)| *resource));
        if self.vpa {
            collectors.push("verticalpodautoscalers");
        }

        let mut out = format!(
            "cluster_check: {}\ninit_config:\ninstances:\n  - collectors:\n",
            self.in_runner
        );
        for collector in collectors {
            out.push_str("      - ");
            out.push_str(collector);
            out.push('\n');
        }
        out.push_str(&format!("    skip_leader_election: {}\n", self.in_runner));
        out
    }

    fn access_rules(&self) -> Vec<AccessRule> {
        let list_watch = ["list", "watch"];
        let mut rules = vec![AccessRule::new("", CORE_COLLECTORS, list_watch)];
        rules.extend(
            GROUP_COLLECTORS
                .iter()
                .map(|(group, resource)| AccessRule::new(*group, [*resource], list_watch)),
        );
        if self.vpa {
            rules.push(AccessRule::new(
                "autoscaling.k8s.io",
                ["verticalpodautoscalers"],
                list_watch,
            ));
        }
        rules
    }
}

impl FeaturePlan for Plan {
    fn manage_dependencies(&self, deps: &mut Dependencies, _: &RequiredComponents) -> Result<()> {
        if !self.user_config_map() {
            let checksum = self.config_hash.clone().map(|hash| {
                (checksum_annotation_key(FeatureId::KubernetesStateCore.as_str()), hash)
            });
            deps.add_or_update(DependencyObject::ConfigMap(config_map(
                &self.config_map_name,
                &self.namespace,
                CHECK_FILE,
                &self.check_config(),
                checksum,
            )));
        }
        deps.access_rules_mut().add_cluster_policy_rules(
            &self.namespace,
            &self.rbac_name,
            &self.service_account,
            self.access_rules(),
        );
        Ok(())
    }

    fn manage_cluster_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        let reference = self.custom.as_ref().and_then(|c| c.config_map.as_ref());
        let (volume, mount) = config_map_volume(
            VOLUME_NAME,
            reference.filter(|_| self.user_config_map()),
            &self.config_map_name,
            &format!("{CONFD_PATH}/{CHECK_FOLDER}"),
        );
        managers
            .volume()
            .add_to_container(volume, mount, ContainerName::ClusterAgent)?;

        if let Some(hash) = &self.config_hash {
            managers
                .annotation()
                .add_config_hash(FeatureId::KubernetesStateCore.as_str(), hash.clone());
        }

        let mut env = managers.env_var();
        env.add(env_var(DD_KSM_CORE_ENABLED, "true"))?;
        env.add(env_var(DD_KSM_CORE_CONFIGMAP, self.config_map_name.clone()))?;
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut TemplateManagers<'_>) -> Result<()> {
        managers.env_var().add_to_container_with_strategy(
            ContainerName::CoreAgent,
            env_var(DD_IGNORE_AUTOCONF, KSM_AUTOCONF),
            MergeStrategy::Append,
        )?;
        Ok(())
    }
}
