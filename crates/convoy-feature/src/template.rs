//! Workload targets, container names and the mutable template set
//!
//! Each target is a `PodTemplateSpec` wrapped with its target kind. Managers
//! borrow a template mutably for one contribution at a time, so there is
//! exactly one writer per template for the whole pass.

use std::fmt;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::merger::{
    AnnotationManager, EnvVarManager, SecurityCapabilityManager, VolumeManager,
    VolumeMountManager,
};
use crate::required::RequiredComponents;

// =============================================================================
// Targets and containers
// =============================================================================

/// One of the managed workload templates
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadTarget {
    /// Node-level daemon
    NodeAgent,
    /// Cluster-level singleton
    ClusterAgent,
    /// Cluster checks runner
    ClusterChecksRunner,
    /// Telemetry gateway
    OtelAgentGateway,
}

impl WorkloadTarget {
    /// Every target, in a fixed order
    pub const ALL: [WorkloadTarget; 4] = [
        WorkloadTarget::NodeAgent,
        WorkloadTarget::ClusterAgent,
        WorkloadTarget::ClusterChecksRunner,
        WorkloadTarget::OtelAgentGateway,
    ];

    /// Stable name used in logs and object names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeAgent => "node-agent",
            Self::ClusterAgent => "cluster-agent",
            Self::ClusterChecksRunner => "cluster-checks-runner",
            Self::OtelAgentGateway => "otel-agent-gateway",
        }
    }

    /// Container created when the target is required without naming any
    pub fn default_container(&self) -> ContainerName {
        match self {
            Self::NodeAgent => ContainerName::CoreAgent,
            Self::ClusterAgent => ContainerName::ClusterAgent,
            Self::ClusterChecksRunner => ContainerName::ClusterChecksRunner,
            Self::OtelAgentGateway => ContainerName::OtelAgentGateway,
        }
    }
}

impl fmt::Display for WorkloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the containers a template can hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContainerName {
    /// Core agent
    #[serde(rename = "agent")]
    CoreAgent,
    /// APM trace agent
    #[serde(rename = "trace-agent")]
    TraceAgent,
    /// Process agent
    #[serde(rename = "process-agent")]
    ProcessAgent,
    /// Security agent
    #[serde(rename = "security-agent")]
    SecurityAgent,
    /// eBPF system probe
    #[serde(rename = "system-probe")]
    SystemProbe,
    /// OpenTelemetry agent sidecar
    #[serde(rename = "otel-agent")]
    OtelAgent,
    /// Cluster agent
    #[serde(rename = "cluster-agent")]
    ClusterAgent,
    /// Cluster checks runner
    #[serde(rename = "cluster-checks-runner")]
    ClusterChecksRunner,
    /// OpenTelemetry gateway collector
    #[serde(rename = "otel-agent-gateway")]
    OtelAgentGateway,
}

impl ContainerName {
    /// Container name as it appears in the pod spec
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreAgent => "agent",
            Self::TraceAgent => "trace-agent",
            Self::ProcessAgent => "process-agent",
            Self::SecurityAgent => "security-agent",
            Self::SystemProbe => "system-probe",
            Self::OtelAgent => "otel-agent",
            Self::ClusterAgent => "cluster-agent",
            Self::ClusterChecksRunner => "cluster-checks-runner",
            Self::OtelAgentGateway => "otel-agent-gateway",
        }
    }

    /// Whether the container needs elevated privileges
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::SecurityAgent | Self::SystemProbe)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Templates
// =============================================================================

/// A mutable pod template for one workload target
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadTemplate {
    target: WorkloadTarget,
    template: PodTemplateSpec,
}

impl WorkloadTemplate {
    /// Wrap an existing pod template
    pub fn new(target: WorkloadTarget, template: PodTemplateSpec) -> Self {
        Self { target, template }
    }

    /// Build a bare template holding the named containers, in order
    pub fn with_containers(target: WorkloadTarget, containers: &[ContainerName]) -> Self {
        let containers = containers
            .iter()
            .map(|name| Container {
                name: name.as_str().to_string(),
                ..Default::default()
            })
            .collect();

        Self::new(
            target,
            PodTemplateSpec {
                metadata: Some(ObjectMeta::default()),
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
        )
    }

    /// Target this template belongs to
    pub fn target(&self) -> WorkloadTarget {
        self.target
    }

    /// Read access to the pod template
    pub fn pod_template(&self) -> &PodTemplateSpec {
        &self.template
    }

    /// Consume the wrapper and return the pod template
    pub fn into_pod_template(self) -> PodTemplateSpec {
        self.template
    }

    /// Look up a container by name
    pub fn container(&self, name: ContainerName) -> Option<&Container> {
        self.template
            .spec
            .as_ref()?
            .containers
            .iter()
            .find(|c| c.name == name.as_str())
    }

    /// Names of the containers currently present, in pod order
    pub fn container_names(&self) -> Vec<String> {
        self.template
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Managers scoped to this template
    pub fn managers(&mut self) -> TemplateManagers<'_> {
        TemplateManagers {
            template: &mut self.template,
        }
    }
}

/// Entry point to the managers of one template.
///
/// Each accessor hands out a manager borrowing the template for the length of
/// one call chain, e.g. `managers.env_var().add_to_container(..)`.
pub struct TemplateManagers<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> TemplateManagers<'a> {
    /// Direct access to the pod template
    pub fn pod_template(&mut self) -> &mut PodTemplateSpec {
        self.template
    }

    /// Env var manager
    pub fn env_var(&mut self) -> EnvVarManager<'_> {
        EnvVarManager::new(self.template)
    }

    /// Volume manager
    pub fn volume(&mut self) -> VolumeManager<'_> {
        VolumeManager::new(self.template)
    }

    /// Volume mount manager
    pub fn volume_mount(&mut self) -> VolumeMountManager<'_> {
        VolumeMountManager::new(self.template)
    }

    /// Security capability manager
    pub fn security_capability(&mut self) -> SecurityCapabilityManager<'_> {
        SecurityCapabilityManager::new(self.template)
    }

    /// Annotation manager
    pub fn annotation(&mut self) -> AnnotationManager<'_> {
        AnnotationManager::new(self.template)
    }
}

/// The four workload templates of one managed instance.
///
/// A target is `None` when no feature enabled it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadTemplateSet {
    /// Node-level daemon
    pub node_agent: Option<WorkloadTemplate>,
    /// Cluster-level singleton
    pub cluster_agent: Option<WorkloadTemplate>,
    /// Cluster checks runner
    pub cluster_checks_runner: Option<WorkloadTemplate>,
    /// Telemetry gateway
    pub otel_agent_gateway: Option<WorkloadTemplate>,
}

impl WorkloadTemplateSet {
    /// Build the baseline templates for the aggregated requirements.
    ///
    /// Every enabled target gets exactly its aggregated containers; a target
    /// that is required without naming containers gets its default one.
    pub fn from_required(required: &RequiredComponents) -> Self {
        let mut set = Self::default();
        for target in WorkloadTarget::ALL {
            let component = required.get(target);
            if !component.is_enabled() {
                continue;
            }
            let template = if component.containers.is_empty() {
                WorkloadTemplate::with_containers(target, &[target.default_container()])
            } else {
                WorkloadTemplate::with_containers(target, &component.containers)
            };
            *set.slot_mut(target) = Some(template);
        }
        set
    }

    /// Template for a target, if it exists
    pub fn get(&self, target: WorkloadTarget) -> Option<&WorkloadTemplate> {
        match target {
            WorkloadTarget::NodeAgent => self.node_agent.as_ref(),
            WorkloadTarget::ClusterAgent => self.cluster_agent.as_ref(),
            WorkloadTarget::ClusterChecksRunner => self.cluster_checks_runner.as_ref(),
            WorkloadTarget::OtelAgentGateway => self.otel_agent_gateway.as_ref(),
        }
    }

    /// Mutable template for a target, if it exists
    pub fn get_mut(&mut self, target: WorkloadTarget) -> Option<&mut WorkloadTemplate> {
        self.slot_mut(target).as_mut()
    }

    fn slot_mut(&mut self, target: WorkloadTarget) -> &mut Option<WorkloadTemplate> {
        match target {
            WorkloadTarget::NodeAgent => &mut self.node_agent,
            WorkloadTarget::ClusterAgent => &mut self.cluster_agent,
            WorkloadTarget::ClusterChecksRunner => &mut self.cluster_checks_runner,
            WorkloadTarget::OtelAgentGateway => &mut self.otel_agent_gateway,
        }
    }

    /// Targets that currently have a template
    pub fn targets(&self) -> Vec<WorkloadTarget> {
        WorkloadTarget::ALL
            .into_iter()
            .filter(|t| self.get(*t).is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::required::{RequiredComponent, Requirement};

    #[test]
    fn template_holds_containers_in_order() {
        let tmpl = WorkloadTemplate::with_containers(
            WorkloadTarget::NodeAgent,
            &[ContainerName::CoreAgent, ContainerName::SystemProbe],
        );
        assert_eq!(tmpl.container_names(), vec!["agent", "system-probe"]);
        assert!(tmpl.container(ContainerName::SystemProbe).is_some());
        assert!(tmpl.container(ContainerName::TraceAgent).is_none());
    }

    #[test]
    fn from_required_skips_disabled_targets() {
        let mut required = RequiredComponents::default();
        required.node_agent = RequiredComponent::with_containers(
            Requirement::Required,
            [ContainerName::CoreAgent, ContainerName::ProcessAgent],
        );
        required.cluster_agent = RequiredComponent::required();
        required.cluster_checks_runner = RequiredComponent::not_required();

        let set = WorkloadTemplateSet::from_required(&required);
        assert_eq!(
            set.targets(),
            vec![WorkloadTarget::NodeAgent, WorkloadTarget::ClusterAgent]
        );
        assert_eq!(
            set.node_agent.as_ref().map(|t| t.container_names()),
            Some(vec!["agent".to_string(), "process-agent".to_string()])
        );
        // Required with no containers falls back to the default container
        assert_eq!(
            set.cluster_agent.as_ref().map(|t| t.container_names()),
            Some(vec!["cluster-agent".to_string()])
        );
    }

    #[test]
    fn container_names_serialize_as_pod_names() {
        let json = serde_json::to_string(&ContainerName::SystemProbe).expect("serialize");
        assert_eq!(json, "\"system-probe\"");
        assert!(ContainerName::SystemProbe.is_privileged());
        assert!(!ContainerName::CoreAgent.is_privileged());
    }
}
