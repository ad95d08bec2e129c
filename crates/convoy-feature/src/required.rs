//! Required components: which targets and containers must exist
//!
//! Each feature declares, per workload target, a tri-state requirement and
//! the containers it needs. The aggregator folds every declaration into one
//! answer per target.
//!
//! Merge rule for the requirement:
//!
//! | current       | incoming      | result        |
//! |---------------|---------------|---------------|
//! | Unset         | x             | x             |
//! | NotRequired   | Required      | Required      |
//! | NotRequired   | Unset/NotReq. | NotRequired   |
//! | Required      | anything      | Required      |
//!
//! `NotRequired` records that a feature looked at the target and does not
//! need it. It never vetoes another feature's `Required`.

use serde::{Deserialize, Serialize};

use crate::template::{ContainerName, WorkloadTarget};

/// Tri-state requirement of a workload target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requirement {
    /// The feature says nothing about the target
    #[default]
    Unset,
    /// The feature needs the target
    Required,
    /// The feature explicitly does not need the target
    NotRequired,
}

impl Requirement {
    /// Build from a boolean decision
    pub fn from_bool(required: bool) -> Self {
        if required {
            Self::Required
        } else {
            Self::NotRequired
        }
    }

    /// Merge two requirements; `Required` wins, `Unset` yields to anything
    pub fn merge(self, other: Requirement) -> Requirement {
        match (self, other) {
            (Self::Required, _) | (_, Self::Required) => Self::Required,
            (Self::NotRequired, _) | (_, Self::NotRequired) => Self::NotRequired,
            (Self::Unset, Self::Unset) => Self::Unset,
        }
    }
}

/// Requirement and container set for one target
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredComponent {
    /// Whether the target is needed
    pub requirement: Requirement,
    /// Containers needed on the target, first-seen order, no duplicates
    pub containers: Vec<ContainerName>,
}

impl RequiredComponent {
    /// Required target, no specific containers
    pub fn required() -> Self {
        Self {
            requirement: Requirement::Required,
            containers: Vec::new(),
        }
    }

    /// Explicitly not required target
    pub fn not_required() -> Self {
        Self {
            requirement: Requirement::NotRequired,
            containers: Vec::new(),
        }
    }

    /// Target with a requirement and a container list (duplicates dropped)
    pub fn with_containers(
        requirement: Requirement,
        containers: impl IntoIterator<Item = ContainerName>,
    ) -> Self {
        let mut component = Self {
            requirement,
            containers: Vec::new(),
        };
        component.add_containers(containers);
        component
    }

    /// The target must exist
    pub fn is_enabled(&self) -> bool {
        self.requirement == Requirement::Required || !self.containers.is_empty()
    }

    /// The feature has an opinion about the target, even if it is "not needed"
    pub fn is_configured(&self) -> bool {
        self.requirement != Requirement::Unset || !self.containers.is_empty()
    }

    /// Whether any needed container runs privileged
    pub fn is_privileged(&self) -> bool {
        self.containers.iter().any(ContainerName::is_privileged)
    }

    /// Merge another declaration into this one
    pub fn merge(&mut self, other: &RequiredComponent) -> &mut Self {
        self.requirement = self.requirement.merge(other.requirement);
        self.add_containers(other.containers.iter().copied());
        self
    }

    fn add_containers(&mut self, containers: impl IntoIterator<Item = ContainerName>) {
        for container in containers {
            if !self.containers.contains(&container) {
                self.containers.push(container);
            }
        }
    }
}

/// One `RequiredComponent` per workload target
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredComponents {
    /// Node-level daemon
    pub node_agent: RequiredComponent,
    /// Cluster-level singleton
    pub cluster_agent: RequiredComponent,
    /// Cluster checks runner
    pub cluster_checks_runner: RequiredComponent,
    /// Telemetry gateway
    pub otel_agent_gateway: RequiredComponent,
}

impl RequiredComponents {
    /// Fold many declarations into one, in iteration order.
    ///
    /// The caller passes declarations in registry order so container lists
    /// come out the same on every pass.
    pub fn aggregate<'a>(all: impl IntoIterator<Item = &'a RequiredComponents>) -> Self {
        let mut out = Self::default();
        for rc in all {
            out.merge(rc);
        }
        out
    }

    /// Merge another declaration into this one, target by target
    pub fn merge(&mut self, other: &RequiredComponents) -> &mut Self {
        for target in WorkloadTarget::ALL {
            self.get_mut(target).merge(other.get(target));
        }
        self
    }

    /// Component for a target
    pub fn get(&self, target: WorkloadTarget) -> &RequiredComponent {
        match target {
            WorkloadTarget::NodeAgent => &self.node_agent,
            WorkloadTarget::ClusterAgent => &self.cluster_agent,
            WorkloadTarget::ClusterChecksRunner => &self.cluster_checks_runner,
            WorkloadTarget::OtelAgentGateway => &self.otel_agent_gateway,
        }
    }

    /// Mutable component for a target
    pub fn get_mut(&mut self, target: WorkloadTarget) -> &mut RequiredComponent {
        match target {
            WorkloadTarget::NodeAgent => &mut self.node_agent,
            WorkloadTarget::ClusterAgent => &mut self.cluster_agent,
            WorkloadTarget::ClusterChecksRunner => &mut self.cluster_checks_runner,
            WorkloadTarget::OtelAgentGateway => &mut self.otel_agent_gateway,
        }
    }

    /// Any target must exist
    pub fn is_enabled(&self) -> bool {
        WorkloadTarget::ALL
            .iter()
            .any(|t| self.get(*t).is_enabled())
    }

    /// Any target is configured
    pub fn is_configured(&self) -> bool {
        WorkloadTarget::ALL
            .iter()
            .any(|t| self.get(*t).is_configured())
    }

    /// Targets this declaration configures
    pub fn configured_targets(&self) -> Vec<WorkloadTarget> {
        WorkloadTarget::ALL
            .into_iter()
            .filter(|t| self.get(*t).is_configured())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ContainerName::*;

    #[rstest]
    #[case(Requirement::Unset, Requirement::Unset, Requirement::Unset)]
    #[case(Requirement::Unset, Requirement::Required, Requirement::Required)]
    #[case(Requirement::Unset, Requirement::NotRequired, Requirement::NotRequired)]
    #[case(Requirement::Required, Requirement::Unset, Requirement::Required)]
    #[case(Requirement::Required, Requirement::NotRequired, Requirement::Required)]
    #[case(Requirement::NotRequired, Requirement::Required, Requirement::Required)]
    #[case(Requirement::NotRequired, Requirement::Unset, Requirement::NotRequired)]
    #[case(Requirement::NotRequired, Requirement::NotRequired, Requirement::NotRequired)]
    fn requirement_merge_table(
        #[case] a: Requirement,
        #[case] b: Requirement,
        #[case] want: Requirement,
    ) {
        assert_eq!(a.merge(b), want);
        // Merge is symmetric
        assert_eq!(b.merge(a), want);
    }

    #[test]
    fn required_and_unset_union_containers() {
        let mut f1 = RequiredComponents::default();
        f1.cluster_agent = RequiredComponent::with_containers(
            Requirement::Required,
            [CoreAgent, ProcessAgent],
        );
        let mut f2 = RequiredComponents::default();
        f2.cluster_agent =
            RequiredComponent::with_containers(Requirement::Unset, [ProcessAgent, SystemProbe]);

        let out = RequiredComponents::aggregate([&f1, &f2]);
        assert_eq!(out.cluster_agent.requirement, Requirement::Required);
        assert_eq!(
            out.cluster_agent.containers,
            vec![CoreAgent, ProcessAgent, SystemProbe]
        );
    }

    #[test]
    fn not_required_never_vetoes() {
        let mut runner_on = RequiredComponents::default();
        runner_on.cluster_checks_runner = RequiredComponent::required();
        let mut runner_off = RequiredComponents::default();
        runner_off.cluster_checks_runner = RequiredComponent::not_required();

        let forward = RequiredComponents::aggregate([&runner_on, &runner_off]);
        let backward = RequiredComponents::aggregate([&runner_off, &runner_on]);
        assert!(forward.cluster_checks_runner.is_enabled());
        assert_eq!(forward, backward);
    }

    #[test]
    fn not_required_is_configured_but_not_enabled() {
        let component = RequiredComponent::not_required();
        assert!(component.is_configured());
        assert!(!component.is_enabled());
        assert!(!RequiredComponent::default().is_configured());
    }

    #[test]
    fn containers_alone_enable_a_target() {
        let component = RequiredComponent::with_containers(Requirement::Unset, [TraceAgent]);
        assert!(component.is_enabled());
    }

    #[test]
    fn container_order_follows_first_seen() {
        let mut a = RequiredComponents::default();
        a.node_agent = RequiredComponent::with_containers(Requirement::Required, [SystemProbe]);
        let mut b = RequiredComponents::default();
        b.node_agent =
            RequiredComponent::with_containers(Requirement::Required, [CoreAgent, SystemProbe]);

        let out = RequiredComponents::aggregate([&a, &b]);
        assert_eq!(out.node_agent.containers, vec![SystemProbe, CoreAgent]);
    }

    #[test]
    fn duplicate_containers_dropped_on_construction() {
        let c = RequiredComponent::with_containers(Requirement::Required, [CoreAgent, CoreAgent]);
        assert_eq!(c.containers, vec![CoreAgent]);
        assert!(!c.is_privileged());
    }

    #[test]
    fn configured_targets_lists_only_opinions() {
        let mut rc = RequiredComponents::default();
        rc.node_agent = RequiredComponent::required();
        rc.cluster_checks_runner = RequiredComponent::not_required();
        assert_eq!(
            rc.configured_targets(),
            vec![WorkloadTarget::NodeAgent, WorkloadTarget::ClusterChecksRunner]
        );
        assert!(rc.is_enabled());
        assert!(!RequiredComponents::default().is_configured());
    }
}
