//! The two-phase feature contract
//!
//! `configure` is a pure decision over the desired state. It returns the
//! components the feature needs and an immutable [`FeaturePlan`] holding every
//! derived parameter. The mutation phase only ever sees that plan, so the
//! two phases can be tested on their own.

mod registry;

pub use registry::{FeatureConstructor, FeatureRegistry};

use std::fmt;

use convoy_common::crd::FleetAgent;

use crate::config::FeatureOptions;
use crate::error::Result;
use crate::platform::PlatformInfo;
use crate::required::RequiredComponents;
use crate::store::Dependencies;
use crate::template::TemplateManagers;

/// Stable identifier of a built-in feature.
///
/// Ordering follows the string form, which is the execution order of a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeatureId {
    /// Baseline settings every instance carries
    EnableDefault,
    /// Cluster checks dispatch
    ClusterChecks,
    /// kube-state-metrics core check
    KubernetesStateCore,
    /// Container and pod log collection
    LogCollection,
    /// Network performance monitoring
    Npm,
    /// OTel collector gateway deployment
    OtelAgentGateway,
}

impl FeatureId {
    /// Every built-in id
    pub const ALL: [FeatureId; 6] = [
        FeatureId::EnableDefault,
        FeatureId::ClusterChecks,
        FeatureId::KubernetesStateCore,
        FeatureId::LogCollection,
        FeatureId::Npm,
        FeatureId::OtelAgentGateway,
    ];

    /// Wire name, also used in checksum annotation keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnableDefault => "enable_default",
            Self::ClusterChecks => "cluster_checks",
            Self::KubernetesStateCore => "kubernetes_state_core",
            Self::LogCollection => "logcollection",
            Self::Npm => "npm",
            Self::OtelAgentGateway => "otel_agent_gateway",
        }
    }
}

impl PartialOrd for FeatureId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeatureId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs available to `configure` besides the desired state
pub struct ConfigureContext<'a> {
    /// Engine-wide options
    pub options: &'a FeatureOptions,
    /// Cluster capability probe
    pub platform: &'a dyn PlatformInfo,
}

/// Outcome of the decision phase
pub struct Configured {
    /// Components the feature needs; unset everywhere when it is inactive
    pub required: RequiredComponents,
    /// Parameters for the mutation phase
    pub plan: Box<dyn FeaturePlan>,
}

impl Configured {
    /// Result for a feature whose trigger is absent or disabled
    pub fn inactive() -> Self {
        Self {
            required: RequiredComponents::default(),
            plan: Box::new(NoopPlan),
        }
    }
}

/// A capability module that conditionally contributes to workload templates
pub trait Feature: Send + Sync {
    /// Stable id
    fn id(&self) -> FeatureId;

    /// Decide what the feature needs. Never fails: malformed optional input
    /// degrades to defaults and is logged.
    fn configure(&self, desired: &FleetAgent, ctx: &ConfigureContext<'_>) -> Configured;
}

/// Mutation phase of one configured feature.
///
/// Every method defaults to a no-op. The composition pass only calls a
/// `manage_*` method for targets the feature configured and that exist.
pub trait FeaturePlan: Send + Sync {
    /// Stage auxiliary objects and access rules
    fn manage_dependencies(
        &self,
        _deps: &mut Dependencies,
        _required: &RequiredComponents,
    ) -> Result<()> {
        Ok(())
    }

    /// Mutate the node agent template
    fn manage_node_agent(&self, _managers: &mut TemplateManagers<'_>) -> Result<()> {
        Ok(())
    }

    /// Mutate the cluster agent template
    fn manage_cluster_agent(&self, _managers: &mut TemplateManagers<'_>) -> Result<()> {
        Ok(())
    }

    /// Mutate the cluster checks runner template
    fn manage_cluster_checks_runner(&self, _managers: &mut TemplateManagers<'_>) -> Result<()> {
        Ok(())
    }

    /// Mutate the gateway template
    fn manage_otel_agent_gateway(&self, _managers: &mut TemplateManagers<'_>) -> Result<()> {
        Ok(())
    }
}

/// Plan of an inactive feature
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPlan;

impl FeaturePlan for NoopPlan {}
