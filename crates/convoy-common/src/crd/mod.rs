//! Custom Resource Definitions for convoy
//!
//! The `FleetAgent` CRD is the desired-state document read by every feature
//! during the decision phase.

mod agent;
mod features;

pub use agent::{FleetAgent, FleetAgentSpec, FleetAgentStatus, GlobalConfig};
pub use features::{
    ClusterChecksFeatureConfig, ConfigMapConfig, ConfigMapItem, CustomConfig, FeaturesSpec,
    KubeStateMetricsCoreFeatureConfig, LogCollectionFeatureConfig, NpmFeatureConfig,
    OtelAgentGatewayFeatureConfig,
};

/// Read an optional boolean toggle, treating an unset value as `false`.
pub fn is_enabled(flag: Option<bool>) -> bool {
    flag.unwrap_or(false)
}
