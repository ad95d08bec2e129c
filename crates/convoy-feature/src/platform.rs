//! Read-only view of what the target cluster supports

use std::collections::BTreeSet;

/// Capability probe consulted while features decide what to do
#[cfg_attr(test, mockall::automock)]
pub trait PlatformInfo: Send + Sync {
    /// Whether the cluster serves the given resource kind (e.g. `VerticalPodAutoscaler`)
    fn is_resource_supported(&self, kind: &str) -> bool;
}

/// A fixed set of supported kinds, typically filled from API discovery
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticPlatformInfo {
    kinds: BTreeSet<String>,
}

impl StaticPlatformInfo {
    /// Probe reporting exactly the given kinds
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }
}

impl PlatformInfo for StaticPlatformInfo {
    fn is_resource_supported(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_probe_reports_listed_kinds() {
        let probe = StaticPlatformInfo::new(["VerticalPodAutoscaler"]);
        assert!(probe.is_resource_supported("VerticalPodAutoscaler"));
        assert!(!probe.is_resource_supported("PodDisruptionBudget"));
        assert!(!StaticPlatformInfo::default().is_resource_supported("VerticalPodAutoscaler"));
    }
}
