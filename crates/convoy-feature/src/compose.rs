//! One composition pass over a desired-state document
//!
//! validate → configure every feature → aggregate requirements → build baseline
//! templates → stage and commit dependencies → apply template mutations.
//! Everything here is built fresh per pass; only the registry is shared.

use convoy_common::crd::{FleetAgent, FleetAgentStatus};
use tracing::{debug, info, instrument};

use crate::config::FeatureOptions;
use crate::error::Result;
use crate::feature::{ConfigureContext, FeatureId, FeaturePlan, FeatureRegistry};
use crate::platform::PlatformInfo;
use crate::required::RequiredComponents;
use crate::store::{Dependencies, DependencyStore};
use crate::template::{WorkloadTarget, WorkloadTemplateSet};

/// Runs composition passes against a fixed registry
pub struct Composer<'a> {
    registry: &'a FeatureRegistry,
    options: FeatureOptions,
    platform: &'a dyn PlatformInfo,
}

/// A feature that survived the decision phase
pub struct ActiveFeature {
    /// Feature id
    pub id: FeatureId,
    /// What the feature declared
    pub required: RequiredComponents,
    plan: Box<dyn FeaturePlan>,
}

/// Output of the decision phase for every active feature
pub struct ConfiguredFeatures {
    features: Vec<ActiveFeature>,
    required: RequiredComponents,
}

/// Result of a full pass
#[derive(Debug)]
pub struct Composition {
    /// Active features, in execution order
    pub active_features: Vec<FeatureId>,
    /// Aggregated requirements
    pub required: RequiredComponents,
    /// Mutated workload templates
    pub templates: WorkloadTemplateSet,
    /// Dependencies that were committed
    pub dependencies: Dependencies,
}

impl<'a> Composer<'a> {
    /// Composer over `registry`
    pub fn new(
        registry: &'a FeatureRegistry,
        options: FeatureOptions,
        platform: &'a dyn PlatformInfo,
    ) -> Self {
        Self {
            registry,
            options,
            platform,
        }
    }

    /// Decision phase: build and configure every feature in id order.
    ///
    /// Features that configure no target are dropped.
    pub fn configure(&self, desired: &FleetAgent) -> ConfiguredFeatures {
        let ctx = ConfigureContext {
            options: &self.options,
            platform: self.platform,
        };

        let mut features = Vec::new();
        for feature in self.registry.build_all(&self.options) {
            let id = feature.id();
            let configured = feature.configure(desired, &ctx);
            if !configured.required.is_configured() {
                debug!(feature = %id, "feature inactive");
                continue;
            }
            debug!(
                feature = %id,
                targets = ?configured.required.configured_targets(),
                "feature configured"
            );
            features.push(ActiveFeature {
                id,
                required: configured.required,
                plan: configured.plan,
            });
        }

        let required = RequiredComponents::aggregate(features.iter().map(|f| &f.required));
        ConfiguredFeatures { features, required }
    }

    /// Run a whole pass and commit dependencies to `store`
    #[instrument(
        skip(self, desired, store),
        fields(agent = %desired.owner_name(), namespace = %desired.owner_namespace())
    )]
    pub async fn compose(
        &self,
        desired: &FleetAgent,
        store: &dyn DependencyStore,
    ) -> Result<Composition> {
        desired.validate()?;
        let configured = self.configure(desired);
        let mut templates = WorkloadTemplateSet::from_required(configured.required());

        let mut dependencies = Dependencies::new();
        configured.manage_dependencies(&mut dependencies)?;
        dependencies.commit(store).await?;

        configured.apply(&mut templates)?;

        info!(
            features = configured.features.len(),
            targets = ?templates.targets(),
            "composition complete"
        );
        Ok(Composition {
            active_features: configured.ids(),
            required: configured.required,
            templates,
            dependencies,
        })
    }
}

impl ConfiguredFeatures {
    /// Ids of the active features, in execution order
    pub fn ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|f| f.id).collect()
    }

    /// Active features, in execution order
    pub fn features(&self) -> &[ActiveFeature] {
        &self.features
    }

    /// Requirements aggregated over all active features
    pub fn required(&self) -> &RequiredComponents {
        &self.required
    }

    /// Stage every feature's dependencies
    pub fn manage_dependencies(&self, deps: &mut Dependencies) -> Result<()> {
        for feature in &self.features {
            feature
                .plan
                .manage_dependencies(deps, &self.required)
                .map_err(|e| e.in_feature(feature.id.as_str()))?;
        }
        Ok(())
    }

    /// Apply template mutations.
    ///
    /// A feature only sees targets it configured itself, and only when the
    /// template exists.
    pub fn apply(&self, templates: &mut WorkloadTemplateSet) -> Result<()> {
        for feature in &self.features {
            for target in feature.required.configured_targets() {
                let Some(template) = templates.get_mut(target) else {
                    debug!(feature = %feature.id, target = %target, "target not present, skipping");
                    continue;
                };
                let mut managers = template.managers();
                let result = match target {
                    WorkloadTarget::NodeAgent => feature.plan.manage_node_agent(&mut managers),
                    WorkloadTarget::ClusterAgent => {
                        feature.plan.manage_cluster_agent(&mut managers)
                    }
                    WorkloadTarget::ClusterChecksRunner => {
                        feature.plan.manage_cluster_checks_runner(&mut managers)
                    }
                    WorkloadTarget::OtelAgentGateway => {
                        feature.plan.manage_otel_agent_gateway(&mut managers)
                    }
                };
                result.map_err(|e| e.in_feature(feature.id.as_str()))?;
            }
        }
        Ok(())
    }
}

impl Composition {
    /// Status to report on the FleetAgent after this pass
    pub fn status(&self, observed_generation: Option<i64>) -> FleetAgentStatus {
        FleetAgentStatus {
            observed_generation,
            active_features: self
                .active_features
                .iter()
                .map(|id| id.as_str().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeatureError, MergeError};
    use crate::feature::{Configured, Feature};
    use crate::platform::StaticPlatformInfo;
    use crate::required::RequiredComponent;
    use crate::store::InMemoryStore;
    use crate::template::ContainerName;
    use convoy_common::crd::FleetAgentSpec;
    use k8s_openapi::api::core::v1::EnvVar;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    struct SetsEnv {
        id: FeatureId,
        value: &'static str,
    }

    struct SetsEnvPlan {
        value: &'static str,
    }

    impl FeaturePlan for SetsEnvPlan {
        fn manage_node_agent(&self, managers: &mut crate::TemplateManagers<'_>) -> Result<()> {
            managers.env_var().add(env("DD_SHARED", self.value))?;
            Ok(())
        }

        fn manage_cluster_agent(&self, _: &mut crate::TemplateManagers<'_>) -> Result<()> {
            panic!("cluster agent was not configured by this feature");
        }
    }

    impl Feature for SetsEnv {
        fn id(&self) -> FeatureId {
            self.id
        }

        fn configure(&self, _: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
            let mut required = RequiredComponents::default();
            required.node_agent = RequiredComponent::with_containers(
                crate::Requirement::Required,
                [ContainerName::CoreAgent],
            );
            Configured {
                required,
                plan: Box::new(SetsEnvPlan { value: self.value }),
            }
        }
    }

    struct ClusterOnly;

    impl Feature for ClusterOnly {
        fn id(&self) -> FeatureId {
            FeatureId::ClusterChecks
        }

        fn configure(&self, _: &FleetAgent, _: &ConfigureContext<'_>) -> Configured {
            let mut required = RequiredComponents::default();
            required.cluster_agent = RequiredComponent::required();
            Configured {
                required,
                plan: Box::new(crate::feature::NoopPlan),
            }
        }
    }

    fn agent() -> FleetAgent {
        let mut agent = FleetAgent::new("datadog", FleetAgentSpec::default());
        agent.metadata.namespace = Some("monitoring".to_string());
        agent
    }

    fn registry(entries: &[(FeatureId, crate::feature::FeatureConstructor)]) -> FeatureRegistry {
        let mut registry = FeatureRegistry::new();
        for (id, ctor) in entries {
            registry.register(*id, *ctor).expect("register");
        }
        registry
    }

    fn npm_one(_: &FeatureOptions) -> Box<dyn Feature> {
        Box::new(SetsEnv { id: FeatureId::Npm, value: "one" })
    }

    fn logs_two(_: &FeatureOptions) -> Box<dyn Feature> {
        Box::new(SetsEnv { id: FeatureId::LogCollection, value: "two" })
    }

    fn logs_one(_: &FeatureOptions) -> Box<dyn Feature> {
        Box::new(SetsEnv { id: FeatureId::LogCollection, value: "one" })
    }

    fn cluster_only(_: &FeatureOptions) -> Box<dyn Feature> {
        Box::new(ClusterOnly)
    }

    #[tokio::test]
    async fn manage_only_runs_for_configured_targets() {
        let registry = registry(&[
            (FeatureId::Npm, npm_one),
            (FeatureId::ClusterChecks, cluster_only),
        ]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);

        let composition = composer
            .compose(&agent(), &InMemoryStore::new())
            .await
            .expect("compose");
        assert_eq!(composition.active_features, vec![FeatureId::ClusterChecks, FeatureId::Npm]);
        assert_eq!(
            composition.templates.targets(),
            vec![WorkloadTarget::NodeAgent, WorkloadTarget::ClusterAgent]
        );
    }

    #[tokio::test]
    async fn conflicting_features_fail_with_attribution() {
        let registry = registry(&[(FeatureId::Npm, npm_one), (FeatureId::LogCollection, logs_two)]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);

        let err = composer
            .compose(&agent(), &InMemoryStore::new())
            .await
            .expect_err("conflict");
        match err {
            FeatureError::Merge { feature, source: MergeError::EnvVar { name, .. } } => {
                assert_eq!(feature, "npm");
                assert_eq!(name, "DD_SHARED");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn agreeing_features_share_one_entry() {
        let registry = registry(&[(FeatureId::Npm, npm_one), (FeatureId::LogCollection, logs_one)]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);

        let composition = composer
            .compose(&agent(), &InMemoryStore::new())
            .await
            .expect("compose");
        let node = composition
            .templates
            .get(WorkloadTarget::NodeAgent)
            .expect("node agent");
        let envs = node
            .container(ContainerName::CoreAgent)
            .and_then(|c| c.env.clone())
            .unwrap_or_default();
        assert_eq!(envs, vec![env("DD_SHARED", "one")]);
    }

    #[tokio::test]
    async fn invalid_document_fails_before_any_store_write() {
        let registry = registry(&[(FeatureId::Npm, npm_one)]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);
        let mut desired = agent();
        desired.spec = serde_json::from_value(serde_json::json!({
            "features": {
                "otelAgentGateway": { "enabled": true, "conf": { "configMap": { "name": " " } } }
            }
        }))
        .expect("spec");
        let store = InMemoryStore::new();

        let err = composer.compose(&desired, &store).await.expect_err("invalid");
        assert!(matches!(err, FeatureError::Common(_)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn inline_data_never_overwrites_a_referenced_config_map() {
        let registry = registry(&[(FeatureId::Npm, npm_one)]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);
        let mut desired = agent();
        desired.spec = serde_json::from_value(serde_json::json!({
            "features": {
                "kubeStateMetricsCore": {
                    "enabled": true,
                    "conf": {
                        "configData": "init_config: {}",
                        "configMap": { "name": "ops-owned" }
                    }
                }
            }
        }))
        .expect("spec");
        let store = InMemoryStore::new();

        let err = composer.compose(&desired, &store).await.expect_err("invalid");
        assert!(matches!(err, FeatureError::Common(_)));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn status_lists_active_features() {
        let registry = registry(&[(FeatureId::Npm, npm_one)]);
        let platform = StaticPlatformInfo::default();
        let composer = Composer::new(&registry, FeatureOptions::default(), &platform);
        let composition = composer
            .compose(&agent(), &InMemoryStore::new())
            .await
            .expect("compose");

        let status = composition.status(Some(3));
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.active_features, vec!["npm".to_string()]);
    }
}
