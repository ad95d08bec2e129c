//! Feature composition engine for convoy agent workloads
//!
//! Turns one `FleetAgent` desired-state document into the pod templates of
//! every managed workload plus the supporting objects they depend on.
//! Each feature is configured in isolation, their requirements are folded
//! together, and only then do the features mutate the templates through the
//! conflict-aware merge managers.
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = FeatureRegistry::builtin()?;
//! let platform = StaticPlatformInfo::new(["VerticalPodAutoscaler"]);
//! let composition = Composer::new(&registry, FeatureOptions::from_env(), &platform)
//!     .compose(&desired, &store)
//!     .await?;
//! for target in composition.templates.targets() {
//!     // hand each pod template to the workload reconciler
//! }
//! ```

#![deny(missing_docs)]

pub mod compose;
pub mod config;
pub mod error;
pub mod feature;
pub mod features;
pub mod hash;
pub mod merger;
pub mod platform;
pub mod required;
pub mod store;
pub mod template;

pub use compose::{ActiveFeature, Composer, Composition, ConfiguredFeatures};
pub use config::{EnvSource, FeatureOptions, OsEnv};
pub use error::{FeatureError, MergeError, Result};
pub use feature::{
    ConfigureContext, Configured, Feature, FeatureConstructor, FeatureId, FeaturePlan,
    FeatureRegistry, NoopPlan,
};
pub use hash::config_hash;
pub use merger::MergeStrategy;
pub use platform::{PlatformInfo, StaticPlatformInfo};
pub use required::{RequiredComponent, RequiredComponents, Requirement};
pub use store::{
    Dependencies, DependencyKind, DependencyObject, DependencyStore, InMemoryStore, ObjectKey,
};
pub use template::{
    ContainerName, TemplateManagers, WorkloadTarget, WorkloadTemplate, WorkloadTemplateSet,
};
