//! Error types for the feature composition engine
//!
//! Decision-phase problems never surface here: `configure` degrades and logs.
//! Everything below is raised by input validation, the mutation phase or the
//! dependency phase, and is returned to the caller as a failed pass.

use thiserror::Error;

/// A contribution that collides with an existing, incompatible one.
///
/// Two features disagreeing about the same named item is a contract
/// violation between them, so it is reported instead of silently resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    /// Same env var name with a different value in one container
    #[error("env var {name} in container {container}: existing value {existing:?} conflicts with {incoming:?}")]
    EnvVar {
        /// Container holding the env var
        container: String,
        /// Env var name
        name: String,
        /// Value already present
        existing: String,
        /// Value that was rejected
        incoming: String,
    },

    /// Same volume name with a different source in one template
    #[error("volume {name}: source {existing} conflicts with {incoming}")]
    Volume {
        /// Volume name
        name: String,
        /// Summary of the existing source
        existing: String,
        /// Summary of the rejected source
        incoming: String,
    },

    /// Same mount path with a different volume or mode in one container
    #[error("volume mount {mount_path} in container {container}: {message}")]
    VolumeMount {
        /// Container holding the mount
        container: String,
        /// Mount path inside the container
        mount_path: String,
        /// What differs
        message: String,
    },

    /// Attempt to write a checksum annotation through the plain annotation path
    #[error("annotation {key} is reserved for config checksums")]
    ReservedAnnotation {
        /// Annotation key
        key: String,
    },
}

/// Errors raised by the composition engine
#[derive(Debug, Error)]
pub enum FeatureError {
    /// A feature id was registered twice
    #[error("feature {id} is already registered")]
    DuplicateFeature {
        /// The duplicated feature id
        id: String,
    },

    /// Two contributions could not be merged
    #[error("merge conflict in feature {feature}: {source}")]
    Merge {
        /// Feature that made the rejected contribution
        feature: String,
        /// Underlying conflict
        #[source]
        source: MergeError,
    },

    /// A dependency store write failed
    #[error("dependency store error for {kind} {name}: {message}")]
    Store {
        /// Object kind
        kind: String,
        /// Object name (namespace-qualified when namespaced)
        name: String,
        /// Description of what failed
        message: String,
    },

    /// The desired-state document failed validation
    #[error(transparent)]
    Common(#[from] convoy_common::Error),
}

impl FeatureError {
    /// Attribute a merge conflict to a feature
    pub fn merge(feature: impl Into<String>, source: MergeError) -> Self {
        Self::Merge {
            feature: feature.into(),
            source,
        }
    }

    /// Create a store error
    pub fn store(kind: impl Into<String>, name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Whether retrying the pass could succeed.
    ///
    /// Store errors are transient by nature; merge conflicts and duplicate
    /// registrations are programming errors and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Attribute an unattributed merge conflict to `feature`
    pub fn in_feature(self, feature: &str) -> Self {
        match self {
            Self::Merge { feature: f, source } if f == convoy_common::error::UNKNOWN_CONTEXT => {
                Self::merge(feature, source)
            }
            other => other,
        }
    }
}

impl From<MergeError> for FeatureError {
    fn from(source: MergeError) -> Self {
        Self::Merge {
            feature: convoy_common::error::UNKNOWN_CONTEXT.to_string(),
            source,
        }
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, FeatureError>;
