//! Explicit feature registry
//!
//! Built once at startup from a list of constructors. Enumeration order is
//! the id order, independent of registration order.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Feature, FeatureId};
use crate::config::FeatureOptions;
use crate::error::{FeatureError, Result};

/// Builds a fresh feature instance for one composition pass
pub type FeatureConstructor = fn(&FeatureOptions) -> Box<dyn Feature>;

/// Immutable map from id to constructor once built
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    constructors: BTreeMap<FeatureId, FeatureConstructor>,
}

impl FeatureRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in feature
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        crate::features::register_builtin(&mut registry)?;
        Ok(registry)
    }

    /// Register a constructor. Registering an id twice is an error.
    pub fn register(&mut self, id: FeatureId, constructor: FeatureConstructor) -> Result<()> {
        if self.constructors.contains_key(&id) {
            return Err(FeatureError::DuplicateFeature {
                id: id.as_str().to_string(),
            });
        }
        debug!(feature = %id, "registered feature");
        self.constructors.insert(id, constructor);
        Ok(())
    }

    /// Fresh instance of a registered feature
    pub fn build(&self, id: FeatureId, options: &FeatureOptions) -> Option<Box<dyn Feature>> {
        self.constructors.get(&id).map(|ctor| ctor(options))
    }

    /// Fresh instances of every feature, in id order
    pub fn build_all(&self, options: &FeatureOptions) -> Vec<Box<dyn Feature>> {
        self.constructors.values().map(|ctor| ctor(options)).collect()
    }

    /// Registered ids, in id order
    pub fn ids(&self) -> Vec<FeatureId> {
        self.constructors.keys().copied().collect()
    }

    /// Number of registered features
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
