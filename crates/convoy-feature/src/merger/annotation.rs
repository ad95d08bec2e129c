//! Pod annotation manager

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use convoy_common::{checksum_annotation_key, CHECKSUM_ANNOTATION_PREFIX};

use crate::error::MergeError;

/// Sets annotations on the pod template metadata.
///
/// Plain annotations are last-write-wins. Keys under `checksum/` are only
/// written through [`AnnotationManager::add_config_hash`] so that each feature
/// owns exactly one checksum key.
pub struct AnnotationManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> AnnotationManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Set an annotation
    pub fn add(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MergeError> {
        let key = key.into();
        if key.starts_with(CHECKSUM_ANNOTATION_PREFIX) {
            return Err(MergeError::ReservedAnnotation { key });
        }
        self.insert(key, value.into());
        Ok(())
    }

    /// Record the config hash of a feature as `checksum/<feature>-custom-config`
    pub fn add_config_hash(&mut self, feature_id: &str, hash: impl Into<String>) {
        self.insert(checksum_annotation_key(feature_id), hash.into());
    }

    fn insert(&mut self, key: String, value: String) {
        self.template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key, value);
    }
}
