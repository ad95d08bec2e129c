//! Common types for convoy: the FleetAgent CRD, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod telemetry;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for convoy resources
pub const CONVOY_API_GROUP: &str = "convoy.dev";

/// Annotation key prefix reserved for config-change checksums
pub const CHECKSUM_ANNOTATION_PREFIX: &str = "checksum/";

/// Build the checksum annotation key for a feature's custom configuration.
///
/// Keys are derived from the feature id, so two features can never write
/// the same checksum key.
pub fn checksum_annotation_key(feature_id: &str) -> String {
    format!("{}{}-custom-config", CHECKSUM_ANNOTATION_PREFIX, feature_id)
}
