//! Typed accumulators that features use to mutate a workload template
//!
//! Every manager takes a [`MergeStrategy`] that decides what happens when a
//! contribution names an item that already exists. Re-adding an identical
//! item is always a no-op, whatever the strategy, so a manager call is safe
//! to repeat. Calls that touch several containers check all of them before
//! changing any, so a conflict leaves the template as it was.

mod annotation;
mod env;
mod rbac;
mod security;
mod volume;
mod volume_mount;

pub use annotation::AnnotationManager;
pub use env::{EnvVarManager, APPEND_SEPARATOR};
pub use rbac::{AccessRule, AccessRuleManager, RoleBindingKey};
pub use security::SecurityCapabilityManager;
pub use volume::VolumeManager;
pub use volume_mount::VolumeMountManager;

use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use serde::{Deserialize, Serialize};

use crate::template::ContainerName;

/// Policy applied when two contributions target the same named item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStrategy {
    /// Replace the existing item with the new one
    Overwrite,
    /// Combine both items (list-valued env vars, ConfigMap volume items)
    Append,
    /// Fail when the items differ
    #[default]
    RejectOnConflict,
}

fn pod_spec_mut(template: &mut PodTemplateSpec) -> &mut PodSpec {
    template.spec.get_or_insert_with(PodSpec::default)
}

/// All containers of a template, in pod order
fn containers(template: &PodTemplateSpec) -> impl Iterator<Item = &Container> {
    template.spec.iter().flat_map(|s| s.containers.iter())
}

fn container(template: &PodTemplateSpec, name: ContainerName) -> Option<&Container> {
    containers(template).find(|c| c.name == name.as_str())
}

fn containers_mut(template: &mut PodTemplateSpec) -> impl Iterator<Item = &mut Container> {
    pod_spec_mut(template).containers.iter_mut()
}

/// The container with the given name, if the template holds it
fn container_mut(template: &mut PodTemplateSpec, name: ContainerName) -> Option<&mut Container> {
    pod_spec_mut(template)
        .containers
        .iter_mut()
        .find(|c| c.name == name.as_str())
}
