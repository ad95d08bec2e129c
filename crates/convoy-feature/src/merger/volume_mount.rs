//! Volume mount manager

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, VolumeMount};
use tracing::debug;

use super::{container, container_mut, containers, containers_mut, MergeStrategy};
use crate::error::MergeError;
use crate::template::ContainerName;

/// Adds volume mounts to containers, keyed by mount path.
///
/// The same volume may be mounted at several paths. Two mounts at one path
/// that differ in volume, sub path or read-only mode conflict. `Append` has
/// no meaning for a mount and behaves like `RejectOnConflict`.
pub struct VolumeMountManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> VolumeMountManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Mount into every container of the template
    pub fn add(&mut self, mount: VolumeMount) -> Result<(), MergeError> {
        let strategy = MergeStrategy::default();
        for c in containers(self.template) {
            check_container(c, &mount, strategy)?;
        }
        for c in containers_mut(self.template) {
            apply_to_container(c, &mount, strategy);
        }
        Ok(())
    }

    /// Mount into one container
    pub fn add_to_container(
        &mut self,
        container: ContainerName,
        mount: VolumeMount,
    ) -> Result<(), MergeError> {
        self.add_to_container_with_strategy(container, mount, MergeStrategy::default())
    }

    /// Mount into several containers
    pub fn add_to_containers(
        &mut self,
        containers: &[ContainerName],
        mount: VolumeMount,
    ) -> Result<(), MergeError> {
        self.check_containers(containers, &mount)?;
        for name in containers {
            self.add_to_container(*name, mount.clone())?;
        }
        Ok(())
    }

    /// Check that `mount` fits every named container without changing any
    pub(super) fn check_containers(
        &self,
        containers: &[ContainerName],
        mount: &VolumeMount,
    ) -> Result<(), MergeError> {
        for name in containers {
            if let Some(c) = container(&*self.template, *name) {
                check_container(c, mount, MergeStrategy::default())?;
            }
        }
        Ok(())
    }

    /// Mount into one container with an explicit strategy
    pub fn add_to_container_with_strategy(
        &mut self,
        container: ContainerName,
        mount: VolumeMount,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        match container_mut(self.template, container) {
            Some(c) => merge_into_container(c, &mount, strategy),
            None => {
                debug!(
                    container = %container,
                    mount_path = %mount.mount_path,
                    "container not present, skipping volume mount"
                );
                Ok(())
            }
        }
    }
}

fn merge_into_container(
    container: &mut Container,
    incoming: &VolumeMount,
    strategy: MergeStrategy,
) -> Result<(), MergeError> {
    check_container(container, incoming, strategy)?;
    apply_to_container(container, incoming, strategy);
    Ok(())
}

fn check_container(
    container: &Container,
    incoming: &VolumeMount,
    strategy: MergeStrategy,
) -> Result<(), MergeError> {
    let Some(existing) = container
        .volume_mounts
        .iter()
        .flatten()
        .find(|m| m.mount_path == incoming.mount_path)
    else {
        return Ok(());
    };
    if existing == incoming || strategy == MergeStrategy::Overwrite {
        return Ok(());
    }

    let message = if existing.name != incoming.name {
        format!("volume {} conflicts with {}", existing.name, incoming.name)
    } else if existing.read_only.unwrap_or(false) != incoming.read_only.unwrap_or(false) {
        "read-only mode differs".to_string()
    } else {
        "mount options differ".to_string()
    };
    Err(MergeError::VolumeMount {
        container: container.name.clone(),
        mount_path: incoming.mount_path.clone(),
        message,
    })
}

/// Apply a mount that [`check_container`] accepted
fn apply_to_container(container: &mut Container, incoming: &VolumeMount, strategy: MergeStrategy) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts
        .iter_mut()
        .find(|m| m.mount_path == incoming.mount_path)
    {
        None => mounts.push(incoming.clone()),
        Some(existing) if strategy == MergeStrategy::Overwrite => *existing = incoming.clone(),
        Some(_) => {}
    }
}
