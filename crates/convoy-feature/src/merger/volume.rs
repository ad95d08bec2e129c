//! Volume manager

use k8s_openapi::api::core::v1::{PodTemplateSpec, Volume, VolumeMount};

use super::{pod_spec_mut, MergeStrategy, VolumeMountManager};
use crate::error::MergeError;
use crate::template::ContainerName;

/// Adds pod volumes to one template, keyed by volume name.
///
/// `Append` only applies to two ConfigMap volumes backed by the same
/// ConfigMap: their item lists are unioned. Any other difference under
/// `Append` is treated as a conflict.
pub struct VolumeManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> VolumeManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add a pod volume
    pub fn add(&mut self, volume: Volume) -> Result<(), MergeError> {
        self.add_with_strategy(volume, MergeStrategy::default())
    }

    /// Add a pod volume with an explicit strategy
    pub fn add_with_strategy(
        &mut self,
        volume: Volume,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        let volumes = pod_spec_mut(self.template)
            .volumes
            .get_or_insert_with(Vec::new);
        let Some(existing) = volumes.iter_mut().find(|v| v.name == volume.name) else {
            volumes.push(volume);
            return Ok(());
        };

        if *existing == volume {
            return Ok(());
        }

        match strategy {
            MergeStrategy::Overwrite => {
                *existing = volume;
                Ok(())
            }
            MergeStrategy::Append if merge_config_map_items(existing, &volume) => Ok(()),
            MergeStrategy::Append | MergeStrategy::RejectOnConflict => Err(MergeError::Volume {
                name: volume.name.clone(),
                existing: describe(existing),
                incoming: describe(&volume),
            }),
        }
    }

    /// Add a pod volume and mount it into one container
    pub fn add_to_container(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        container: ContainerName,
    ) -> Result<(), MergeError> {
        self.add_to_containers(volume, mount, &[container])
    }

    /// Add a pod volume and mount it into several containers
    pub fn add_to_containers(
        &mut self,
        volume: Volume,
        mount: VolumeMount,
        containers: &[ContainerName],
    ) -> Result<(), MergeError> {
        VolumeMountManager::new(self.template).check_containers(containers, &mount)?;
        self.add(volume)?;
        VolumeMountManager::new(self.template).add_to_containers(containers, mount)
    }
}

/// Union the items of two volumes backed by the same ConfigMap.
///
/// Returns false when the volumes are not both ConfigMap volumes of the same
/// ConfigMap with otherwise equal settings.
fn merge_config_map_items(existing: &mut Volume, incoming: &Volume) -> bool {
    let (Some(current), Some(extra)) = (existing.config_map.as_mut(), incoming.config_map.as_ref())
    else {
        return false;
    };
    if current.name != extra.name
        || current.default_mode != extra.default_mode
        || current.optional != extra.optional
    {
        return false;
    }

    let items = current.items.get_or_insert_with(Vec::new);
    for item in extra.items.iter().flatten() {
        if !items.iter().any(|i| i.key == item.key) {
            items.push(item.clone());
        }
    }
    true
}

fn describe(volume: &Volume) -> String {
    if let Some(cm) = &volume.config_map {
        format!("configMap:{}", cm.name)
    } else if let Some(host) = &volume.host_path {
        format!("hostPath:{}", host.path)
    } else if let Some(secret) = &volume.secret {
        format!("secret:{}", secret.secret_name.as_deref().unwrap_or_default())
    } else if volume.empty_dir.is_some() {
        "emptyDir".to_string()
    } else {
        "other".to_string()
    }
}
