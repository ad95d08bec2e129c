//! Linux capability manager

use k8s_openapi::api::core::v1::{Capabilities, Container, PodTemplateSpec, SecurityContext};
use tracing::debug;

use super::container_mut;
use crate::template::ContainerName;

/// Adds Linux capabilities to container security contexts.
///
/// Capabilities form a set: the result is the union of every contribution,
/// in first-seen order, so there is nothing to conflict on.
pub struct SecurityCapabilityManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> SecurityCapabilityManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add capabilities to one container
    pub fn add_to_container<I, S>(&mut self, container: ContainerName, capabilities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match container_mut(self.template, container) {
            Some(c) => add_capabilities(c, capabilities),
            None => debug!(container = %container, "container not present, skipping capabilities"),
        }
    }

    /// Add capabilities to several containers
    pub fn add_to_containers<S>(&mut self, containers: &[ContainerName], capabilities: &[S])
    where
        S: AsRef<str>,
    {
        for container in containers {
            self.add_to_container(*container, capabilities.iter().map(|c| c.as_ref().to_string()));
        }
    }
}

fn add_capabilities<I, S>(container: &mut Container, capabilities: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let added = container
        .security_context
        .get_or_insert_with(SecurityContext::default)
        .capabilities
        .get_or_insert_with(Capabilities::default)
        .add
        .get_or_insert_with(Vec::new);

    for cap in capabilities {
        let cap = cap.into();
        if !added.contains(&cap) {
            added.push(cap);
        }
    }
}
