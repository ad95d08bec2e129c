//! Environment variable manager

use k8s_openapi::api::core::v1::{Container, EnvVar, PodTemplateSpec};
use tracing::debug;

use super::{container, container_mut, containers, containers_mut, MergeStrategy};
use crate::error::MergeError;
use crate::template::ContainerName;

/// Separator used by [`MergeStrategy::Append`] to join list values
pub const APPEND_SEPARATOR: &str = " ";

/// Adds env vars to the containers of one template.
///
/// The default strategy rejects a second, different value for a name that
/// already exists in a container. `Append` joins values into one
/// space-separated entry and skips tokens that are already present.
pub struct EnvVarManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> EnvVarManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add to every container of the template
    pub fn add(&mut self, env: EnvVar) -> Result<(), MergeError> {
        self.add_with_strategy(env, MergeStrategy::default())
    }

    /// Add to every container of the template with an explicit strategy
    pub fn add_with_strategy(
        &mut self,
        env: EnvVar,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        for c in containers(self.template) {
            check_container(c, &env, strategy)?;
        }
        for c in containers_mut(self.template) {
            apply_to_container(c, &env, strategy);
        }
        Ok(())
    }

    /// Add to one container
    pub fn add_to_container(
        &mut self,
        container: ContainerName,
        env: EnvVar,
    ) -> Result<(), MergeError> {
        self.add_to_container_with_strategy(container, env, MergeStrategy::default())
    }

    /// Add to several containers
    pub fn add_to_containers(
        &mut self,
        containers: &[ContainerName],
        env: EnvVar,
    ) -> Result<(), MergeError> {
        self.add_to_containers_with_strategy(containers, env, MergeStrategy::default())
    }

    /// Add to one container with an explicit strategy.
    ///
    /// A container the template does not hold is skipped: features may only
    /// rely on containers they required themselves.
    pub fn add_to_container_with_strategy(
        &mut self,
        container: ContainerName,
        env: EnvVar,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        match container_mut(self.template, container) {
            Some(c) => merge_into_container(c, &env, strategy),
            None => {
                debug!(
                    container = %container,
                    env = %env.name,
                    "container not present, skipping env var"
                );
                Ok(())
            }
        }
    }

    /// Add to several containers with an explicit strategy
    pub fn add_to_containers_with_strategy(
        &mut self,
        containers: &[ContainerName],
        env: EnvVar,
        strategy: MergeStrategy,
    ) -> Result<(), MergeError> {
        for name in containers {
            if let Some(c) = container(self.template, *name) {
                check_container(c, &env, strategy)?;
            }
        }
        for name in containers {
            self.add_to_container_with_strategy(*name, env.clone(), strategy)?;
        }
        Ok(())
    }
}

fn merge_into_container(
    container: &mut Container,
    incoming: &EnvVar,
    strategy: MergeStrategy,
) -> Result<(), MergeError> {
    check_container(container, incoming, strategy)?;
    apply_to_container(container, incoming, strategy);
    Ok(())
}

fn check_container(
    container: &Container,
    incoming: &EnvVar,
    strategy: MergeStrategy,
) -> Result<(), MergeError> {
    let Some(existing) = container
        .env
        .iter()
        .flatten()
        .find(|e| e.name == incoming.name)
    else {
        return Ok(());
    };
    if existing == incoming {
        return Ok(());
    }
    match strategy {
        MergeStrategy::Overwrite => Ok(()),
        MergeStrategy::Append if is_plain(existing) && is_plain(incoming) => Ok(()),
        _ => Err(conflict(&container.name, existing, incoming)),
    }
}

/// Only literal values can be joined
fn is_plain(env: &EnvVar) -> bool {
    env.value.is_some() && env.value_from.is_none()
}

/// Apply a contribution that [`check_container`] accepted
fn apply_to_container(container: &mut Container, incoming: &EnvVar, strategy: MergeStrategy) {
    let envs = container.env.get_or_insert_with(Vec::new);
    let Some(existing) = envs.iter_mut().find(|e| e.name == incoming.name) else {
        envs.push(incoming.clone());
        return;
    };
    if existing == incoming {
        return;
    }
    match strategy {
        MergeStrategy::Overwrite => *existing = incoming.clone(),
        MergeStrategy::Append => {
            if let (Some(current), Some(extra)) = (&existing.value, &incoming.value) {
                existing.value = Some(append_tokens(current, extra));
            }
        }
        MergeStrategy::RejectOnConflict => {}
    }
}

/// Append the tokens of `extra` that `current` does not hold yet
fn append_tokens(current: &str, extra: &str) -> String {
    let mut tokens: Vec<&str> = current.split_whitespace().collect();
    for token in extra.split_whitespace() {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(APPEND_SEPARATOR)
}

fn conflict(container: &str, existing: &EnvVar, incoming: &EnvVar) -> MergeError {
    MergeError::EnvVar {
        container: container.to_string(),
        name: incoming.name.clone(),
        existing: describe(existing),
        incoming: describe(incoming),
    }
}

fn describe(env: &EnvVar) -> String {
    match (&env.value, &env.value_from) {
        (Some(v), _) => v.clone(),
        (None, Some(_)) => "<valueFrom>".to_string(),
        (None, None) => String::new(),
    }
}
