//! Access rule accumulation
//!
//! Features declare the API access their workloads need as rules bound to a
//! (namespace, role, subject) triple. Each (API group, resource) pair is kept
//! once with the union of every verb granted on it. When the rules are
//! emitted, the resources of a group that ended up with the same verbs share
//! one `PolicyRule`, so no resource appears in two rules and the order
//! features run in never changes the output.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::rbac::v1::PolicyRule;

/// Binding a set of rules is attached to
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleBindingKey {
    /// Namespace of the role and its binding
    pub namespace: String,
    /// Role name
    pub role_name: String,
    /// Service account the role is bound to
    pub subject: String,
}

/// One access rule as declared by a feature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRule {
    /// API group, empty for the core group
    pub api_group: String,
    /// Resource kinds, plural lowercase
    pub resources: Vec<String>,
    /// Allowed verbs
    pub verbs: Vec<String>,
}

impl AccessRule {
    /// Rule for the given group, resources and verbs
    pub fn new<R, V>(api_group: impl Into<String>, resources: R, verbs: V) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            api_group: api_group.into(),
            resources: resources.into_iter().map(Into::into).collect(),
            verbs: verbs.into_iter().map(Into::into).collect(),
        }
    }
}

type ResourceKey = (String, String);

/// Accumulates access rules per binding
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccessRuleManager {
    bindings: BTreeMap<RoleBindingKey, BTreeMap<ResourceKey, BTreeSet<String>>>,
}

impl AccessRuleManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rules to the role bound to `subject` in `namespace`
    pub fn add_cluster_policy_rules(
        &mut self,
        namespace: &str,
        role_name: &str,
        subject: &str,
        rules: impl IntoIterator<Item = AccessRule>,
    ) {
        let key = RoleBindingKey {
            namespace: namespace.to_string(),
            role_name: role_name.to_string(),
            subject: subject.to_string(),
        };
        let mut rules = rules.into_iter().peekable();
        if rules.peek().is_none() {
            return;
        }
        let entry = self.bindings.entry(key).or_default();
        for rule in rules {
            for resource in rule.resources {
                entry
                    .entry((rule.api_group.clone(), resource))
                    .or_default()
                    .extend(rule.verbs.iter().cloned());
            }
        }
    }

    /// Bindings with at least one rule
    pub fn bindings(&self) -> impl Iterator<Item = &RoleBindingKey> {
        self.bindings.keys()
    }

    /// Normalized rules for one binding, ordered by API group then verbs
    pub fn policy_rules(&self, key: &RoleBindingKey) -> Vec<PolicyRule> {
        let Some(resources) = self.bindings.get(key) else {
            return Vec::new();
        };

        let mut grouped: BTreeMap<(&str, Vec<String>), Vec<String>> = BTreeMap::new();
        for ((group, resource), verbs) in resources {
            grouped
                .entry((group.as_str(), verbs.iter().cloned().collect()))
                .or_default()
                .push(resource.clone());
        }

        grouped
            .into_iter()
            .map(|((group, verbs), resources)| PolicyRule {
                api_groups: Some(vec![group.to_string()]),
                resources: Some(resources),
                verbs,
                ..Default::default()
            })
            .collect()
    }

    /// True when no rule was added
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
