//! Dependency store and per-pass staging
//!
//! Features never talk to the store directly. `manage_dependencies` stages
//! objects and access rules in [`Dependencies`]; the composition pass then
//! commits the staged set in a fixed order. Staging is an upsert map, so a
//! feature that stages the same object twice produces one write.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::PolicyRule;
use tracing::debug;

use crate::error::{FeatureError, Result};
use crate::merger::{AccessRuleManager, RoleBindingKey};

// =============================================================================
// Objects
// =============================================================================

/// Kinds of auxiliary objects a feature may need
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    /// core/v1 ConfigMap
    ConfigMap,
    /// core/v1 ServiceAccount
    ServiceAccount,
}

impl DependencyKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMap => "ConfigMap",
            Self::ServiceAccount => "ServiceAccount",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a staged object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: DependencyKind,
    /// Namespace, empty for cluster-scoped objects
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// An auxiliary object to create or update
#[derive(Clone, Debug, PartialEq)]
pub enum DependencyObject {
    /// Configuration payload
    ConfigMap(ConfigMap),
    /// Identity for a workload
    ServiceAccount(ServiceAccount),
}

impl DependencyObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> DependencyKind {
        match self {
            Self::ConfigMap(_) => DependencyKind::ConfigMap,
            Self::ServiceAccount(_) => DependencyKind::ServiceAccount,
        }
    }

    /// Store identity of the wrapped object
    pub fn key(&self) -> ObjectKey {
        let meta = match self {
            Self::ConfigMap(cm) => &cm.metadata,
            Self::ServiceAccount(sa) => &sa.metadata,
        };
        ObjectKey {
            kind: self.kind(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Idempotent upsert surface for auxiliary objects.
///
/// Implementations own their retry policy; an error here fails the pass.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DependencyStore: Send + Sync {
    /// Create the object or replace it when it exists
    async fn add_or_update(&self, object: DependencyObject) -> Result<()>;

    /// Ensure a cluster role with `rules` bound to `subject` in `namespace`
    async fn add_cluster_policy_rules(
        &self,
        namespace: &str,
        role_name: &str,
        subject: &str,
        rules: Vec<PolicyRule>,
    ) -> Result<()>;
}

/// Store kept in memory, counting only writes that changed content
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, DependencyObject>>,
    rules: Mutex<BTreeMap<RoleBindingKey, Vec<PolicyRule>>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes that changed the stored content
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored object for a key
    pub fn get(&self, key: &ObjectKey) -> Option<DependencyObject> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    /// Keys of all stored objects, in order
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored rules for a binding
    pub fn policy_rules(&self, key: &RoleBindingKey) -> Option<Vec<PolicyRule>> {
        self.rules.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl DependencyStore for InMemoryStore {
    async fn add_or_update(&self, object: DependencyObject) -> Result<()> {
        let key = object.key();
        let mut objects = self.objects.lock().map_err(|_| {
            FeatureError::store(key.kind.as_str(), key.to_string(), "store lock poisoned")
        })?;
        if objects.get(&key) != Some(&object) {
            objects.insert(key, object);
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn add_cluster_policy_rules(
        &self,
        namespace: &str,
        role_name: &str,
        subject: &str,
        rules: Vec<PolicyRule>,
    ) -> Result<()> {
        let key = RoleBindingKey {
            namespace: namespace.to_string(),
            role_name: role_name.to_string(),
            subject: subject.to_string(),
        };
        let mut stored = self
            .rules
            .lock()
            .map_err(|_| FeatureError::store("ClusterRole", role_name, "store lock poisoned"))?;
        if stored.get(&key) != Some(&rules) {
            stored.insert(key, rules);
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// =============================================================================
// Staging
// =============================================================================

/// Objects and access rules staged by one composition pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dependencies {
    objects: BTreeMap<ObjectKey, DependencyObject>,
    access_rules: AccessRuleManager,
}

impl Dependencies {
    /// Empty staging area
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an object, replacing a previously staged one with the same key
    pub fn add_or_update(&mut self, object: DependencyObject) {
        let key = object.key();
        debug!(object = %key, "staging dependency");
        self.objects.insert(key, object);
    }

    /// Staged object for a key
    pub fn get(&self, key: &ObjectKey) -> Option<&DependencyObject> {
        self.objects.get(key)
    }

    /// Staged objects, in key order
    pub fn objects(&self) -> impl Iterator<Item = &DependencyObject> {
        self.objects.values()
    }

    /// Accumulated access rules
    pub fn access_rules(&self) -> &AccessRuleManager {
        &self.access_rules
    }

    /// Accumulator for access rules
    pub fn access_rules_mut(&mut self) -> &mut AccessRuleManager {
        &mut self.access_rules
    }

    /// Push everything to the store: objects first, then access rules.
    ///
    /// Stops at the first failed write.
    pub async fn commit(&self, store: &dyn DependencyStore) -> Result<()> {
        for object in self.objects.values() {
            store.add_or_update(object.clone()).await?;
        }
        for key in self.access_rules.bindings() {
            let rules = self.access_rules.policy_rules(key);
            store
                .add_cluster_policy_rules(&key.namespace, &key.role_name, &key.subject, rules)
                .await?;
        }
        debug!(
            objects = self.objects.len(),
            bindings = self.access_rules.bindings().count(),
            "committed dependencies"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::AccessRule;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str, data: &str) -> DependencyObject {
        DependencyObject::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            data: Some([("conf.yaml".to_string(), data.to_string())].into()),
            ..Default::default()
        })
    }

    fn service_account(name: &str) -> DependencyObject {
        DependencyObject::ServiceAccount(ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn staged() -> Dependencies {
        let mut deps = Dependencies::new();
        deps.add_or_update(service_account("datadog-cluster-agent"));
        deps.add_or_update(config_map("ksm", "a: 1"));
        deps.access_rules_mut().add_cluster_policy_rules(
            "monitoring",
            "datadog-cluster-agent",
            "datadog-cluster-agent",
            [AccessRule::new("", ["nodes"], ["get"])],
        );
        deps
    }

    #[test]
    fn staging_is_an_upsert() {
        let mut deps = Dependencies::new();
        deps.add_or_update(config_map("ksm", "a: 1"));
        deps.add_or_update(config_map("ksm", "a: 2"));
        assert_eq!(deps.objects().count(), 1);
        assert_eq!(deps.objects().next(), Some(&config_map("ksm", "a: 2")));
    }

    #[test]
    fn object_key_orders_by_kind_then_name() {
        let deps = staged();
        let kinds: Vec<DependencyKind> = deps.objects().map(|o| o.kind()).collect();
        assert_eq!(kinds, vec![DependencyKind::ConfigMap, DependencyKind::ServiceAccount]);
        assert_eq!(config_map("ksm", "").key().to_string(), "ConfigMap monitoring/ksm");
    }

    #[tokio::test]
    async fn second_commit_writes_nothing() {
        let store = InMemoryStore::new();
        let deps = staged();
        deps.commit(&store).await.expect("first commit");
        assert_eq!(store.writes(), 3);
        deps.commit(&store).await.expect("second commit");
        assert_eq!(store.writes(), 3);
    }

    #[tokio::test]
    async fn commit_writes_objects_then_rules() {
        let mut store = MockDependencyStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_add_or_update()
            .withf(|o| o.kind() == DependencyKind::ConfigMap)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_add_or_update()
            .withf(|o| o.kind() == DependencyKind::ServiceAccount)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_add_cluster_policy_rules()
            .withf(|ns, role, subject, rules| {
                ns == "monitoring"
                    && role == "datadog-cluster-agent"
                    && subject == "datadog-cluster-agent"
                    && rules.len() == 1
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        staged().commit(&store).await.expect("commit");
    }

    #[tokio::test]
    async fn first_failure_aborts_commit() {
        let mut store = MockDependencyStore::new();
        store
            .expect_add_or_update()
            .times(1)
            .returning(|o| Err(FeatureError::store(o.kind().as_str(), o.key().name, "forbidden")));
        store.expect_add_cluster_policy_rules().never();

        let err = staged().commit(&store).await.expect_err("must fail");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("forbidden"));
    }
}
