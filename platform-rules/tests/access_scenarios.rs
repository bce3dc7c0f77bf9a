//! End-to-end tests for rule resolution and grant management.
//!
//! These tests drive the resolver and the grant manager together over one shared
//! store, the way a service layer does: grants are written through the manager
//! and decisions are read back through the resolver.
//!
//! Scenarios:
//! 1. Role memberships combining allow and deny rules
//! 2. Wildcard patterns over hierarchical resources
//! 3. Sparse inherit and idempotent grants
//! 4. Atomic batches under a failing backend
//! 5. Readers and decisions racing a writer never observe half a batch

use async_trait::async_trait;
use platform_rules::{
    Access, GrantManager, MemoryRuleStore, Principal, Resolver, Resource, ResourceFilter, RoleId,
    Rule, RuleChange, RuleStore, RulesError, RulesResult,
};
use std::sync::Arc;
use std::time::Duration;

/// Test fixture sharing one store between a resolver and a grant manager.
struct TestFixture {
    /// Backing store, for direct inspection.
    store: Arc<MemoryRuleStore>,
    /// Grant manager writing to `store`.
    grants: GrantManager,
    /// Resolver reading from `store`.
    resolver: Resolver,
}

impl TestFixture {
    fn new() -> Self {
        let store = Arc::new(MemoryRuleStore::new());
        Self {
            grants: GrantManager::new(store.clone()),
            resolver: Resolver::new(store.clone()),
            store,
        }
    }
}

/// Backend whose transaction aborts when a batch touches a poisoned operation.
///
/// Like a database rolling back, an aborted batch commits nothing.
struct AbortingStore {
    inner: MemoryRuleStore,
    poisoned_operation: &'static str,
}

#[async_trait]
impl RuleStore for AbortingStore {
    async fn rules_for(
        &self,
        roles: &[RoleId],
        resource: &Resource,
        operation: &str,
    ) -> RulesResult<Vec<Rule>> {
        self.inner.rules_for(roles, resource, operation).await
    }

    async fn list(&self, role: RoleId, filter: Option<&ResourceFilter>) -> RulesResult<Vec<Rule>> {
        self.inner.list(role, filter).await
    }

    async fn apply(&self, changes: &[RuleChange], deadline: Duration) -> RulesResult<()> {
        let poisoned = changes.iter().any(|change| match change {
            RuleChange::Upsert(rule) => rule.operation == self.poisoned_operation,
            RuleChange::Remove(key) => key.operation == self.poisoned_operation,
        });
        if poisoned {
            return Err(RulesError::Storage("transaction aborted".to_string()));
        }
        self.inner.apply(changes, deadline).await
    }

    async fn delete_role(&self, role: RoleId, deadline: Duration) -> RulesResult<u64> {
        self.inner.delete_role(role, deadline).await
    }
}

#[tokio::test]
async fn test_deny_from_second_role_overrides_allow() {
    let fx = TestFixture::new();
    let roles = [RoleId(10), RoleId(11)];

    fx.grants
        .grant_by_resource(RoleId(10), "compose:record:42", &["read"], Access::Allow)
        .await
        .unwrap();
    assert_eq!(
        fx.resolver.is_allowed(&roles, "compose:record:42", "read").await,
        Access::Allow
    );

    fx.grants
        .grant_by_resource(RoleId(11), "compose:record:42", &["read"], Access::Deny)
        .await
        .unwrap();
    assert_eq!(
        fx.resolver.is_allowed(&roles, "compose:record:42", "read").await,
        Access::Deny
    );

    // Role order in the request does not matter
    assert_eq!(
        fx.resolver
            .is_allowed(&[RoleId(11), RoleId(10)], "compose:record:42", "read")
            .await,
        Access::Deny
    );
}

#[tokio::test]
async fn test_unknown_resource_inherits() {
    let fx = TestFixture::new();
    fx.grants
        .grant_by_resource(RoleId(10), "compose:record:42", &["read"], Access::Allow)
        .await
        .unwrap();

    let principal = Principal::new(7, [RoleId(10)]);
    assert_eq!(
        fx.resolver.is_allowed_for(&principal, "compose:record:43", "read").await,
        Access::Inherit
    );
    assert_eq!(
        fx.resolver.is_allowed_for(&principal, "compose:record:42", "update").await,
        Access::Inherit
    );
}

#[tokio::test]
async fn test_wildcard_grant_covers_subtree() {
    let fx = TestFixture::new();
    fx.grants
        .grant_by_resource(RoleId(1), "ns:*", &["read"], Access::Allow)
        .await
        .unwrap();

    let roles = [RoleId(1)];
    assert_eq!(fx.resolver.is_allowed(&roles, "ns:module:1", "read").await, Access::Allow);
    assert_eq!(
        fx.resolver.is_allowed(&roles, "ns:module:2:field:3", "read").await,
        Access::Allow
    );
    assert_eq!(fx.resolver.is_allowed(&roles, "other:module:1", "read").await, Access::Inherit);

    // A narrower deny inside the subtree wins for that resource only
    fx.grants
        .grant_by_resource(RoleId(1), "ns:module:2:*", &["read"], Access::Deny)
        .await
        .unwrap();
    assert_eq!(
        fx.resolver.is_allowed(&roles, "ns:module:2:field:3", "read").await,
        Access::Deny
    );
    assert_eq!(fx.resolver.is_allowed(&roles, "ns:module:1", "read").await, Access::Allow);
}

#[tokio::test]
async fn test_inherit_leaves_no_row() {
    let fx = TestFixture::new();

    for _ in 0..2 {
        fx.grants
            .grant_by_resource(RoleId(7), "ns:42", &["read"], Access::Inherit)
            .await
            .unwrap();
        assert!(fx.store.is_empty().await);
    }

    fx.grants
        .grant_by_resource(RoleId(7), "ns:42", &["read"], Access::Allow)
        .await
        .unwrap();
    fx.grants
        .grant_by_resource(RoleId(7), "ns:42", &["read"], Access::Inherit)
        .await
        .unwrap();
    assert!(fx.store.is_empty().await);
    assert!(fx.grants.list_by_resource(RoleId(7), "ns:42").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_grant_is_atomic_on_backend_failure() {
    let store = Arc::new(AbortingStore {
        inner: MemoryRuleStore::new(),
        poisoned_operation: "update",
    });
    let grants = GrantManager::new(store.clone());

    grants
        .grant_by_resource(RoleId(3), "ns:42", &["read"], Access::Deny)
        .await
        .unwrap();

    let result = grants
        .grant_by_resource(RoleId(3), "ns:42", &["read", "update"], Access::Allow)
        .await;
    assert!(matches!(result, Err(RulesError::Storage(_))));

    let rows = grants.list(RoleId(3)).await.unwrap();
    assert_eq!(rows, vec![Rule::new(RoleId(3), "ns:42", "read", Access::Deny).unwrap()]);
}

#[tokio::test]
async fn test_batch_grant_all_operations_persisted() {
    let fx = TestFixture::new();

    fx.grants
        .grant_by_resource(RoleId(3), "ns:42", &["read", "update"], Access::Allow)
        .await
        .unwrap();

    let rows = fx.grants.list_by_resource(RoleId(3), "ns:42").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|rule| rule.access == Access::Allow));
}

#[tokio::test]
async fn test_role_deletion_revokes_decisions() {
    let fx = TestFixture::new();
    fx.grants
        .grant(
            RoleId(20),
            vec![
                Rule::new(RoleId(20), "system:user:*", "read", Access::Allow).unwrap(),
                Rule::new(RoleId(20), "system:user:1", "update", Access::Allow).unwrap(),
            ],
        )
        .await
        .unwrap();
    assert_eq!(
        fx.resolver.is_allowed(&[RoleId(20)], "system:user:1", "update").await,
        Access::Allow
    );

    fx.grants.delete(RoleId(20)).await.unwrap();
    assert_eq!(
        fx.resolver.is_allowed(&[RoleId(20)], "system:user:1", "update").await,
        Access::Inherit
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_half_a_batch() {
    let fx = Arc::new(TestFixture::new());

    let writer = {
        let fx = fx.clone();
        tokio::spawn(async move {
            for round in 0..200 {
                let access = if round % 2 == 0 { Access::Allow } else { Access::Inherit };
                fx.grants
                    .grant_by_resource(RoleId(3), "ns:42", &["read", "update"], access)
                    .await
                    .unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let fx = fx.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let rows = fx.grants.list(RoleId(3)).await.unwrap();
                assert!(rows.is_empty() || rows.len() == 2, "saw {} rows", rows.len());
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_decisions_never_see_half_a_batch() {
    let fx = Arc::new(TestFixture::new());
    let batch = |access_a: Access, access_b: Access| {
        vec![
            Rule::new(RoleId(3), "ns:a", "read", access_a).unwrap(),
            Rule::new(RoleId(3), "ns:b", "read", access_b).unwrap(),
        ]
    };

    let writer = {
        let fx = fx.clone();
        tokio::spawn(async move {
            for round in 0..200 {
                let rules = if round % 2 == 0 {
                    batch(Access::Allow, Access::Deny)
                } else {
                    batch(Access::Inherit, Access::Inherit)
                };
                fx.grants.grant(RoleId(3), rules).await.unwrap();
            }
        })
    };

    // `ns:*` folds both rows in one decision: Deny with the batch, Inherit
    // without it. Allow would mean only `ns:a` was visible.
    let mut readers = Vec::new();
    for _ in 0..4 {
        let fx = fx.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let verdict = fx.resolver.check(&[RoleId(3)], "ns:*", "read").await.unwrap();
                assert_ne!(verdict, Access::Allow);
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
