//! Rule store abstraction
//!
//! This module defines the persistence contract used by the resolver and the
//! grant manager, and an in-memory implementation for single-process apps and
//! tests.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::access::Access;
use crate::error::{RulesError, RulesResult};
use crate::resources::Resource;
use crate::rule::{RoleId, Rule, RuleChange, RuleKey};

/// How an administrative listing selects rows by resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    /// Stored resource equals the given identifier, character for character.
    ///
    /// Listing `ns:*` exactly returns the rows stored on the pattern itself.
    Exact(Resource),

    /// Stored resource sits under the given pattern's prefix.
    Pattern(Resource),
}

impl ResourceFilter {
    /// Check whether a stored resource passes this filter.
    pub fn matches(&self, stored: &Resource) -> bool {
        match self {
            ResourceFilter::Exact(resource) => stored == resource,
            ResourceFilter::Pattern(pattern) => stored.falls_under(pattern),
        }
    }
}

/// Persistence contract for access rules.
///
/// Only `Allow` and `Deny` rows are ever stored. Implementations must make
/// [`RuleStore::apply`] all-or-nothing, with at least read-committed isolation
/// so a concurrent reader never observes half of a batch.
///
/// Writes take a deadline. A store enforces it only up to its commit point and
/// never abandons a commit in flight, so `RulesError::Timeout` from a write
/// always means nothing was written.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Fetch every rule that is a candidate for a decision.
    ///
    /// Returns rules whose role is in `roles`, whose operation equals `operation`
    /// and whose stored resource [applies to](Resource::applies_to) `resource`.
    /// Order is unspecified.
    async fn rules_for(
        &self,
        roles: &[RoleId],
        resource: &Resource,
        operation: &str,
    ) -> RulesResult<Vec<Rule>>;

    /// List the raw rows of a role, optionally filtered by resource.
    async fn list(&self, role: RoleId, filter: Option<&ResourceFilter>) -> RulesResult<Vec<Rule>>;

    /// Apply a batch of upserts and removals in one transaction.
    ///
    /// Either every change is applied or none is. Fails with
    /// `RulesError::Timeout` when the batch cannot reach its commit point
    /// within `deadline`.
    async fn apply(&self, changes: &[RuleChange], deadline: Duration) -> RulesResult<()>;

    /// Remove every row of a role, under the same deadline rules as `apply`.
    ///
    /// # Returns
    ///
    /// The number of rows removed
    async fn delete_role(&self, role: RoleId, deadline: Duration) -> RulesResult<u64>;
}

/// In-memory rule store.
///
/// Rows are kept in key order behind a single `RwLock`, so readers never see a
/// partially applied batch. Suitable for single-process applications and
/// testing; use the PostgreSQL store for shared deployments.
#[derive(Clone, Default)]
pub struct MemoryRuleStore {
    rows: Arc<RwLock<BTreeMap<RuleKey, Access>>>,
}

impl std::fmt::Debug for MemoryRuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRuleStore").finish_non_exhaustive()
    }
}

impl MemoryRuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with rules.
    ///
    /// `Inherit` rules are skipped, as a grant of `Inherit` would be.
    pub fn with_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = Rule>,
    {
        let rows = rules
            .into_iter()
            .filter(|rule| rule.access != Access::Inherit)
            .map(|rule| (rule.key(), rule.access))
            .collect();

        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Check if the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Look up the stored verdict of a single key.
    pub async fn get(&self, key: &RuleKey) -> Option<Access> {
        self.rows.read().await.get(key).copied()
    }

    fn check_change(change: &RuleChange) -> RulesResult<()> {
        if let RuleChange::Upsert(rule) = change {
            if rule.access == Access::Inherit {
                return Err(RulesError::Constraint(format!(
                    "inherit is never stored (rule {})",
                    rule
                )));
            }
            rule.validate()?;
        }
        Ok(())
    }

    async fn write_lock(
        &self,
        deadline: Duration,
    ) -> RulesResult<RwLockWriteGuard<'_, BTreeMap<RuleKey, Access>>> {
        tokio::time::timeout(deadline, self.rows.write())
            .await
            .map_err(|_| RulesError::Timeout(deadline))
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn rules_for(
        &self,
        roles: &[RoleId],
        resource: &Resource,
        operation: &str,
    ) -> RulesResult<Vec<Rule>> {
        let rows = self.rows.read().await;

        Ok(rows
            .iter()
            .filter(|(key, _)| {
                key.operation == operation
                    && roles.contains(&key.role)
                    && key.resource.applies_to(resource)
            })
            .map(|(key, access)| Rule::from_key(key.clone(), *access))
            .collect())
    }

    async fn list(&self, role: RoleId, filter: Option<&ResourceFilter>) -> RulesResult<Vec<Rule>> {
        let rows = self.rows.read().await;

        Ok(rows
            .iter()
            .filter(|(key, _)| key.role == role)
            .filter(|(key, _)| filter.map_or(true, |f| f.matches(&key.resource)))
            .map(|(key, access)| Rule::from_key(key.clone(), *access))
            .collect())
    }

    async fn apply(&self, changes: &[RuleChange], deadline: Duration) -> RulesResult<()> {
        // Check the whole batch before the first write so a rejected batch
        // leaves the map untouched.
        for change in changes {
            Self::check_change(change)?;
        }

        // Holding the lock is the commit point; nothing below awaits.
        let mut rows = self.write_lock(deadline).await?;
        for change in changes {
            match change {
                RuleChange::Upsert(rule) => {
                    rows.insert(rule.key(), rule.access);
                }
                RuleChange::Remove(key) => {
                    rows.remove(key);
                }
            }
        }

        Ok(())
    }

    async fn delete_role(&self, role: RoleId, deadline: Duration) -> RulesResult<u64> {
        let mut rows = self.write_lock(deadline).await?;
        let before = rows.len();
        rows.retain(|key, _| key.role != role);
        Ok((before - rows.len()) as u64)
    }
}
