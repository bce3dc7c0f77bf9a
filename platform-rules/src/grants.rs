//! Grant management
//!
//! Every mutating call of [`GrantManager`] is validated up front and then handed
//! to the store as one atomic batch: either every rule of the call changes or
//! none does. Granting `Inherit` deletes the key, so the store stays sparse.

use std::sync::Arc;

use crate::access::Access;
use crate::config::RulesConfig;
use crate::error::{RulesError, RulesResult};
use crate::resources::Resource;
use crate::rule::{RoleId, Rule, RuleChange, RuleKey};
use crate::store::{ResourceFilter, RuleStore};

/// Transactional writer and administrative reader for the rule set.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use platform_rules::{Access, GrantManager, MemoryRuleStore, RoleId};
///
/// async fn example() -> Result<(), platform_rules::RulesError> {
///     let grants = GrantManager::new(Arc::new(MemoryRuleStore::new()));
///
///     grants
///         .grant_by_resource(RoleId(3), "compose:record:42", &["read", "update"], Access::Allow)
///         .await?;
///
///     assert_eq!(grants.list(RoleId(3)).await?.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct GrantManager {
    store: Arc<dyn RuleStore>,
    config: RulesConfig,
}

impl std::fmt::Debug for GrantManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GrantManager {
    /// Create a grant manager with default configuration.
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_config(store, RulesConfig::default())
    }

    /// Create a grant manager with custom configuration.
    pub fn with_config(store: Arc<dyn RuleStore>, config: RulesConfig) -> Self {
        Self { store, config }
    }

    /// Set one verdict for several operations on a resource.
    ///
    /// `Inherit` removes the rows; any other verdict upserts them. Repeating a
    /// call is idempotent.
    ///
    /// # Arguments
    ///
    /// * `role` - Role receiving the grant
    /// * `resource` - Resource identifier or trailing-wildcard pattern
    /// * `operations` - Operation names
    /// * `access` - Verdict to apply to every operation
    pub async fn grant_by_resource<S>(
        &self,
        role: RoleId,
        resource: &str,
        operations: &[S],
        access: Access,
    ) -> RulesResult<()>
    where
        S: AsRef<str>,
    {
        let resource = Resource::parse(resource)?;
        let changes = operations
            .iter()
            .map(|operation| -> RulesResult<RuleChange> {
                let key = RuleKey::new(role, resource.clone(), operation.as_ref())?;
                Ok(Rule::from_key(key, access).into_change())
            })
            .collect::<RulesResult<Vec<_>>>()?;

        self.commit(role, changes).await
    }

    /// Apply a heterogeneous set of rules for one role.
    ///
    /// The `role` field of every rule is overwritten with `role`.
    pub async fn grant(&self, role: RoleId, rules: Vec<Rule>) -> RulesResult<()> {
        let changes = rules
            .into_iter()
            .map(|mut rule| -> RulesResult<RuleChange> {
                rule.role = role;
                rule.validate()?;
                Ok(rule.into_change())
            })
            .collect::<RulesResult<Vec<_>>>()?;

        self.commit(role, changes).await
    }

    /// List every stored rule of a role.
    pub async fn list(&self, role: RoleId) -> RulesResult<Vec<Rule>> {
        self.read(self.store.list(role, None)).await
    }

    /// List the stored rules of a role on exactly `resource`.
    ///
    /// No matching or precedence is applied: `compose:*` returns the rows stored on
    /// the pattern itself, not those under it.
    pub async fn list_by_resource(&self, role: RoleId, resource: &str) -> RulesResult<Vec<Rule>> {
        let filter = ResourceFilter::Exact(Resource::parse(resource)?);
        self.read(self.store.list(role, Some(&filter))).await
    }

    /// List the stored rules of a role whose resource sits under `pattern`.
    ///
    /// `compose:*` returns `compose:record:1`, `compose:module:*` and `compose:*`.
    pub async fn list_under(&self, role: RoleId, pattern: &str) -> RulesResult<Vec<Rule>> {
        let pattern = Resource::parse(pattern)?;
        if !pattern.is_wildcard() {
            return Err(RulesError::Validation(format!(
                "{:?} is not a wildcard pattern",
                pattern.as_str()
            )));
        }
        let filter = ResourceFilter::Pattern(pattern);
        self.read(self.store.list(role, Some(&filter))).await
    }

    /// Remove every rule of a role, e.g. when the role itself is deleted.
    pub async fn delete(&self, role: RoleId) -> RulesResult<()> {
        let removed = self.store.delete_role(role, self.config.write_timeout).await?;

        tracing::info!(role = %role, removed = removed, "Rules of role deleted");
        Ok(())
    }

    async fn commit(&self, role: RoleId, changes: Vec<RuleChange>) -> RulesResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // The store enforces the write deadline up to its commit point.
        self.store.apply(&changes, self.config.write_timeout).await?;

        tracing::debug!(role = %role, changes = changes.len(), "Rule batch applied");
        Ok(())
    }

    async fn read<F>(&self, fut: F) -> RulesResult<Vec<Rule>>
    where
        F: std::future::Future<Output = RulesResult<Vec<Rule>>>,
    {
        let timeout = self.config.query_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| RulesError::Timeout(timeout))?
    }
}
