//! Access resolution
//!
//! The resolver answers "may these roles perform this operation on this
//! resource?" by folding every candidate rule with `Deny` > `Allow` > `Inherit`
//! precedence. It holds no state besides the injected store and performs no
//! retries; it does not walk the resource hierarchy either. Callers that get
//! `Inherit` apply their own default or re-query with a broader pattern.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::access::Access;
use crate::config::RulesConfig;
use crate::error::{RulesError, RulesResult};
use crate::identity::Identity;
use crate::resources::{validate_operation, Resource};
use crate::rule::{RoleId, Rule};
use crate::store::RuleStore;

/// Stateless decision service over a [`RuleStore`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use platform_rules::{Access, MemoryRuleStore, Resolver, RoleId};
///
/// async fn example() {
///     let resolver = Resolver::new(Arc::new(MemoryRuleStore::new()));
///
///     let verdict = resolver
///         .is_allowed(&[RoleId(10), RoleId(11)], "compose:record:42", "read")
///         .await;
///     assert_eq!(verdict, Access::Inherit);
/// }
/// ```
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn RuleStore>,
    config: RulesConfig,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver with default configuration.
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self::with_config(store, RulesConfig::default())
    }

    /// Create a resolver with custom configuration.
    pub fn with_config(store: Arc<dyn RuleStore>, config: RulesConfig) -> Self {
        Self { store, config }
    }

    /// Get the active configuration.
    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    /// Resolve a decision, reporting failures to the caller.
    ///
    /// Bounded by the configured query timeout.
    ///
    /// # Arguments
    ///
    /// * `roles` - Role memberships of the caller
    /// * `resource` - Resource identifier; a trailing `*` resolves over everything
    ///   under the prefix
    /// * `operation` - Operation name
    ///
    /// # Errors
    ///
    /// - `RulesError::Validation` for a malformed resource or operation
    /// - `RulesError::Timeout` when the store does not answer in time
    /// - `RulesError::Storage` when the store query fails
    pub async fn check(
        &self,
        roles: &[RoleId],
        resource: &str,
        operation: &str,
    ) -> RulesResult<Access> {
        self.check_within(roles, resource, operation, self.config.query_timeout)
            .await
    }

    /// Resolve a decision with a caller-supplied deadline.
    ///
    /// When the deadline passes the in-flight store query is dropped and
    /// `RulesError::Timeout` is returned; no verdict is produced.
    pub async fn check_within(
        &self,
        roles: &[RoleId],
        resource: &str,
        operation: &str,
        timeout: Duration,
    ) -> RulesResult<Access> {
        let resource = Resource::parse(resource)?;
        validate_operation(operation)?;

        let roles: Vec<RoleId> = roles
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if roles.is_empty() {
            return Ok(Access::Inherit);
        }

        let query = self.store.rules_for(&roles, &resource, operation);
        let rules = tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| RulesError::Timeout(timeout))??;

        let folded = candidates(&rules, &roles, &resource, operation);
        let verdict = Access::resolve(folded.iter().copied());

        tracing::debug!(
            resource = %resource,
            operation = operation,
            roles = roles.len(),
            fetched = rules.len(),
            matched = folded.len(),
            verdict = %verdict,
            "Access resolved"
        );

        Ok(verdict)
    }

    /// Resolve a decision, failing closed.
    ///
    /// Any error, including validation and timeouts, yields `Deny`. Use
    /// [`Resolver::check`] to tell a policy denial from an evaluation failure.
    pub async fn is_allowed(&self, roles: &[RoleId], resource: &str, operation: &str) -> Access {
        match self.check(roles, resource, operation).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(
                    resource = resource,
                    operation = operation,
                    error = %e,
                    code = e.error_code(),
                    "Access check failed, denying"
                );
                Access::Deny
            }
        }
    }

    /// Fail-closed decision for an identity's current memberships.
    pub async fn is_allowed_for(
        &self,
        identity: &dyn Identity,
        resource: &str,
        operation: &str,
    ) -> Access {
        self.is_allowed(identity.roles(), resource, operation).await
    }
}

/// Verdicts of the fetched rules that take part in the fold.
///
/// A store may over-fetch, so the candidate filter is applied again here.
fn candidates(
    rules: &[Rule],
    roles: &[RoleId],
    resource: &Resource,
    operation: &str,
) -> Vec<Access> {
    rules
        .iter()
        .filter(|rule| {
            rule.operation == operation
                && roles.contains(&rule.role)
                && rule.resource.applies_to(resource)
        })
        .map(|rule| rule.access)
        .collect()
}
