//! # Rules
//!
//! A rule attaches an [`Access`] verdict to a `(role, resource, operation)` key.
//! Only `Allow` and `Deny` rules are ever persisted; `Inherit` is represented by the
//! absence of a row.

use serde::{Deserialize, Serialize};

use crate::access::Access;
use crate::error::RulesResult;
use crate::resources::{validate_operation, Resource};

/// Identifier of a role an identity may belong to.
///
/// Roles are owned outside this crate; only the numeric id is stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl RoleId {
    /// Get the raw numeric id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RoleId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key of a rule. At most one row exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    /// Role the rule belongs to.
    pub role: RoleId,
    /// Resource identifier or trailing-wildcard pattern.
    pub resource: Resource,
    /// Guarded operation name.
    pub operation: String,
}

impl RuleKey {
    /// Create a new key, validating the operation name.
    pub fn new(
        role: RoleId,
        resource: Resource,
        operation: impl Into<String>,
    ) -> RulesResult<Self> {
        let operation = operation.into();
        validate_operation(&operation)?;
        Ok(Self {
            role,
            resource,
            operation,
        })
    }
}

/// A single access rule.
///
/// # Example
///
/// ```
/// use platform_rules::{Access, RoleId, Rule, RuleChange};
///
/// let rule = Rule::new(RoleId(10), "compose:record:42", "read", Access::Allow).unwrap();
/// assert_eq!(rule.to_string(), "10:compose:record:42:read=allow");
///
/// // Inherit turns into a delete of the key
/// let clear = Rule::new(RoleId(10), "compose:record:42", "read", Access::Inherit).unwrap();
/// assert!(matches!(clear.into_change(), RuleChange::Remove(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Role the rule belongs to.
    pub role: RoleId,
    /// Resource identifier or trailing-wildcard pattern.
    pub resource: Resource,
    /// Guarded operation name.
    pub operation: String,
    /// Verdict of the rule.
    pub access: Access,
}

impl Rule {
    /// Create a rule from raw parts, validating the resource and operation.
    ///
    /// # Arguments
    ///
    /// * `role` - Role id
    /// * `resource` - Resource identifier, optionally ending in `*`
    /// * `operation` - Operation name
    /// * `access` - Verdict
    pub fn new(
        role: RoleId,
        resource: &str,
        operation: impl Into<String>,
        access: Access,
    ) -> RulesResult<Self> {
        let key = RuleKey::new(role, Resource::parse(resource)?, operation)?;
        Ok(Self::from_key(key, access))
    }

    /// Build a rule from an existing key.
    pub fn from_key(key: RuleKey, access: Access) -> Self {
        Self {
            role: key.role,
            resource: key.resource,
            operation: key.operation,
            access,
        }
    }

    /// The composite key of this rule.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            role: self.role,
            resource: self.resource.clone(),
            operation: self.operation.clone(),
        }
    }

    /// Re-check the invariants of a rule built by hand or deserialized.
    pub fn validate(&self) -> RulesResult<()> {
        validate_operation(&self.operation)
    }

    /// Turn the rule into the store mutation that realises it.
    ///
    /// `Inherit` becomes a removal of the key; anything else is an upsert.
    pub fn into_change(self) -> RuleChange {
        match self.access {
            Access::Inherit => RuleChange::Remove(self.key()),
            _ => RuleChange::Upsert(self),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}={}", self.role, self.resource, self.operation, self.access)
    }
}

/// A single mutation of the rule set, applied as part of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleChange {
    /// Insert the rule, replacing any row with the same key.
    Upsert(Rule),
    /// Delete the row with this key. Succeeds when no row exists.
    Remove(RuleKey),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RulesError;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new(RoleId(7), "ns:42", "read", Access::Allow).unwrap();
        assert_eq!(rule.role, RoleId(7));
        assert_eq!(rule.resource.as_str(), "ns:42");
        assert_eq!(rule.operation, "read");
        assert_eq!(rule.access, Access::Allow);
    }

    #[test]
    fn test_rule_rejects_malformed_parts() {
        assert!(matches!(
            Rule::new(RoleId(7), "", "read", Access::Allow),
            Err(RulesError::Validation(_))
        ));
        assert!(matches!(
            Rule::new(RoleId(7), "ns:*:*", "read", Access::Allow),
            Err(RulesError::Validation(_))
        ));
        assert!(matches!(
            Rule::new(RoleId(7), "ns:42", "", Access::Allow),
            Err(RulesError::Validation(_))
        ));
    }

    #[test]
    fn test_into_change() {
        let allow = Rule::new(RoleId(7), "ns:42", "read", Access::Allow).unwrap();
        assert_eq!(allow.clone().into_change(), RuleChange::Upsert(allow));

        let inherit = Rule::new(RoleId(7), "ns:42", "read", Access::Inherit).unwrap();
        let key = inherit.key();
        assert_eq!(inherit.into_change(), RuleChange::Remove(key));
    }

    #[test]
    fn test_rule_serde() {
        let rule = Rule::new(RoleId(3), "ns:*", "update", Access::Deny).unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": 3,
                "resource": "ns:*",
                "operation": "update",
                "access": "deny"
            })
        );

        let back: Rule = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);
    }
}
