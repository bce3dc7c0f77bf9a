//! # Access
//!
//! Defines the tri-state verdict attached to a rule and produced by the resolver.
//! Verdicts aggregate with a strict precedence: `Deny` > `Allow` > `Inherit`.

use serde::{Deserialize, Serialize};

use crate::error::{RulesError, RulesResult};

/// Access verdict for a `(role, resource, operation)` combination.
///
/// - **Deny**: The operation is refused. A single deny overrides any number of allows.
/// - **Allow**: The operation is permitted, unless something denies it.
/// - **Inherit**: No opinion. Never persisted; it is what an absent rule means.
///
/// # Example
///
/// ```
/// use platform_rules::Access;
///
/// let verdict = Access::resolve([Access::Allow, Access::Deny, Access::Allow]);
/// assert_eq!(verdict, Access::Deny);
///
/// assert_eq!(Access::resolve([]), Access::Inherit);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// The operation is refused.
    Deny,

    /// The operation is permitted.
    Allow,

    /// No rule matched; the caller decides.
    Inherit,
}

impl Access {
    /// Rank used by the precedence fold. Higher wins.
    pub fn precedence(&self) -> u8 {
        match self {
            Access::Deny => 2,
            Access::Allow => 1,
            Access::Inherit => 0,
        }
    }

    /// Fold a set of verdicts into one.
    ///
    /// Any `Deny` yields `Deny`, regardless of how many `Allow` values appear or in
    /// which order. Otherwise any `Allow` yields `Allow`. An empty input, or one
    /// made only of `Inherit`, yields `Inherit`.
    ///
    /// # Arguments
    ///
    /// * `values` - The verdicts of every matching rule
    pub fn resolve<I>(values: I) -> Access
    where
        I: IntoIterator<Item = Access>,
    {
        let mut verdict = Access::Inherit;
        for value in values {
            if value == Access::Deny {
                return Access::Deny;
            }
            if value.precedence() > verdict.precedence() {
                verdict = value;
            }
        }
        verdict
    }

    /// Returns true only for `Allow`.
    pub fn is_allowed(&self) -> bool {
        *self == Access::Allow
    }

    /// Returns true only for `Deny`.
    pub fn is_denied(&self) -> bool {
        *self == Access::Deny
    }

    /// Get the string representation of the verdict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Deny => "deny",
            Access::Allow => "allow",
            Access::Inherit => "inherit",
        }
    }

    /// Parse a verdict from its string representation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deny" => Some(Access::Deny),
            "allow" => Some(Access::Allow),
            "inherit" => Some(Access::Inherit),
            _ => None,
        }
    }

    /// Encoding of the verdict in a persisted row.
    ///
    /// # Returns
    ///
    /// `Some(0)` for `Deny`, `Some(1)` for `Allow`, `None` for `Inherit`
    pub fn to_stored(&self) -> Option<i16> {
        match self {
            Access::Deny => Some(0),
            Access::Allow => Some(1),
            Access::Inherit => None,
        }
    }

    /// Decode a persisted value.
    ///
    /// Any value other than `0` or `1` means the row was written by something
    /// else and is reported as a storage error.
    pub fn from_stored(value: i16) -> RulesResult<Self> {
        match value {
            0 => Ok(Access::Deny),
            1 => Ok(Access::Allow),
            other => Err(RulesError::Storage(format!(
                "unexpected stored access value {}",
                other
            ))),
        }
    }
}

impl Default for Access {
    fn default() -> Self {
        Access::Inherit
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_is_inherit() {
        assert_eq!(Access::resolve(Vec::new()), Access::Inherit);
        assert_eq!(Access::resolve([Access::Inherit, Access::Inherit]), Access::Inherit);
    }

    #[test]
    fn test_deny_is_absolute() {
        let mut values = vec![Access::Allow; 50];
        values.push(Access::Deny);
        assert_eq!(Access::resolve(values.clone()), Access::Deny);

        values.reverse();
        assert_eq!(Access::resolve(values), Access::Deny);
    }

    #[test]
    fn test_allow_without_deny() {
        assert_eq!(Access::resolve([Access::Inherit, Access::Allow]), Access::Allow);
        assert_eq!(Access::resolve([Access::Allow]), Access::Allow);
    }

    #[test]
    fn test_precedence_order() {
        assert!(Access::Deny.precedence() > Access::Allow.precedence());
        assert!(Access::Allow.precedence() > Access::Inherit.precedence());
    }

    #[test]
    fn test_stored_encoding() {
        assert_eq!(Access::Deny.to_stored(), Some(0));
        assert_eq!(Access::Allow.to_stored(), Some(1));
        assert_eq!(Access::Inherit.to_stored(), None);

        assert_eq!(Access::from_stored(0).unwrap(), Access::Deny);
        assert_eq!(Access::from_stored(1).unwrap(), Access::Allow);
        assert!(matches!(Access::from_stored(2), Err(RulesError::Storage(_))));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Access::parse("ALLOW"), Some(Access::Allow));
        assert_eq!(Access::parse("deny"), Some(Access::Deny));
        assert_eq!(Access::parse("inherit"), Some(Access::Inherit));
        assert_eq!(Access::parse("maybe"), None);
        assert_eq!(Access::Deny.to_string(), "deny");
    }

    #[test]
    fn test_serde_representation() {
        let json = serde_json::to_string(&Access::Allow).unwrap();
        assert_eq!(json, "\"allow\"");
        let parsed: Access = serde_json::from_str("\"deny\"").unwrap();
        assert_eq!(parsed, Access::Deny);
    }
}
