//! # Resources
//!
//! Resource identifiers live in a hierarchical, colon-separated namespace such as
//! `compose:record:42`. An identifier may end in a single `*`, turning it into a
//! pattern that stands for "this prefix and everything under it".
//!
//! Matching is a plain prefix comparison once the trailing `*` is stripped. It is
//! not a glob: `compose:rec*` matches `compose:record:42` as well.

use serde::{Deserialize, Serialize};

use crate::error::{RulesError, RulesResult};

/// The wildcard marker. Only one is allowed per identifier, and only at the end.
pub const WILDCARD: char = '*';

/// A validated resource identifier or trailing-wildcard pattern.
///
/// # Example
///
/// ```
/// use platform_rules::Resource;
///
/// let pattern = Resource::parse("compose:*").unwrap();
/// assert!(pattern.is_wildcard());
/// assert_eq!(pattern.prefix(), "compose:");
/// assert!(pattern.covers("compose:record:42"));
/// assert!(!pattern.covers("system:user:1"));
///
/// assert!(Resource::parse("compose:*:42").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resource(String);

impl Resource {
    /// Parse and validate a resource identifier.
    ///
    /// # Errors
    ///
    /// `RulesError::Validation` when the identifier is empty, contains more than
    /// one `*`, or contains a `*` anywhere but the last position.
    pub fn parse(s: impl Into<String>) -> RulesResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(RulesError::Validation("resource must not be empty".to_string()));
        }

        match s.matches(WILDCARD).count() {
            0 => {}
            1 if s.ends_with(WILDCARD) => {}
            1 => {
                return Err(RulesError::Validation(format!(
                    "wildcard must be the last character of resource {:?}",
                    s
                )))
            }
            _ => {
                return Err(RulesError::Validation(format!(
                    "resource {:?} contains more than one wildcard",
                    s
                )))
            }
        }

        Ok(Self(s))
    }

    /// The identifier as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier ends in the wildcard marker.
    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with(WILDCARD)
    }

    /// The literal prefix: the identifier without its trailing `*`.
    ///
    /// A literal identifier is its own prefix.
    pub fn prefix(&self) -> &str {
        self.0.strip_suffix(WILDCARD).unwrap_or(&self.0)
    }

    /// Check whether a rule stored on this identifier applies to a literal resource.
    ///
    /// Literal identifiers require equality. Patterns require `resource` to start
    /// with the pattern's prefix.
    pub fn covers(&self, resource: &str) -> bool {
        if self.is_wildcard() {
            resource.starts_with(self.prefix())
        } else {
            self.0 == resource
        }
    }

    /// Check whether a rule stored on this identifier is a candidate for `query`.
    ///
    /// For a literal query this is [`Resource::covers`]. For a wildcard query the
    /// stored rule is a candidate when it sits under the query's prefix, or when it
    /// is itself a pattern broad enough to cover the whole query prefix.
    pub fn applies_to(&self, query: &Resource) -> bool {
        if !query.is_wildcard() {
            return self.covers(query.as_str());
        }

        self.falls_under(query) || (self.is_wildcard() && query.prefix().starts_with(self.prefix()))
    }

    /// Check whether this identifier sits under `pattern`'s prefix.
    ///
    /// Used for administrative listings: `compose:*` lists `compose:record:1` and
    /// `compose:module:*`, but not `system:*`.
    pub fn falls_under(&self, pattern: &Resource) -> bool {
        self.prefix().starts_with(pattern.prefix())
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Resource {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Resource {
    type Error = RulesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Resource {
    type Error = RulesError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Resource> for String {
    fn from(resource: Resource) -> Self {
        resource.0
    }
}

impl AsRef<str> for Resource {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an operation name such as `read` or `update`.
///
/// # Errors
///
/// `RulesError::Validation` when the name is empty or contains the wildcard marker.
pub fn validate_operation(operation: &str) -> RulesResult<()> {
    if operation.is_empty() {
        return Err(RulesError::Validation("operation must not be empty".to_string()));
    }
    if operation.contains(WILDCARD) {
        return Err(RulesError::Validation(format!(
            "operation {:?} must not contain a wildcard",
            operation
        )));
    }
    Ok(())
}
