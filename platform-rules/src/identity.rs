//! Caller identity
//!
//! Identities and role memberships are resolved outside this crate, once per
//! request. The resolver only needs the resulting role set; this module gives
//! that hand-off a name.

use serde::{Deserialize, Serialize};

use crate::rule::RoleId;

/// An authenticated caller with resolved role memberships.
pub trait Identity: Send + Sync {
    /// Numeric id of the caller.
    fn identity_id(&self) -> u64;

    /// Roles the caller currently belongs to.
    fn roles(&self) -> &[RoleId];
}

/// Plain identity value, as produced by an identity provider.
///
/// # Examples
///
/// ```
/// use platform_rules::{Identity, Principal, RoleId};
///
/// let principal = Principal::new(42, [RoleId(10), RoleId(11)]);
/// assert_eq!(principal.identity_id(), 42);
/// assert_eq!(principal.roles(), &[RoleId(10), RoleId(11)]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Identity id
    pub id: u64,

    /// Role memberships
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl Principal {
    /// Create a principal with the given memberships.
    pub fn new<I>(id: u64, roles: I) -> Self
    where
        I: IntoIterator<Item = RoleId>,
    {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    /// A principal without memberships. Every decision for it is `Inherit`.
    pub fn anonymous(id: u64) -> Self {
        Self { id, roles: Vec::new() }
    }
}

impl Identity for Principal {
    fn identity_id(&self) -> u64 {
        self.id
    }

    fn roles(&self) -> &[RoleId] {
        &self.roles
    }
}
