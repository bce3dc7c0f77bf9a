//! # Platform Rules (Role-Based Resource Access Rules)
//!
//! This crate decides whether a caller may perform an operation on a resource,
//! based on the access rules attached to the caller's roles. It is shared across
//! Verity, NoteMan, and ShipCheck service layers, which call it before every
//! guarded action.
//!
//! ## Overview
//!
//! The platform-rules crate handles:
//! - **Rules**: `(role, resource, operation) → Allow | Deny`, absence meaning `Inherit`
//! - **Resources**: Hierarchical identifiers with trailing-wildcard patterns
//! - **Resolver**: Precedence fold over every matching rule of every role
//! - **Grant Manager**: Atomic batch mutation and administrative listing
//! - **Rule Store**: Persistence contract with in-memory and PostgreSQL backends
//!
//! ## Architecture
//!
//! ```text
//! caller ─→ Resolver::is_allowed(roles, resource, operation)
//!              └─→ RuleStore::rules_for ─→ Access::resolve ─→ Deny | Allow | Inherit
//!
//! caller ─→ GrantManager::grant_by_resource / grant / delete
//!              └─→ RuleStore::apply (one transaction)
//! ```
//!
//! ## Precedence
//!
//! - Any matching `Deny` wins, whichever role it comes from
//! - Otherwise any matching `Allow` wins
//! - Otherwise the verdict is `Inherit`, and the caller applies its own default
//!
//! ## Features
//!
//! - default: In-memory store for single-process apps and tests
//! - `postgres`: PostgreSQL store on `sqlx`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use platform_rules::{Access, GrantManager, MemoryRuleStore, Resolver, RoleId, RuleStore};
//!
//! async fn example() -> Result<(), platform_rules::RulesError> {
//!     let store: Arc<dyn RuleStore> = Arc::new(MemoryRuleStore::new());
//!     let grants = GrantManager::new(store.clone());
//!     let resolver = Resolver::new(store);
//!
//!     grants
//!         .grant_by_resource(RoleId(10), "compose:record:42", &["read"], Access::Allow)
//!         .await?;
//!     assert_eq!(
//!         resolver.is_allowed(&[RoleId(10), RoleId(11)], "compose:record:42", "read").await,
//!         Access::Allow
//!     );
//!
//!     grants
//!         .grant_by_resource(RoleId(11), "compose:*", &["read"], Access::Deny)
//!         .await?;
//!     assert_eq!(
//!         resolver.is_allowed(&[RoleId(10), RoleId(11)], "compose:record:42", "read").await,
//!         Access::Deny
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Handling
//!
//! [`Resolver::is_allowed`] fails closed: a validation error, storage error or
//! timeout yields `Deny`. [`Resolver::check`] returns the same decision as a
//! `Result`, so callers can tell "denied by policy" from "could not evaluate".

pub mod access;
pub mod config;
pub mod error;
pub mod grants;
pub mod identity;
pub mod resolver;
pub mod resources;
pub mod rule;
pub mod store;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types for convenience
pub use access::Access;
pub use config::{ConfigError, RulesConfig};
pub use error::{RulesError, RulesResult};
pub use grants::GrantManager;
pub use identity::{Identity, Principal};
pub use resolver::Resolver;
pub use resources::Resource;
pub use rule::{RoleId, Rule, RuleChange, RuleKey};
pub use store::{MemoryRuleStore, ResourceFilter, RuleStore};

#[cfg(feature = "postgres")]
pub use config::PostgresConfig;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRuleStore;
