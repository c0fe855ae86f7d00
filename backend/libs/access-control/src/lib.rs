//! Permission evaluation over `(action, scope)` pairs
//!
//! ## Core Components
//!
//! - **Permission / ScopesByAction**: a subject's grants, grouped by action
//! - **Evaluator**: boolean tree (`Permission`, `All`, `Any`) checked against grants
//! - **ScopeResolvers**: registry that rewrites attribute scopes
//!   (`datasources:name:prod`) into concrete ones (`datasources:uid:abc`)
//!   before evaluation
//!
//! ## Scope matching
//!
//! A granted scope satisfies a required scope when it is an exact match, or
//! when the grant is a namespace wildcard (`*`, `users:*`, `users:id:*`) and
//! the required scope starts with the wildcard's prefix. Wildcards are
//! namespace prefixes, never globs: `users*` is not a wildcard.
//!
//! ## Usage Example
//!
//! ```rust
//! use access_control::{group_scopes_by_action, Evaluator, Permission};
//!
//! let granted = group_scopes_by_action(&[Permission::new("users:read", "users:*")]);
//!
//! let check = Evaluator::permission("users:read", ["users:id:5"]);
//! assert!(check.evaluate(&granted));
//!
//! let check = Evaluator::permission("teams:read", ["teams:id:1"]);
//! assert!(!check.evaluate(&granted));
//! ```

mod error;
mod evaluator;
mod permission;
mod resolvers;
pub mod scope;

pub use error::ResolutionError;
pub use evaluator::Evaluator;
pub use permission::{group_scopes_by_action, Permission, ScopesByAction};
pub use resolvers::{
    resolver_fn, OrgScopeMutator, ScopeAttributeMutator, ScopeAttributeResolver, ScopeResolvers,
};
pub use scope::ScopeParams;
