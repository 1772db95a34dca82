//! Warden authorization model shared by the dispatch service and its tests.
//!
//! # Purpose
//! Defines the operation kinds a request can ask for, the capability mask
//! stored per (resource, principal), and the rules that combine
//! per-definition defaults with explicit grants.
//!
//! # Key invariants
//! - One capability bit per [`Verb`]; masks never carry undefined bits.
//! - Explicit grants replace defaults, gated by the definition's
//!   [`Inheritance`] switches.
//!
//! # Examples
//! ```rust
//! use warden_authz::{DefaultPermissions, Inheritance, Permissions, Verb};
//! use warden_common::Principal;
//!
//! let defaults = DefaultPermissions::new(
//!     Permissions::from_verbs([Verb::Read, Verb::Update]),
//!     Permissions::from_verbs([Verb::Read]),
//!     Inheritance::default(),
//! );
//! let perms = defaults.effective(&Principal::Guest, None, None);
//! assert!(perms.allows(Verb::Read));
//! assert!(!perms.allows(Verb::Update));
//! ```

mod errors;
mod permission;
mod policy;
mod verb;

pub use errors::{AuthzError, AuthzResult};
pub use permission::Permissions;
pub use policy::{DefaultPermissions, Inheritance};
pub use verb::Verb;
