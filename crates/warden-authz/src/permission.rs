//! Capability sets.
//!
//! # Purpose
//! A [`Permissions`] value is the set of verbs a principal may perform on one
//! resource instance. It is stored as a 17-bit mask, one bit per [`Verb`].
//!
//! # Key invariants
//! - Bits above [`Permissions::MASK`] are always zero, whatever mask was
//!   read from storage.
//! - `Permissions::from_mask(p.mask()) == p` for every set `p`.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Permissions, Verb};
//!
//! let perms = Permissions::from_verbs([Verb::Read, Verb::ReadHeaders]);
//! assert!(perms.allows(Verb::Read));
//! assert!(!perms.allows(Verb::Delete));
//! assert_eq!(Permissions::from_mask(perms.mask()), perms);
//! ```
use crate::{AuthzError, AuthzResult, Verb};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Verb>", into = "Vec<Verb>")]
pub struct Permissions(u32);

impl Permissions {
    /// Mask covering every defined capability bit.
    pub const MASK: u32 = (1 << Verb::ALL.len()) - 1;

    pub const fn none() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(Self::MASK)
    }

    /// Decode a stored mask, dropping any undefined high bits.
    pub fn from_mask(mask: u32) -> Self {
        Self(mask & Self::MASK)
    }

    /// Decode a stored mask, rejecting undefined high bits.
    pub fn try_from_mask(mask: u32) -> AuthzResult<Self> {
        if mask & !Self::MASK != 0 {
            return Err(AuthzError::InvalidMask(mask));
        }
        Ok(Self(mask))
    }

    pub fn mask(self) -> u32 {
        self.0
    }

    pub fn from_verbs(verbs: impl IntoIterator<Item = Verb>) -> Self {
        verbs.into_iter().fold(Self::none(), Self::with)
    }

    #[must_use]
    pub fn with(self, verb: Verb) -> Self {
        Self(self.0 | verb.bit())
    }

    #[must_use]
    pub fn without(self, verb: Verb) -> Self {
        Self(self.0 & !verb.bit())
    }

    pub fn allows(self, verb: Verb) -> bool {
        self.0 & verb.bit() != 0
    }

    /// Capability check for a classified request. Unclassified requests are
    /// never allowed.
    pub fn allows_kind(self, verb: Option<Verb>) -> bool {
        verb.is_some_and(|verb| self.allows(verb))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn verbs(self) -> impl Iterator<Item = Verb> {
        Verb::ALL.into_iter().filter(move |verb| self.allows(*verb))
    }
}

impl From<Vec<Verb>> for Permissions {
    fn from(verbs: Vec<Verb>) -> Self {
        Self::from_verbs(verbs)
    }
}

impl From<Permissions> for Vec<Verb> {
    fn from(perms: Permissions) -> Self {
        perms.verbs().collect()
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.verbs().map(Verb::as_str).collect();
        write!(f, "[{}]", names.join(","))
    }
}
