//! Default permissions and the overlay rules that turn them into an
//! effective capability set.
//!
//! # Purpose
//! Every resource definition carries a [`DefaultPermissions`]: a set for
//! authenticated users, a set for guests, and [`Inheritance`] switches that
//! decide whether explicit per-principal grants may replace those defaults.
//!
//! # Key invariants
//! - Guests always resolve to the guest default; they cannot hold grants.
//! - An explicit grant *replaces* the base set, it is never merged into it.
//! - A grant is only consulted when the matching switch is on: `owner` for
//!   the resource owner, `user_permissions` for every other account.
//! - `other_user_permissions` gates whether a non-owner account without an
//!   applicable grant receives the user default at all.
//!
//! The functions here do no I/O. Callers ask [`DefaultPermissions::grant_applies`]
//! whether a grant lookup is worth doing, then pass whatever they found to
//! [`DefaultPermissions::effective`].
use crate::Permissions;
use serde::{Deserialize, Serialize};
use warden_common::Principal;
use warden_common::ids::Identifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inheritance {
    pub owner: bool,
    pub user_permissions: bool,
    pub other_user_permissions: bool,
    pub guest_permissions: bool,
}

impl Inheritance {
    /// Every switch on.
    pub const fn open() -> Self {
        Self {
            owner: true,
            user_permissions: true,
            other_user_permissions: true,
            guest_permissions: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPermissions {
    pub user: Permissions,
    pub guest: Permissions,
    pub inheritance: Inheritance,
}

impl DefaultPermissions {
    pub fn new(user: Permissions, guest: Permissions, inheritance: Inheritance) -> Self {
        Self {
            user,
            guest,
            inheritance,
        }
    }

    /// Whether an explicit grant held by `principal` can affect the outcome.
    pub fn grant_applies(&self, principal: &Principal, owner: Option<&Identifier>) -> bool {
        match principal {
            Principal::Guest => false,
            Principal::User(id) if owner == Some(id) => self.inheritance.owner,
            Principal::User(_) => self.inheritance.user_permissions,
        }
    }

    /// Effective capabilities for `principal`.
    ///
    /// `grant` is the explicit grant found for the principal, if any. It is
    /// ignored unless [`grant_applies`](Self::grant_applies) holds.
    pub fn effective(
        &self,
        principal: &Principal,
        owner: Option<&Identifier>,
        grant: Option<Permissions>,
    ) -> Permissions {
        let id = match principal {
            Principal::Guest => return self.guest,
            Principal::User(id) => id,
        };
        if let Some(grant) = grant
            && self.grant_applies(principal, owner)
        {
            return grant;
        }
        let is_owner = owner == Some(id);
        if is_owner || self.inheritance.other_user_permissions {
            self.user
        } else {
            Permissions::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Verb;

    fn defaults(inheritance: Inheritance) -> DefaultPermissions {
        DefaultPermissions::new(
            Permissions::from_verbs([Verb::Read, Verb::Update]),
            Permissions::from_verbs([Verb::Read]),
            inheritance,
        )
    }

    fn grant() -> Permissions {
        Permissions::from_verbs([Verb::Delete])
    }

    #[test]
    fn guest_gets_guest_default_and_never_a_grant() {
        let defaults = defaults(Inheritance::open());
        let owner = Identifier::generate();
        assert!(!defaults.grant_applies(&Principal::Guest, Some(&owner)));
        let perms = defaults.effective(&Principal::Guest, Some(&owner), Some(grant()));
        assert_eq!(perms, Permissions::from_verbs([Verb::Read]));
    }

    #[test]
    fn guest_default_applies_with_guest_switch_off() {
        let defaults = defaults(Inheritance::default());
        let perms = defaults.effective(&Principal::Guest, None, None);
        assert!(perms.allows(Verb::Read));
        assert!(!perms.allows(Verb::Update));
    }

    #[test]
    fn owner_grant_replaces_default_when_owner_switch_on() {
        let defaults = defaults(Inheritance {
            owner: true,
            ..Inheritance::default()
        });
        let owner = Identifier::generate();
        let principal = Principal::User(owner);
        assert!(defaults.grant_applies(&principal, Some(&owner)));
        let perms = defaults.effective(&principal, Some(&owner), Some(grant()));
        assert_eq!(perms, grant());
    }

    #[test]
    fn owner_grant_ignored_when_owner_switch_off() {
        let defaults = defaults(Inheritance {
            owner: false,
            user_permissions: true,
            other_user_permissions: true,
            guest_permissions: true,
        });
        let owner = Identifier::generate();
        let principal = Principal::User(owner);
        assert!(!defaults.grant_applies(&principal, Some(&owner)));
        let perms = defaults.effective(&principal, Some(&owner), Some(grant()));
        assert_eq!(perms, defaults.user);
    }

    #[test]
    fn owner_without_grant_gets_user_default_even_when_other_users_are_closed() {
        let defaults = defaults(Inheritance::default());
        let owner = Identifier::generate();
        let perms = defaults.effective(&Principal::User(owner), Some(&owner), None);
        assert_eq!(perms, defaults.user);
    }

    #[test]
    fn other_user_grant_replaces_default_when_user_switch_on() {
        let defaults = defaults(Inheritance {
            user_permissions: true,
            ..Inheritance::default()
        });
        let owner = Identifier::generate();
        let other = Principal::User(Identifier::generate());
        assert!(defaults.grant_applies(&other, Some(&owner)));
        assert_eq!(defaults.effective(&other, Some(&owner), Some(grant())), grant());
    }

    #[test]
    fn other_user_grant_ignored_when_user_switch_off() {
        let defaults = defaults(Inheritance {
            other_user_permissions: true,
            ..Inheritance::default()
        });
        let other = Principal::User(Identifier::generate());
        let perms = defaults.effective(&other, None, Some(grant()));
        assert_eq!(perms, defaults.user);
    }

    #[test]
    fn other_user_without_grant_gated_by_other_user_switch() {
        let open = defaults(Inheritance {
            other_user_permissions: true,
            ..Inheritance::default()
        });
        let closed = defaults(Inheritance::default());
        let other = Principal::User(Identifier::generate());
        assert_eq!(open.effective(&other, None, None), open.user);
        assert_eq!(closed.effective(&other, None, None), Permissions::none());
    }

    #[test]
    fn unowned_resource_treats_every_account_as_non_owner() {
        let defaults = defaults(Inheritance {
            owner: true,
            user_permissions: false,
            other_user_permissions: false,
            guest_permissions: false,
        });
        let principal = Principal::User(Identifier::generate());
        assert!(!defaults.grant_applies(&principal, None));
        assert!(defaults.effective(&principal, None, Some(grant())).is_empty());
    }
}
