//! Effective permissions for one (resource instance, principal) pair.
//!
//! # Steps
//! 1. Look up the instance's owner. A missing owner is normal and means no
//!    owner contribution.
//! 2. Ask the definition's defaults whether an explicit grant could matter
//!    for this principal; only then look the grant up.
//! 3. Overlay the grant on the defaults (`DefaultPermissions::effective`).
//!
//! # Key invariants
//! - A store failure during either lookup is a [`ResolveError::Database`],
//!   never "no owner" or "no grant".
//! - Guests never trigger a grant lookup.
use crate::providers::{ProviderError, Providers};
use crate::tree::ResourceIdentifier;
use thiserror::Error;
use warden_authz::{DefaultPermissions, Permissions};
use warden_common::Principal;
use warden_common::ids::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub permissions: Permissions,
    pub owner: Option<Identifier>,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown resource definition {0}")]
    UnknownDefinition(String),
    #[error("database failure resolving {resource}: {source}")]
    Database {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
}

pub struct PermissionResolver<'a> {
    providers: &'a Providers,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(providers: &'a Providers) -> Self {
        Self { providers }
    }

    pub async fn resolve(
        &self,
        defaults: &DefaultPermissions,
        resource: &ResourceIdentifier,
        principal: &Principal,
    ) -> Result<Resolution, ResolveError> {
        let key = resource.serialize();
        let database = |err: ProviderError| match err {
            ProviderError::Database(source) => ResolveError::Database {
                resource: resource.to_string(),
                source,
            },
            ProviderError::NotFound(what) => ResolveError::Database {
                resource: resource.to_string(),
                source: anyhow::anyhow!("unexpected not found: {what}"),
            },
        };

        let owner = match self.providers.owners.owner_of(&key).await {
            Ok(owner) => Some(owner),
            Err(ProviderError::NotFound(_)) => None,
            Err(err) => return Err(database(err)),
        };

        let grant = match principal {
            Principal::User(id) if defaults.grant_applies(principal, owner.as_ref()) => self
                .providers
                .grants
                .find(&key, id)
                .await
                .map_err(database)?,
            _ => None,
        };

        let permissions = defaults.effective(principal, owner.as_ref(), grant);
        tracing::debug!(
            resource = %resource,
            principal = %principal,
            permissions = %permissions,
            "permissions resolved"
        );
        Ok(Resolution { permissions, owner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::store::AccessStore;
    use crate::store::memory::InMemoryStore;
    use crate::tree::{ResourceDefinition, ResourceTree, RootConfig};
    use indexmap::IndexMap;
    use std::sync::Arc;
    use warden_authz::{Inheritance, Verb};

    struct Fixture {
        store: Arc<InMemoryStore>,
        providers: Providers,
        resource: ResourceIdentifier,
        owner: Identifier,
    }

    async fn fixture() -> Fixture {
        let tree = ResourceTree::build(
            RootConfig::default(),
            "auth",
            vec![
                ResourceDefinition::fixed("items", "items"),
                ResourceDefinition::variable("item", "^[0-9]+$").parent("items"),
            ],
        )
        .expect("tree");
        let mut values = IndexMap::new();
        values.insert("item".to_string(), "1".to_string());
        let resource = tree.identifier("item", &values).expect("identifier");

        let store = Arc::new(InMemoryStore::new());
        let owner = Identifier::generate();
        store
            .register_resource(&resource.serialize(), Some(&owner))
            .await
            .expect("register");
        let providers = Providers::new(store.clone(), &CacheConfig::default());
        Fixture {
            store,
            providers,
            resource,
            owner,
        }
    }

    fn defaults(inheritance: Inheritance) -> DefaultPermissions {
        DefaultPermissions::new(
            Permissions::from_verbs([Verb::Read, Verb::Update]),
            Permissions::from_verbs([Verb::Read]),
            inheritance,
        )
    }

    fn delete_only() -> Permissions {
        Permissions::from_verbs([Verb::Delete])
    }

    #[tokio::test]
    async fn owner_grant_ignored_without_owner_switch() {
        let fx = fixture().await;
        fx.store
            .set_grant(&fx.resource.serialize(), &fx.owner, delete_only())
            .await
            .expect("grant");
        let resolver = PermissionResolver::new(&fx.providers);
        let defaults = defaults(Inheritance {
            owner: false,
            user_permissions: true,
            other_user_permissions: true,
            guest_permissions: true,
        });

        let resolution = resolver
            .resolve(&defaults, &fx.resource, &Principal::User(fx.owner))
            .await
            .expect("resolve");
        assert_eq!(resolution.permissions, defaults.user);
        assert_eq!(resolution.owner, Some(fx.owner));
    }

    #[tokio::test]
    async fn owner_grant_replaces_default_with_owner_switch() {
        let fx = fixture().await;
        fx.store
            .set_grant(&fx.resource.serialize(), &fx.owner, delete_only())
            .await
            .expect("grant");
        let resolver = PermissionResolver::new(&fx.providers);
        let defaults = defaults(Inheritance::open());

        let resolution = resolver
            .resolve(&defaults, &fx.resource, &Principal::User(fx.owner))
            .await
            .expect("resolve");
        assert_eq!(resolution.permissions, delete_only());
    }

    #[tokio::test]
    async fn guest_never_reads_grants() {
        let fx = fixture().await;
        let resolver = PermissionResolver::new(&fx.providers);
        let before = fx.store.reads();
        let resolution = resolver
            .resolve(&defaults(Inheritance::open()), &fx.resource, &Principal::Guest)
            .await
            .expect("resolve");
        assert_eq!(resolution.permissions, Permissions::from_verbs([Verb::Read]));
        // Only the owner lookup reached the store.
        assert_eq!(fx.store.reads(), before + 1);
    }

    #[tokio::test]
    async fn repeat_resolution_is_served_from_cache() {
        let fx = fixture().await;
        let other = Identifier::generate();
        fx.store
            .set_grant(&fx.resource.serialize(), &other, delete_only())
            .await
            .expect("grant");
        let resolver = PermissionResolver::new(&fx.providers);
        let defaults = defaults(Inheritance::open());

        let first = resolver
            .resolve(&defaults, &fx.resource, &Principal::User(other))
            .await
            .expect("resolve");
        let reads = fx.store.reads();
        let second = resolver
            .resolve(&defaults, &fx.resource, &Principal::User(other))
            .await
            .expect("resolve");
        assert_eq!(first, second);
        assert_eq!(fx.store.reads(), reads);
    }

    #[tokio::test]
    async fn unowned_resource_resolves_without_owner() {
        let fx = fixture().await;
        let resolver = PermissionResolver::new(&fx.providers);
        let root = ResourceIdentifier::root();
        let resolution = resolver
            .resolve(
                &defaults(Inheritance::default()),
                &root,
                &Principal::User(Identifier::generate()),
            )
            .await
            .expect("resolve");
        assert_eq!(resolution.owner, None);
        assert!(resolution.permissions.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_a_database_error() {
        let fx = fixture().await;
        fx.store.set_unavailable(true);
        let resolver = PermissionResolver::new(&fx.providers);
        let err = resolver
            .resolve(
                &defaults(Inheritance::open()),
                &fx.resource,
                &Principal::User(fx.owner),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Database { .. }));
    }
}
