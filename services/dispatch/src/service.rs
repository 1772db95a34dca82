//! The service aggregate shared by the listener, the pipeline and handlers.
//!
//! # Purpose
//! [`Service`] owns everything a request needs: the frozen resource tree,
//! the store and its caching providers, token keys and the lifecycle state.
//! It is built once by [`ServiceBuilder::build`] and cloned cheaply into
//! every request task.
//!
//! # Startup validation
//! `build` checks the auth settings and every registered resource in one
//! pass and returns all problems found. Nothing binds a socket until it has
//! succeeded.
use crate::api::ApiError;
use crate::auth::handler::auth_read_handler;
use crate::auth::password::{BcryptVerifier, PasswordVerifier, verify_blocking};
use crate::auth::token::TokenKeys;
use crate::config::{AuthConfig, CacheConfig, DEFAULT_MAX_UPLOAD_SIZE, ServiceConfig};
use crate::lifecycle::Lifecycle;
use crate::providers::{ProviderError, ProviderResult, Providers};
use crate::resolver::{PermissionResolver, Resolution, ResolveError};
use crate::store::memory::InMemoryStore;
use crate::store::{AccessStore, StoreResult, UserAccount};
use crate::tree::{
    AUTH_ID, ConfigError, IdentifierError, ResourceDefinition, ResourceIdentifier, ResourceNode,
    ResourceTree, RootConfig, auth_defaults,
};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use warden_authz::Verb;
use warden_common::Principal;
use warden_common::ids::Identifier;

#[derive(Clone)]
pub struct Service(Arc<ServiceState>);

struct ServiceState {
    name: String,
    tree: ResourceTree,
    store: Arc<dyn AccessStore>,
    providers: Providers,
    tokens: TokenKeys,
    token_lifetime: Duration,
    passwords: Arc<dyn PasswordVerifier>,
    lifecycle: Arc<Lifecycle>,
    max_upload_size: usize,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.0.name)
            .field("resources", &self.0.tree.len())
            .field("store", &self.0.store.backend_name())
            .field("state", &self.0.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.0.tree
    }

    pub fn store(&self) -> &Arc<dyn AccessStore> {
        &self.0.store
    }

    pub fn providers(&self) -> &Providers {
        &self.0.providers
    }

    pub fn tokens(&self) -> &TokenKeys {
        &self.0.tokens
    }

    pub fn token_lifetime(&self) -> Duration {
        self.0.token_lifetime
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.0.lifecycle
    }

    /// Principal named by an `Authorization` header value.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Principal, ApiError> {
        crate::auth::authenticate(&self.0.tokens, header)
    }

    pub async fn find_user_by_id(&self, id: &Identifier) -> ProviderResult<UserAccount> {
        self.0.providers.users.find_by_id(id).await
    }

    pub async fn find_user_by_username(&self, username: &str) -> ProviderResult<UserAccount> {
        self.0.providers.users.find_by_username(username).await
    }

    /// Check `password` against a stored hash on the blocking pool.
    pub async fn verify_password(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        verify_blocking(
            self.0.passwords.clone(),
            password.to_string(),
            hash.to_string(),
        )
        .await
    }

    /// Effective permissions of `principal` on `resource`.
    pub async fn resolve_permissions_for(
        &self,
        resource: &ResourceIdentifier,
        principal: &Principal,
    ) -> Result<Resolution, ResolveError> {
        let node = self
            .0
            .tree
            .get(resource.definition_id())
            .ok_or_else(|| ResolveError::UnknownDefinition(resource.definition_id().to_string()))?;
        PermissionResolver::new(&self.0.providers)
            .resolve(node.defaults(), resource, principal)
            .await
    }

    /// Whether `principal` may perform `verb` on `resource`.
    pub async fn allows(
        &self,
        resource: &ResourceIdentifier,
        principal: &Principal,
        verb: Verb,
    ) -> Result<bool, ResolveError> {
        let resolution = self.resolve_permissions_for(resource, principal).await?;
        Ok(resolution.permissions.allows(verb))
    }

    pub fn resource_identifier(
        &self,
        definition_id: &str,
        values: &IndexMap<String, String>,
    ) -> Result<ResourceIdentifier, IdentifierError> {
        self.0.tree.identifier(definition_id, values)
    }

    /// Owner of `resource`, `None` when it has none.
    pub async fn owner_of(&self, resource: &ResourceIdentifier) -> ProviderResult<Option<Identifier>> {
        match self.0.providers.owners.owner_of(&resource.serialize()).await {
            Ok(owner) => Ok(Some(owner)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn health(&self) -> StoreResult<()> {
        self.0.store.health_check().await
    }

    /// Body size limit for requests to `node`.
    pub fn max_upload_size_for(&self, node: &ResourceNode) -> usize {
        node.max_upload_size().unwrap_or(self.0.max_upload_size)
    }
}

/// Collects resources and settings, then validates them all at once.
pub struct ServiceBuilder {
    name: String,
    root: RootConfig,
    definitions: Vec<ResourceDefinition>,
    store: Option<Arc<dyn AccessStore>>,
    auth: AuthConfig,
    caches: CacheConfig,
    passwords: Arc<dyn PasswordVerifier>,
    max_upload_size: usize,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: RootConfig::default(),
            definitions: Vec::new(),
            store: None,
            auth: AuthConfig::default(),
            caches: CacheConfig::default(),
            passwords: Arc::new(BcryptVerifier),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.name.clone())
            .auth(config.auth.clone())
            .caches(config.caches)
            .max_upload_size(config.defaults.max_upload_size)
    }

    pub fn root(mut self, root: RootConfig) -> Self {
        self.root = root;
        self
    }

    /// Register a resource. Parents must be registered before children.
    pub fn resource(mut self, definition: ResourceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Backing store. Defaults to an empty in-memory store.
    pub fn store(mut self, store: Arc<dyn AccessStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn caches(mut self, caches: CacheConfig) -> Self {
        self.caches = caches;
        self
    }

    pub fn password_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.passwords = verifier;
        self
    }

    pub fn max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = bytes;
        self
    }

    pub fn build(self) -> Result<Service, Vec<ConfigError>> {
        let mut errors = Vec::new();

        let tokens = match self.auth.signing_secret.as_deref() {
            None | Some("") => {
                errors.push(ConfigError::InvalidSetting {
                    field: "auth.signing_secret".to_string(),
                    reason: "a signing secret is required".to_string(),
                });
                None
            }
            Some(secret) => match TokenKeys::from_secret(self.auth.algorithm, secret) {
                Ok(keys) => Some(keys),
                Err(err) => {
                    errors.push(ConfigError::InvalidSetting {
                        field: "auth.signing_secret".to_string(),
                        reason: err.to_string(),
                    });
                    None
                }
            },
        };
        if self.auth.token_ttl_secs == 0 {
            errors.push(ConfigError::InvalidSetting {
                field: "auth.token_ttl_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_upload_size == 0 {
            errors.push(ConfigError::InvalidSetting {
                field: "defaults.max_upload_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let auth = ResourceDefinition::fixed(AUTH_ID, self.auth.path.clone())
            .on(Verb::Read, auth_read_handler())
            .defaults(auth_defaults());
        let tree = match ResourceTree::build_with_auth(self.root, auth, self.definitions) {
            Ok(tree) => Some(tree),
            Err(tree_errors) => {
                errors.extend(tree_errors);
                None
            }
        };

        let (Some(tree), Some(tokens), true) = (tree, tokens, errors.is_empty()) else {
            for error in &errors {
                tracing::error!(error = %error, "invalid service configuration");
            }
            return Err(errors);
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let providers = Providers::new(store.clone(), &self.caches);
        tracing::info!(
            service = %self.name,
            resources = tree.len(),
            store = store.backend_name(),
            auth_path = tree.auth_path(),
            "service configuration validated"
        );
        Ok(Service(Arc::new(ServiceState {
            name: self.name,
            tree,
            store,
            providers,
            tokens,
            token_lifetime: Duration::from_secs(self.auth.token_ttl_secs),
            passwords: self.passwords,
            lifecycle: Lifecycle::new(),
            max_upload_size: self.max_upload_size,
        })))
    }
}
