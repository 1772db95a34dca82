//! Startup-time resource registration.
//!
//! A [`ResourceDefinition`] is a template for one addressable entity type:
//! its id, its parent, whether it is matched by a fixed name or a pattern,
//! the handlers it serves per verb, and its default permissions. Definitions
//! are validated and frozen into a [`super::ResourceTree`] before any
//! listener binds.
use crate::api::{Reply, Request};
use crate::service::Service;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use warden_authz::{DefaultPermissions, Verb};
use warden_common::Principal;

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<Reply>> + Send + 'static>>;

/// Request handler registered for one verb on one resource.
pub type Handler = Arc<dyn Fn(Principal, Request, Service) -> HandlerFuture + Send + Sync>;

/// Wrap an async function or closure as a [`Handler`].
///
/// ```rust,no_run
/// use dispatch::api::Reply;
/// use dispatch::tree::handler;
///
/// let list = handler(|_principal, _request, _service| async move {
///     Ok(Reply::json().data("items", Vec::<String>::new()))
/// });
/// # let _ = list;
/// ```
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Principal, Request, Service) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
{
    Arc::new(move |principal, request, service| Box::pin(f(principal, request, service)))
}

/// How a definition is matched against a path segment, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindSpec {
    Static { name: String },
    Variable { pattern: String },
}

#[derive(Clone)]
pub struct ResourceDefinition {
    pub(crate) id: String,
    pub(crate) parent: Option<String>,
    pub(crate) kind: KindSpec,
    pub(crate) handlers: HashMap<Verb, Handler>,
    pub(crate) defaults: DefaultPermissions,
    pub(crate) max_upload_size: Option<usize>,
}

impl ResourceDefinition {
    /// Resource matched by the exact segment `name`.
    pub fn fixed(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id.into(), KindSpec::Static { name: name.into() })
    }

    /// Resource matched by any segment the regular expression `pattern`
    /// accepts. The matched segment is recorded under this definition's id.
    pub fn variable(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            id.into(),
            KindSpec::Variable {
                pattern: pattern.into(),
            },
        )
    }

    fn new(id: String, kind: KindSpec) -> Self {
        Self {
            id,
            parent: None,
            kind,
            handlers: HashMap::new(),
            defaults: DefaultPermissions::default(),
            max_upload_size: None,
        }
    }

    /// Parent definition id. Unset means the tree root.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn on(mut self, verb: Verb, handler: Handler) -> Self {
        self.handlers.insert(verb, handler);
        self
    }

    pub fn defaults(mut self, defaults: DefaultPermissions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Largest accepted request body in bytes. Unset uses the service default.
    pub fn max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = Some(bytes);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &KindSpec {
        &self.kind
    }
}

impl std::fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut verbs: Vec<&Verb> = self.handlers.keys().collect();
        verbs.sort();
        f.debug_struct("ResourceDefinition")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("verbs", &verbs)
            .field("defaults", &self.defaults)
            .field("max_upload_size", &self.max_upload_size)
            .finish()
    }
}

/// Handlers and permissions for the tree root, which cannot be registered
/// like other resources.
#[derive(Clone, Default)]
pub struct RootConfig {
    pub(crate) handlers: HashMap<Verb, Handler>,
    pub(crate) defaults: DefaultPermissions,
    pub(crate) max_upload_size: Option<usize>,
}

impl RootConfig {
    pub fn on(mut self, verb: Verb, handler: Handler) -> Self {
        self.handlers.insert(verb, handler);
        self
    }

    pub fn defaults(mut self, defaults: DefaultPermissions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = Some(bytes);
        self
    }
}
