use super::{
    AUTH_ID, KindSpec, ROOT_ID, ResourceDefinition, ResourceKind, ResourceNode, ResourceTree,
    RootConfig,
};
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use warden_authz::{DefaultPermissions, Inheritance, Permissions, Verb};

/// A startup configuration problem. Any of these keeps the service from
/// starting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("resource id {0:?} is reserved")]
    ReservedIdentifier(String),
    #[error("resource id {0:?} is registered twice")]
    DuplicateIdentifier(String),
    #[error("parent {parent:?} of resource {id:?} is not registered")]
    UnregisteredParent { id: String, parent: String },
    #[error("static name {name:?} is registered twice under {parent:?}")]
    DuplicateStaticName { parent: String, name: String },
    #[error("static name {name:?} under root collides with the auth path")]
    AuthPathOverlap { name: String },
    #[error("resource {id:?} has invalid name {name:?}")]
    InvalidName { id: String, name: String },
    #[error("resource {id:?} has invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        id: String,
        pattern: String,
        reason: String,
    },
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },
}

/// Defaults of the auth resource: anyone may read it.
pub(crate) fn auth_defaults() -> DefaultPermissions {
    let read = Permissions::from_verbs([Verb::Read]);
    DefaultPermissions::new(
        read,
        read,
        Inheritance {
            other_user_permissions: true,
            ..Inheritance::default()
        },
    )
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

impl ResourceTree {
    /// Validate `definitions` in registration order and freeze them into a
    /// tree. The auth resource is mounted at `auth_path` without handlers.
    pub fn build(
        root: RootConfig,
        auth_path: &str,
        definitions: Vec<ResourceDefinition>,
    ) -> Result<Self, Vec<ConfigError>> {
        let auth = ResourceDefinition::fixed(AUTH_ID, auth_path).defaults(auth_defaults());
        Self::build_with_auth(root, auth, definitions)
    }

    /// Like [`ResourceTree::build`] with a fully configured auth resource.
    /// Every problem found is reported, not just the first.
    pub fn build_with_auth(
        root: RootConfig,
        auth: ResourceDefinition,
        definitions: Vec<ResourceDefinition>,
    ) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_ID.to_string(),
            ResourceNode {
                id: ROOT_ID.to_string(),
                parent: None,
                kind: ResourceKind::Static {
                    name: String::new(),
                },
                handlers: root.handlers,
                defaults: root.defaults,
                max_upload_size: root.max_upload_size,
                static_children: HashMap::new(),
                variable_children: Vec::new(),
            },
        );

        let auth_path = match &auth.kind {
            KindSpec::Static { name } => name.clone(),
            KindSpec::Variable { .. } => String::new(),
        };
        let mut tree = Self { nodes, auth_path };
        tree.insert(auth, &mut errors);

        for definition in definitions {
            if definition.id == ROOT_ID || definition.id == AUTH_ID {
                errors.push(ConfigError::ReservedIdentifier(definition.id));
                continue;
            }
            tree.insert(definition, &mut errors);
        }

        if errors.is_empty() {
            Ok(tree)
        } else {
            Err(errors)
        }
    }

    fn insert(&mut self, definition: ResourceDefinition, errors: &mut Vec<ConfigError>) {
        let ResourceDefinition {
            id,
            parent,
            kind,
            handlers,
            defaults,
            max_upload_size,
        } = definition;

        if self.nodes.contains_key(&id) {
            errors.push(ConfigError::DuplicateIdentifier(id));
            return;
        }
        let parent = parent.unwrap_or_else(|| ROOT_ID.to_string());
        let Some(parent_node) = self.nodes.get(&parent) else {
            errors.push(ConfigError::UnregisteredParent { id, parent });
            return;
        };

        let kind = match kind {
            KindSpec::Static { name } => {
                if !valid_name(&name) {
                    errors.push(ConfigError::InvalidName { id, name });
                    return;
                }
                if parent_node.static_children.contains_key(&name) {
                    let overlaps_auth = parent == ROOT_ID && name == self.auth_path;
                    errors.push(if overlaps_auth {
                        ConfigError::AuthPathOverlap { name }
                    } else {
                        ConfigError::DuplicateStaticName { parent, name }
                    });
                    return;
                }
                ResourceKind::Static { name }
            }
            KindSpec::Variable { pattern } => match Regex::new(&pattern) {
                Ok(compiled) => ResourceKind::Variable { pattern: compiled },
                Err(err) => {
                    errors.push(ConfigError::InvalidPattern {
                        id,
                        pattern,
                        reason: err.to_string(),
                    });
                    return;
                }
            },
        };

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            match &kind {
                ResourceKind::Static { name } => {
                    parent_node.static_children.insert(name.clone(), id.clone());
                }
                ResourceKind::Variable { .. } => parent_node.variable_children.push(id.clone()),
            }
        }
        self.nodes.insert(
            id.clone(),
            ResourceNode {
                id,
                parent: Some(parent),
                kind,
                handlers,
                defaults,
                max_upload_size,
                static_children: HashMap::new(),
                variable_children: Vec::new(),
            },
        );
    }
}
