//! The resource tree and path routing.
//!
//! # Purpose
//! Holds every registered resource as a [`ResourceNode`], keyed by id, and
//! resolves request paths to a node plus the values matched by variable
//! segments along the way.
//!
//! # Routing
//! Paths are split into non-empty segments, each percent-decoded on its own
//! (so an encoded `/` stays inside its segment), and walked from the root. At each
//! node the segment is first looked up among the static children by exact
//! name; only if that misses are the variable children tried, in
//! registration order, and the first whose pattern matches wins. There is no
//! specificity scoring.
//!
//! # Key invariants
//! - The tree is built once by [`ResourceTree::build`] and never mutated, so
//!   request tasks share it without locking.
//! - `root` and `auth` always exist.
//! - Ids are unique across the tree; static names are unique per parent.
use crate::api::ApiError;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;
use warden_authz::{DefaultPermissions, Verb};

mod definition;
mod identifier;
mod validate;

pub use definition::{Handler, HandlerFuture, KindSpec, ResourceDefinition, RootConfig, handler};
pub use identifier::{IdentifierError, ResourceIdentifier};
pub use validate::ConfigError;
pub(crate) use validate::auth_defaults;

use identifier::IdSegment;

pub const ROOT_ID: &str = "root";
pub const AUTH_ID: &str = "auth";

/// Matching rule of a validated node. Only variable nodes carry a pattern.
#[derive(Debug, Clone)]
pub enum ResourceKind {
    Static { name: String },
    Variable { pattern: Regex },
}

pub struct ResourceNode {
    id: String,
    parent: Option<String>,
    kind: ResourceKind,
    handlers: HashMap<Verb, Handler>,
    defaults: DefaultPermissions,
    max_upload_size: Option<usize>,
    static_children: HashMap<String, String>,
    variable_children: Vec<String>,
}

impl ResourceNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn defaults(&self) -> &DefaultPermissions {
        &self.defaults
    }

    pub fn max_upload_size(&self) -> Option<usize> {
        self.max_upload_size
    }

    pub fn handler(&self, verb: Verb) -> Option<&Handler> {
        self.handlers.get(&verb)
    }

    pub fn verbs(&self) -> Vec<Verb> {
        let mut verbs: Vec<Verb> = self.handlers.keys().copied().collect();
        verbs.sort();
        verbs
    }

    fn matches(&self, segment: &str) -> bool {
        match &self.kind {
            ResourceKind::Static { name } => name == segment,
            ResourceKind::Variable { pattern } => pattern.is_match(segment),
        }
    }
}

impl std::fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceNode")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("verbs", &self.verbs())
            .field("static_children", &self.static_children)
            .field("variable_children", &self.variable_children)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no resource matches segment {segment:?} under {node}")]
    ResourceNotFound { segment: String, node: String },
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        crate::api::error::api_not_found(&err.to_string())
    }
}

/// Outcome of routing a path.
#[derive(Debug)]
pub struct RouteMatch<'t> {
    pub node: &'t ResourceNode,
    /// Matched value per variable definition id, in path order.
    pub variables: IndexMap<String, String>,
}

#[derive(Debug)]
pub struct ResourceTree {
    nodes: HashMap<String, ResourceNode>,
    auth_path: String,
}

impl ResourceTree {
    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> &ResourceNode {
        &self.nodes[ROOT_ID]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Path segment the auth resource is mounted at.
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    /// Resolve `path` to a node, static children first.
    pub fn route(&self, path: &str) -> Result<RouteMatch<'_>, RouteError> {
        let mut node = self.root();
        let mut variables = IndexMap::new();
        for raw in path.split('/').filter(|segment| !segment.is_empty()) {
            let Ok(segment) = percent_decode_str(raw).decode_utf8() else {
                return Err(RouteError::ResourceNotFound {
                    segment: raw.to_string(),
                    node: node.id.clone(),
                });
            };
            let segment = segment.as_ref();
            if let Some(child) = node
                .static_children
                .get(segment)
                .and_then(|id| self.nodes.get(id))
            {
                node = child;
                continue;
            }
            let variable = node
                .variable_children
                .iter()
                .filter_map(|id| self.nodes.get(id))
                .find(|child| child.matches(segment));
            match variable {
                Some(child) => {
                    variables.insert(child.id.clone(), segment.to_string());
                    node = child;
                }
                None => {
                    return Err(RouteError::ResourceNotFound {
                        segment: segment.to_string(),
                        node: node.id.clone(),
                    });
                }
            }
        }
        Ok(RouteMatch { node, variables })
    }

    /// Build the instance of `definition_id` addressed by `values`.
    ///
    /// Every variable definition between the root and `definition_id` needs
    /// a value, and each value must satisfy that definition's pattern.
    pub fn identifier(
        &self,
        definition_id: &str,
        values: &IndexMap<String, String>,
    ) -> Result<ResourceIdentifier, IdentifierError> {
        let mut path = Vec::new();
        let mut current = self
            .nodes
            .get(definition_id)
            .ok_or_else(|| IdentifierError::UnknownDefinition(definition_id.to_string()))?;
        while let Some(parent) = current.parent.as_deref() {
            let segment = match &current.kind {
                ResourceKind::Static { name } => IdSegment {
                    id: current.id.clone(),
                    name: name.clone(),
                    value: None,
                },
                ResourceKind::Variable { pattern } => {
                    let value = values
                        .get(&current.id)
                        .ok_or_else(|| IdentifierError::MissingValue(current.id.clone()))?;
                    if !pattern.is_match(value) {
                        return Err(IdentifierError::ValueMismatch {
                            id: current.id.clone(),
                            value: value.clone(),
                        });
                    }
                    IdSegment {
                        id: current.id.clone(),
                        name: String::new(),
                        value: Some(value.clone()),
                    }
                }
            };
            path.push(segment);
            current = self
                .nodes
                .get(parent)
                .ok_or_else(|| IdentifierError::UnknownDefinition(parent.to_string()))?;
        }
        path.reverse();
        Ok(ResourceIdentifier::from_segments(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Reply;

    fn ok_handler() -> Handler {
        handler(|_, _, _| async { Ok(Reply::json()) })
    }

    fn scenario_tree() -> ResourceTree {
        ResourceTree::build(
            RootConfig::default(),
            "auth",
            vec![
                ResourceDefinition::fixed("items", "items").on(Verb::Read, ok_handler()),
                ResourceDefinition::variable("item", "^[0-9]+$").parent("items"),
                ResourceDefinition::fixed("latest", "latest").parent("items"),
                ResourceDefinition::variable("slug", "^[a-z0-9]+$").parent("items"),
            ],
        )
        .expect("valid tree")
    }

    #[test]
    fn routes_numeric_segment_to_variable_child() {
        let tree = scenario_tree();
        let matched = tree.route("/items/42").expect("route");
        assert_eq!(matched.node.id(), "item");
        assert_eq!(matched.variables.get("item").map(String::as_str), Some("42"));
        assert_eq!(matched.variables.len(), 1);
    }

    #[test]
    fn unmatched_segment_names_segment_and_node() {
        let tree = scenario_tree();
        let err = tree.route("/items/ABC").unwrap_err();
        assert_eq!(
            err,
            RouteError::ResourceNotFound {
                segment: "ABC".to_string(),
                node: "items".to_string()
            }
        );
        assert!(tree.route("/nothing").is_err());
    }

    #[test]
    fn static_child_beats_matching_variable() {
        let tree = scenario_tree();
        let matched = tree.route("/items/latest").expect("route");
        assert_eq!(matched.node.id(), "latest");
        assert!(matched.variables.is_empty());
    }

    #[test]
    fn segments_are_percent_decoded_before_matching() {
        let tree = ResourceTree::build(
            RootConfig::default(),
            "auth",
            vec![
                ResourceDefinition::fixed("names", "names"),
                ResourceDefinition::variable("name", "^[a-z /]+$").parent("names"),
            ],
        )
        .expect("valid tree");

        let matched = tree.route("/names/hello%20world").expect("route");
        assert_eq!(matched.node.id(), "name");
        assert_eq!(
            matched.variables.get("name").map(String::as_str),
            Some("hello world")
        );

        let matched = tree.route("/%6Eames/a%2Fb").expect("route");
        assert_eq!(matched.variables.get("name").map(String::as_str), Some("a/b"));

        let err = tree.route("/names/%FF%FE").unwrap_err();
        assert_eq!(
            err,
            RouteError::ResourceNotFound {
                segment: "%FF%FE".to_string(),
                node: "names".to_string()
            }
        );
    }

    #[test]
    fn first_registered_variable_wins() {
        let tree = scenario_tree();
        assert_eq!(tree.route("/items/7").expect("route").node.id(), "item");
        assert_eq!(tree.route("/items/abc").expect("route").node.id(), "slug");
    }

    #[test]
    fn routing_is_deterministic_and_ignores_empty_segments() {
        let tree = scenario_tree();
        for _ in 0..5 {
            let matched = tree.route("//items///42/").expect("route");
            assert_eq!(matched.node.id(), "item");
            assert_eq!(matched.variables.get("item").map(String::as_str), Some("42"));
        }
        assert_eq!(tree.route("/").expect("root").node.id(), ROOT_ID);
        assert_eq!(tree.route("").expect("root").node.id(), ROOT_ID);
    }

    #[test]
    fn auth_resource_is_mounted_under_root() {
        let tree = scenario_tree();
        assert_eq!(tree.route("/auth").expect("route").node.id(), AUTH_ID);
    }

    #[test]
    fn identifier_from_route_match() {
        let tree = scenario_tree();
        let matched = tree.route("/items/42").expect("route");
        let id = tree
            .identifier(matched.node.id(), &matched.variables)
            .expect("identifier");
        assert_eq!(id.serialize(), "item/42");
        assert_eq!(id.url(), "/items/42");
        assert_eq!(id.to_string(), "/items/item(42)");
    }

    #[test]
    fn identifier_requires_valid_values() {
        let tree = scenario_tree();
        let empty = IndexMap::new();
        assert_eq!(
            tree.identifier("item", &empty),
            Err(IdentifierError::MissingValue("item".to_string()))
        );
        let mut bad = IndexMap::new();
        bad.insert("item".to_string(), "x".to_string());
        assert!(matches!(
            tree.identifier("item", &bad),
            Err(IdentifierError::ValueMismatch { .. })
        ));
        assert!(matches!(
            tree.identifier("missing", &empty),
            Err(IdentifierError::UnknownDefinition(_))
        ));
        assert!(tree.identifier(ROOT_ID, &empty).expect("root").is_root());
    }

    #[test]
    fn handler_table_reports_registered_verbs() {
        let tree = scenario_tree();
        let items = tree.get("items").expect("items");
        assert!(items.handler(Verb::Read).is_some());
        assert!(items.handler(Verb::Delete).is_none());
        assert_eq!(items.verbs(), vec![Verb::Read]);
    }
}
