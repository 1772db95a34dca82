//! Concrete resource instances.
//!
//! A [`ResourceIdentifier`] is the path from the root to one resource
//! instance: one segment per definition, with the matched value attached to
//! every variable segment. It is built per request and thrown away afterwards.
//!
//! Renderings for `/items/42` where `item` is a variable child of `items`:
//! - `definition_id()` is `item`
//! - `serialize()` is `item/42`, the leaf id followed by each variable value;
//!   this is the key used by the store and the caches
//! - `url()` is `/items/42`
//! - `Display` is `/items/item(42)`
//!
//! The root instance has an empty path; it serializes as `root` and renders
//! as `/`.
use super::ROOT_ID;
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IdSegment {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    path: Vec<IdSegment>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("unknown resource definition {0}")]
    UnknownDefinition(String),
    #[error("no value supplied for variable resource {0}")]
    MissingValue(String),
    #[error("value {value:?} does not match variable resource {id}")]
    ValueMismatch { id: String, value: String },
    #[error("root has no parent")]
    NoParent,
}

impl ResourceIdentifier {
    pub(crate) fn from_segments(path: Vec<IdSegment>) -> Self {
        Self { path }
    }

    pub fn root() -> Self {
        Self::default()
    }

    /// Id of the definition this instance belongs to.
    pub fn definition_id(&self) -> &str {
        self.path
            .last()
            .map(|segment| segment.id.as_str())
            .unwrap_or(ROOT_ID)
    }

    /// Matched value for every variable segment, in path order.
    pub fn variable_values(&self) -> IndexMap<String, String> {
        self.path
            .iter()
            .filter_map(|segment| {
                segment
                    .value
                    .as_ref()
                    .map(|value| (segment.id.clone(), value.clone()))
            })
            .collect()
    }

    pub fn variable(&self, id: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|segment| segment.id == id)
            .and_then(|segment| segment.value.as_deref())
    }

    /// Request path that addresses this instance.
    pub fn url(&self) -> String {
        if self.path.is_empty() {
            return "/".to_string();
        }
        let mut url = String::new();
        for segment in &self.path {
            url.push('/');
            url.push_str(segment.value.as_deref().unwrap_or(&segment.name));
        }
        url
    }

    /// Storage and cache key for this instance.
    pub fn serialize(&self) -> String {
        let Some(leaf) = self.path.last() else {
            return ROOT_ID.to_string();
        };
        let mut key = leaf.id.clone();
        for value in self.path.iter().filter_map(|segment| segment.value.as_deref()) {
            key.push('/');
            key.push_str(value);
        }
        key
    }

    pub fn parent(&self) -> Result<ResourceIdentifier, IdentifierError> {
        match self.path.split_last() {
            Some((_, parent)) => Ok(Self {
                path: parent.to_vec(),
            }),
            None => Err(IdentifierError::NoParent),
        }
    }

    pub fn has_parent(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.path {
            write!(f, "/{}", segment.id)?;
            if let Some(value) = &segment.value {
                write!(f, "({value})")?;
            }
        }
        Ok(())
    }
}
