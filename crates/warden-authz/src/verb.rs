use crate::AuthzError;
use serde::{Deserialize, Serialize};

/// Operation kind a request asks for. Each verb maps 1:1 to a capability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
    Patch,
    ReadHeaders,
    ReadOptions,
    Purge,
    Copy,
    Move,
    Link,
    Unlink,
    Lock,
    Unlock,
    ReadProperties,
    UpdateProperties,
    CreateCollection,
}

impl Verb {
    pub const ALL: [Verb; 17] = [
        Verb::Create,
        Verb::Read,
        Verb::Update,
        Verb::Delete,
        Verb::Patch,
        Verb::ReadHeaders,
        Verb::ReadOptions,
        Verb::Purge,
        Verb::Copy,
        Verb::Move,
        Verb::Link,
        Verb::Unlink,
        Verb::Lock,
        Verb::Unlock,
        Verb::ReadProperties,
        Verb::UpdateProperties,
        Verb::CreateCollection,
    ];

    /// Map a wire method to its operation kind.
    ///
    /// Unknown methods yield `None`; callers treat that as a kind no
    /// permission set can grant.
    pub fn classify(method: &str) -> Option<Verb> {
        match method {
            "POST" => Some(Verb::Create),
            "GET" => Some(Verb::Read),
            "PUT" => Some(Verb::Update),
            "DELETE" => Some(Verb::Delete),
            "PATCH" => Some(Verb::Patch),
            "HEAD" => Some(Verb::ReadHeaders),
            "OPTIONS" => Some(Verb::ReadOptions),
            "PURGE" => Some(Verb::Purge),
            "COPY" => Some(Verb::Copy),
            "MOVE" => Some(Verb::Move),
            "LINK" => Some(Verb::Link),
            "UNLINK" => Some(Verb::Unlink),
            "LOCK" => Some(Verb::Lock),
            "UNLOCK" => Some(Verb::Unlock),
            "PROPFIND" => Some(Verb::ReadProperties),
            "PROPPATCH" => Some(Verb::UpdateProperties),
            "MKCOL" => Some(Verb::CreateCollection),
            _ => None,
        }
    }

    /// Wire method that classifies to this verb.
    pub fn method(self) -> &'static str {
        match self {
            Verb::Create => "POST",
            Verb::Read => "GET",
            Verb::Update => "PUT",
            Verb::Delete => "DELETE",
            Verb::Patch => "PATCH",
            Verb::ReadHeaders => "HEAD",
            Verb::ReadOptions => "OPTIONS",
            Verb::Purge => "PURGE",
            Verb::Copy => "COPY",
            Verb::Move => "MOVE",
            Verb::Link => "LINK",
            Verb::Unlink => "UNLINK",
            Verb::Lock => "LOCK",
            Verb::Unlock => "UNLOCK",
            Verb::ReadProperties => "PROPFIND",
            Verb::UpdateProperties => "PROPPATCH",
            Verb::CreateCollection => "MKCOL",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Patch => "patch",
            Verb::ReadHeaders => "read_headers",
            Verb::ReadOptions => "read_options",
            Verb::Purge => "purge",
            Verb::Copy => "copy",
            Verb::Move => "move",
            Verb::Link => "link",
            Verb::Unlink => "unlink",
            Verb::Lock => "lock",
            Verb::Unlock => "unlock",
            Verb::ReadProperties => "read_properties",
            Verb::UpdateProperties => "update_properties",
            Verb::CreateCollection => "create_collection",
        }
    }

    /// Bit position of this verb's capability in a permission mask.
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verb {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == value)
            .ok_or_else(|| AuthzError::InvalidVerb(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::Verb;

    #[test]
    fn verb_string_roundtrip() {
        for verb in Verb::ALL {
            let as_str = verb.as_str();
            assert_eq!(<Verb as std::str::FromStr>::from_str(as_str).ok(), Some(verb));
            assert_eq!(verb.to_string(), as_str);
        }
    }

    #[test]
    fn verb_from_str_invalid() {
        assert!(<Verb as std::str::FromStr>::from_str("write").is_err());
    }

    #[test]
    fn classify_maps_every_method_back() {
        for verb in Verb::ALL {
            assert_eq!(Verb::classify(verb.method()), Some(verb));
        }
    }

    #[test]
    fn classify_webdav_methods() {
        assert_eq!(Verb::classify("PROPFIND"), Some(Verb::ReadProperties));
        assert_eq!(Verb::classify("PROPPATCH"), Some(Verb::UpdateProperties));
        assert_eq!(Verb::classify("MKCOL"), Some(Verb::CreateCollection));
    }

    #[test]
    fn classify_unknown_method() {
        assert_eq!(Verb::classify("TRACE"), None);
        assert_eq!(Verb::classify("get"), None);
    }

    #[test]
    fn bits_are_distinct_and_low() {
        let mut seen = 0u32;
        for verb in Verb::ALL {
            assert_eq!(seen & verb.bit(), 0);
            seen |= verb.bit();
        }
        assert_eq!(seen, (1 << 17) - 1);
    }
}
