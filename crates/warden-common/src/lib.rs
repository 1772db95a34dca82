// Shared data types and small helpers used across crates.
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

pub mod ids {
    use super::{Error, Result};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::str::FromStr;
    use uuid::Uuid;

    /// Byte length of an [`Identifier`].
    pub const IDENTIFIER_BYTES: usize = 16;
    /// Length of the compact hex form produced by `Display`.
    pub const IDENTIFIER_HEX_LEN: usize = 32;

    /// Opaque 128-bit identifier for principals and resources.
    ///
    /// The canonical string form is 32 lowercase hex characters with no
    /// separators. `from_bytes(to_bytes(x)) == x` and
    /// `x.to_string().parse() == Ok(x)` hold for every value.
    ///
    /// ```
    /// use warden_common::ids::Identifier;
    ///
    /// let id = Identifier::generate();
    /// let text = id.to_string();
    /// assert_eq!(text.len(), 32);
    /// assert_eq!(text.parse::<Identifier>().unwrap(), id);
    /// ```
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
    pub struct Identifier(Uuid);

    impl Identifier {
        // Random v4 value; uniqueness is probabilistic.
        pub fn generate() -> Self {
            Self(Uuid::new_v4())
        }

        pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
            let raw: [u8; IDENTIFIER_BYTES] = bytes.try_into().map_err(|_| {
                Error::InvalidIdentifier(format!(
                    "expected {IDENTIFIER_BYTES} bytes, got {}",
                    bytes.len()
                ))
            })?;
            Ok(Self(Uuid::from_bytes(raw)))
        }

        pub fn to_bytes(&self) -> [u8; IDENTIFIER_BYTES] {
            *self.0.as_bytes()
        }

        pub fn as_uuid(&self) -> Uuid {
            self.0
        }
    }

    impl fmt::Display for Identifier {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0.simple())
        }
    }

    impl FromStr for Identifier {
        type Err = Error;

        fn from_str(input: &str) -> Result<Self> {
            if input.len() != IDENTIFIER_HEX_LEN || !input.is_ascii() {
                return Err(Error::InvalidIdentifier(format!(
                    "expected {IDENTIFIER_HEX_LEN} hex characters, got {:?}",
                    input
                )));
            }
            // Reinsert the 8-4-4-4-12 separators so only the hyphenated form
            // is accepted by the parser.
            let hyphenated = format!(
                "{}-{}-{}-{}-{}",
                &input[0..8],
                &input[8..12],
                &input[12..16],
                &input[16..20],
                &input[20..]
            );
            let uuid = Uuid::parse_str(&hyphenated)
                .map_err(|_| Error::InvalidIdentifier(input.into()))?;
            Ok(Self(uuid))
        }
    }

    impl Serialize for Identifier {
        fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Identifier {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
            let text = String::deserialize(deserializer)?;
            text.parse().map_err(serde::de::Error::custom)
        }
    }
}

/// Principal taking part in a request: an authenticated account or the
/// anonymous guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Principal {
    Guest,
    User(ids::Identifier),
}

impl Principal {
    pub fn identifier(&self) -> Option<&ids::Identifier> {
        match self {
            Principal::Guest => None,
            Principal::User(id) => Some(id),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Principal::Guest)
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Guest => f.write_str("guest"),
            Principal::User(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Principal, ids::Identifier};
    use std::str::FromStr;

    #[test]
    fn identifier_string_round_trip() {
        // IDs should serialize and parse without loss.
        let id = Identifier::generate();
        let parsed = Identifier::from_str(&id.to_string()).expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn identifier_bytes_round_trip() {
        let id = Identifier::generate();
        let parsed = Identifier::from_bytes(&id.to_bytes()).expect("bytes");
        assert_eq!(id, parsed);
    }

    #[test]
    fn identifier_string_is_lowercase_hex_without_separators() {
        let id = Identifier::from_bytes(&[0xAB; 16]).expect("bytes");
        assert_eq!(id.to_string(), "ab".repeat(16));
    }

    #[test]
    fn identifier_rejects_wrong_byte_length() {
        let err = Identifier::from_bytes(&[0u8; 15]).unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier(_)));
        assert!(Identifier::from_bytes(&[0u8; 17]).is_err());
    }

    #[test]
    fn identifier_rejects_wrong_length_and_non_hex() {
        assert!(Identifier::from_str("abc").is_err());
        assert!(Identifier::from_str(&"0".repeat(33)).is_err());
        assert!(Identifier::from_str(&"z".repeat(32)).is_err());
        // Hyphenated input is not the canonical form.
        let hyphenated = Identifier::generate().as_uuid().hyphenated().to_string();
        assert!(Identifier::from_str(&hyphenated).is_err());
    }

    #[test]
    fn identifier_accepts_uppercase_hex() {
        let id = Identifier::generate();
        let upper = id.to_string().to_uppercase();
        assert_eq!(Identifier::from_str(&upper).expect("upper"), id);
    }

    #[test]
    fn identifier_serde_uses_compact_string() {
        let id = Identifier::generate();
        let json = serde_json::to_string(&id).expect("json");
        assert_eq!(json, format!("\"{id}\""));
        let back: Identifier = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, id);
    }

    #[test]
    fn principal_reports_identifier() {
        let id = Identifier::generate();
        assert_eq!(Principal::User(id).identifier(), Some(&id));
        assert!(Principal::Guest.identifier().is_none());
        assert!(Principal::Guest.is_guest());
        assert_eq!(Principal::Guest.to_string(), "guest");
    }
}
