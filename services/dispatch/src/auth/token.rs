//! Bearer access tokens.
//!
//! # Purpose
//! Mint and verify the signed tokens the auth resource issues. A token is a
//! JWT whose claims are:
//! - `iss`: the principal identifier as 32 lowercase hex characters
//! - `iat`: issue time, unix seconds
//! - `lft`: lifetime in seconds
//! - `exp`: `iat + lft`
//!
//! # Key invariants
//! - Exactly one algorithm is accepted: the one the keys were built for. A
//!   token whose header names any other algorithm is rejected before any
//!   signature work.
//! - Tokens are checked for shape (three base64url parts, signature length
//!   fixed by the algorithm) before they are handed to `jsonwebtoken`.
//! - HMAC secrets and Ed25519 seeds are never logged.
//!
//! # Examples
//! ```rust
//! use dispatch::auth::token::TokenKeys;
//! use jsonwebtoken::Algorithm;
//! use std::time::Duration;
//! use warden_common::ids::Identifier;
//!
//! let keys = TokenKeys::hmac(Algorithm::HS256, b"secret").expect("keys");
//! let principal = Identifier::generate();
//! let token = keys.mint(&principal, Duration::from_secs(60)).expect("mint");
//! assert_eq!(keys.verify(&token).expect("verify"), principal);
//! ```
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use warden_common::ids::Identifier;

pub const ED25519_SEED_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub iat: i64,
    pub lft: u64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("key error: {0}")]
    Key(String),
    #[error("invalid issuer: {0}")]
    Issuer(String),
}

/// Signing and verification keys for one algorithm.
#[derive(Clone)]
pub struct TokenKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    /// Shared-secret keys for `HS256`, `HS384` or `HS512`.
    pub fn hmac(algorithm: Algorithm, secret: &[u8]) -> Result<Self, TokenError> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::Key(format!(
                "{algorithm:?} is not an HMAC algorithm"
            )));
        }
        if secret.is_empty() {
            return Err(TokenError::Key("signing secret is empty".to_string()));
        }
        Ok(Self {
            algorithm,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// EdDSA keys from a raw 32-byte Ed25519 seed.
    pub fn ed25519(seed: &[u8; ED25519_SEED_LEN]) -> Result<Self, TokenError> {
        let signing_key = Ed25519SigningKey::from_bytes(seed);
        let der = signing_key
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
        Ok(Self {
            algorithm: Algorithm::EdDSA,
            encoding: EncodingKey::from_ed_der(der.as_bytes()),
            decoding: DecodingKey::from_ed_components(&x)?,
        })
    }

    /// Keys from configuration. For EdDSA the secret is the base64url seed.
    pub fn from_secret(algorithm: Algorithm, secret: &str) -> Result<Self, TokenError> {
        match algorithm {
            Algorithm::EdDSA => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(secret.trim_end_matches('='))
                    .map_err(|err| TokenError::Key(format!("decode Ed25519 seed: {err}")))?;
                let seed: [u8; ED25519_SEED_LEN] = bytes.try_into().map_err(|_| {
                    TokenError::Key(format!("Ed25519 seed must be {ED25519_SEED_LEN} bytes"))
                })?;
                Self::ed25519(&seed)
            }
            other => Self::hmac(other, secret.as_bytes()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a token naming `principal` as issuer, valid for `lifetime`.
    pub fn mint(&self, principal: &Identifier, lifetime: Duration) -> Result<String, TokenError> {
        let iat = now_epoch_seconds();
        let lft = lifetime.as_secs();
        let claims = AccessClaims {
            iss: principal.to_string(),
            iat,
            lft,
            exp: iat.saturating_add(i64::try_from(lft).unwrap_or(i64::MAX)),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(self.algorithm),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verify `token` and return its claims.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.check_shape(token)?;
        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Verify `token` and return the principal it was issued to.
    pub fn verify(&self, token: &str) -> Result<Identifier, TokenError> {
        let claims = self.decode(token)?;
        claims
            .iss
            .parse()
            .map_err(|_| TokenError::Issuer(claims.iss.clone()))
    }

    fn check_shape(&self, token: &str) -> Result<(), TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed("expected three dot-separated parts"));
        };
        if header.is_empty() || payload.is_empty() {
            return Err(TokenError::Malformed("empty header or payload"));
        }
        let base64url = |part: &str| {
            part.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        };
        if !(base64url(header) && base64url(payload) && base64url(signature)) {
            return Err(TokenError::Malformed("not base64url"));
        }
        if let Some(expected) = signature_len(self.algorithm)
            && signature.len() != expected
        {
            return Err(TokenError::Malformed("wrong signature length"));
        }
        Ok(())
    }
}

/// Encoded signature length for algorithms with fixed-size signatures.
fn signature_len(algorithm: Algorithm) -> Option<usize> {
    let raw = match algorithm {
        Algorithm::HS256 => 32,
        Algorithm::HS384 => 48,
        Algorithm::HS512 => 64,
        Algorithm::EdDSA => 64,
        _ => return None,
    };
    Some((raw * 4usize).div_ceil(3))
}

fn now_epoch_seconds() -> i64 {
    // A clock before the epoch clamps to zero instead of panicking.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
