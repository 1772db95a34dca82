//! Authentication: bearer tokens, password checks and the auth resource.
pub mod handler;
pub mod password;
pub mod token;

use crate::api::error::api_invalid_token;
use crate::api::ApiError;
use token::TokenKeys;
use warden_common::Principal;

/// Principal named by an `Authorization` header value.
///
/// An empty or absent value is the guest. Anything else must be a valid
/// token, optionally prefixed with `Bearer `.
pub fn authenticate(keys: &TokenKeys, header: Option<&str>) -> Result<Principal, ApiError> {
    let raw = header.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(Principal::Guest);
    }
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    keys.verify(token).map(Principal::User).map_err(|err| {
        tracing::debug!(error = %err, "rejected access token");
        api_invalid_token("invalid access token")
    })
}
