//! The auth resource's read handler: trade a username and password for a
//! bearer token.
//!
//! Responses:
//! - `200 {"data": {"access-token": "...", "life-time": <seconds>}}`
//! - `400 NO_USERNAME` / `400 NO_PASSWORD` when a field is missing or empty
//! - `403 ACCESS_DENIED` for an unknown username and for a wrong password
//!   alike; an unknown username still pays for one bcrypt check so both
//!   take about as long
use crate::api::error::{ACCESS_DENIED, api_client_error};
use crate::api::{ApiError, Reply};
use crate::providers::ProviderError;
use crate::tree::{Handler, handler};
use axum::http::StatusCode;

const WRONG_CREDENTIALS: &str = "wrong username or password";

/// Cost-12 bcrypt hash checked when no account matches the username.
pub(crate) const UNKNOWN_ACCOUNT_HASH: &str =
    "$2b$12$lHTefkAhFfn2.UokeJbaDuEQvH5y3i5pFM2PfemwF9/GNI4O7rZR.";

fn wrong_credentials() -> Reply {
    ApiError::new(StatusCode::FORBIDDEN, ACCESS_DENIED, WRONG_CREDENTIALS).into()
}

pub fn auth_read_handler() -> Handler {
    handler(|_principal, request, service| async move {
        let Some(username) = request.data("username").filter(|value| !value.is_empty()) else {
            return Ok(api_client_error("NO_USERNAME", "missing username argument").into());
        };
        let Some(password) = request.data("password").filter(|value| !value.is_empty()) else {
            return Ok(api_client_error("NO_PASSWORD", "missing password argument").into());
        };

        let account = match service.find_user_by_username(username).await {
            Ok(account) => account,
            Err(ProviderError::NotFound(_)) => {
                let _ = service
                    .verify_password(password, UNKNOWN_ACCOUNT_HASH)
                    .await?;
                tracing::debug!("auth attempt for unknown username");
                return Ok(wrong_credentials());
            }
            Err(err) => return Err(err.into()),
        };
        if !service
            .verify_password(password, &account.password_hash)
            .await?
        {
            tracing::debug!(principal = %account.id, "auth attempt with wrong password");
            return Ok(wrong_credentials());
        }

        let lifetime = service.token_lifetime();
        let token = service.tokens().mint(&account.id, lifetime)?;
        tracing::info!(principal = %account.id, "access token issued");
        Ok(Reply::json()
            .data("access-token", token)
            .data("life-time", lifetime.as_secs()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_hash_is_a_checkable_bcrypt_hash() {
        assert!(UNKNOWN_ACCOUNT_HASH.starts_with("$2b$12$"));
        assert!(matches!(
            bcrypt::verify("anything", UNKNOWN_ACCOUNT_HASH),
            Ok(false)
        ));
    }
}
