//! Password hash verification.
//!
//! Accounts store bcrypt hashes. Verification is CPU-bound, so callers on the
//! async runtime go through [`verify_blocking`], which moves the work to the
//! blocking pool.
use anyhow::Context;
use std::sync::Arc;

pub trait PasswordVerifier: Send + Sync {
    /// Whether `password` matches `hash`. A malformed hash never matches.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptVerifier;

impl PasswordVerifier for BcryptVerifier {
    fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash could not be checked");
                false
            }
        }
    }
}

/// Hash `password` for provisioning an account.
pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(password, cost).context("hash password")
}

pub async fn verify_blocking(
    verifier: Arc<dyn PasswordVerifier>,
    password: String,
    hash: String,
) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verifier.verify(&password, &hash))
        .await
        .context("password verification task")
}
