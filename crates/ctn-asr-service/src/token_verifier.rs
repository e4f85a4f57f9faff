//! Production [`TokenVerifier`] implementations for the service binary.
//!
//! # Implementations
//!
//! | Type | Use | Security |
//! |------|-----|---------|
//! | [`StaticTokenVerifier`] | Dev / CI with a literal admin token | Not for production |
//!
//! Token issuance and rotation live outside this service; the verifier
//! only answers "does this bearer token prove the admin identity".

use async_trait::async_trait;
use ctn_asr_core::middleware::{AuthError, AuthenticatedRequest, TokenVerifier};
use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::Zeroizing;

/// A [`TokenVerifier`] backed by a literal token from configuration.
///
/// **Development and testing only.** In production, inject the token from
/// a secret store so it never lands in configuration files or environment
/// variables.
///
/// At startup a `WARN` line is emitted when a literal token is active so
/// operators are reminded to replace it, and another when no token is
/// configured at all (admin endpoints then reject every request).
///
/// The token comparison is performed in constant time to prevent
/// timing-based token recovery.
pub struct StaticTokenVerifier {
    token: Option<Zeroizing<String>>,
    subject: String,
}

impl StaticTokenVerifier {
    /// Construct a verifier from the configured admin token.
    ///
    /// # Arguments
    ///
    /// * `token` - The literal admin token, or `None` to reject all tokens
    /// * `subject` - Subject attributed to the admin in logs and audit records
    pub fn new(token: Option<String>, subject: impl Into<String>) -> Self {
        match &token {
            Some(_) => warn!(
                "StaticTokenVerifier is active — \
                 literal admin tokens in configuration are not safe for production. \
                 Migrate to a secret store before deploying."
            ),
            None => warn!(
                "No admin token configured; admin endpoints will reject all requests"
            ),
        }

        Self {
            token: token.map(Zeroizing::new),
            subject: subject.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenVerifier")
            .field("token", &"<REDACTED>")
            .field("subject", &self.subject)
            .finish()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    /// Verify a bearer token against the configured literal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] when no token is configured or
    /// the presented token does not match.
    async fn verify(&self, token: &str) -> Result<AuthenticatedRequest, AuthError> {
        let Some(expected) = &self.token else {
            return Err(AuthError::InvalidToken);
        };

        if bool::from(expected.as_bytes().ct_eq(token.as_bytes())) {
            Ok(AuthenticatedRequest::new(
                self.subject.clone(),
                vec!["admin".to_string()],
            ))
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

#[cfg(test)]
#[path = "token_verifier_tests.rs"]
mod tests;
