//! Short-lived signed credentials for the relay ingress.
//!
//! Tokens are `base64(claims).hex(digest)` where the digest is a SHA-256
//! over the signing secret and the encoded claims. The emitter signs as the
//! synthetic `server` identity; subscribers present tokens signed for their
//! own session identity. Verification is constant-time on the digest.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

use super::error::InfraError;

/// Identity the emitter signs publishes with. Never a user identity.
pub const SERVER_IDENTITY: &str = "server";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential malformed")]
    Malformed,
    #[error("credential signature mismatch")]
    Signature,
    #[error("credential expired")]
    Expired,
}

/// Claims carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    /// Expiry as unix seconds.
    pub exp: i64,
}

/// Signs and verifies relay credentials.
pub struct TokenSigner {
    secret: String,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Result<Self, InfraError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(InfraError::configuration("relay signing secret is empty"));
        }
        Ok(Self { secret, ttl })
    }

    /// Sign a short-lived token for `identity`.
    pub fn sign(&self, identity: &str) -> String {
        let claims = Claims {
            id: identity.to_string(),
            exp: (OffsetDateTime::now_utc() + self.ttl).unix_timestamp(),
        };
        // claims are plain JSON built from owned fields; encoding cannot fail
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let digest = self.digest(&encoded);
        format!("{encoded}.{digest}")
    }

    /// Sign a token for the synthetic server identity.
    pub fn sign_server(&self) -> String {
        self.sign(SERVER_IDENTITY)
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let (encoded, digest) = token.split_once('.').ok_or(AuthError::Malformed)?;

        let expected = self.digest(encoded);
        if expected.as_bytes().ct_eq(digest.as_bytes()).unwrap_u8() == 0 {
            return Err(AuthError::Signature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;

        if claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }

    fn digest(&self, encoded_claims: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b".");
        hasher.update(encoded_claims.as_bytes());
        hex::encode(hasher.finalize())
    }
}
