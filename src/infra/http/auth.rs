//! Static API token check standing in for the console's auth capability.

use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use crate::application::AppError;

/// Identity attributed to callers holding the console API token.
const CONSOLE_IDENTITY: &str = "console";

/// The expected bearer token, compared in constant time.
#[derive(Clone)]
pub struct ApiToken {
    token: String,
}

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Check the request's bearer token and return the caller identity.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<&'static str, AppError> {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if presented
            .as_bytes()
            .ct_eq(self.token.as_bytes())
            .unwrap_u8()
            == 0
        {
            return Err(AppError::Unauthorized);
        }

        Ok(CONSOLE_IDENTITY)
    }
}
