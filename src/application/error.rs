use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError, store::StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("caller is not authorized")]
    Unauthorized,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// True when schema validation rejected a payload or stored value.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::Validation { .. })
                | AppError::Store(StoreError::Validation(DomainError::Validation { .. }))
                | AppError::Validation(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Store(StoreError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            AppError::Store(StoreError::Backend { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(InfraError::Configuration { .. })
            | AppError::Infra(InfraError::Endpoint { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Store(StoreError::Validation(_))
            | AppError::Validation(_) => "Request could not be processed",
            AppError::Store(StoreError::Conflict { .. }) => "Concurrent modification, retry",
            AppError::Store(StoreError::Backend { .. }) => "Service temporarily unavailable",
            AppError::NotFound => "Resource not found",
            AppError::Unauthorized => "Not authorized",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            _ => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(
            target = "application::error",
            status = %status,
            error = %self,
            "request failed"
        );
        (status, self.presentation_message()).into_response()
    }
}
