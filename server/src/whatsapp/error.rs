//! WhatsApp Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Failures of the connection collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Timed out waiting for the connection")]
    Timeout,
    #[error("Connection closed")]
    Closed,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Remote(String),
}

/// Errors reported to callers of instance operations.
#[derive(Error, Debug)]
pub enum WaError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("The \"{0}\" instance does not exist")]
    InstanceNotFound(String),

    #[error("The \"{0}\" instance is not connected")]
    NotConnected(String),

    #[error("This name \"{0}\" is already in use")]
    AlreadyExists(String),

    /// A protocol call failed; carries the operation and the original message.
    #[error("{context}: {message}")]
    Protocol { context: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session store error: {0}")]
    Session(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaError {
    pub fn protocol(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Protocol {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(context: &str, err: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{context}: {err}"))
    }

    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InstanceNotFound(_) => "INSTANCE_NOT_FOUND",
            Self::NotConnected(_) => "NOT_CONNECTED",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::AlreadyExists(_) => StatusCode::FORBIDDEN,
            Self::Protocol { .. } => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ConnectionError> for WaError {
    fn from(err: ConnectionError) -> Self {
        Self::protocol("Connection error", err)
    }
}

impl IntoResponse for WaError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(e) | Self::Session(e) => {
                tracing::error!(error = %e, "Store error");
                "Internal server error".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}
