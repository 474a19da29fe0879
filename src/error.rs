use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;
use crate::middleware::auth::AuthError;
use crate::models::ErrorResponse;
use crate::services::llm::GenerationError;

/// Every way a request can fail. Turning one into a response writes the
/// single log line for that failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("book generation failed after {elapsed:?}: {source}")]
    Generation {
        #[source]
        source: GenerationError,
        elapsed: Duration,
    },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(e) => e.status(),
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) | AppError::Generation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Auth(e) => e.client_message().to_string(),
            AppError::Validation(message) => message.clone(),
            AppError::Config(ConfigError::MissingApiKey) => {
                "Server configuration error (missing AI API key)".to_string()
            }
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Generation { source, .. } => {
                format!("Failed to generate book: {}", source.summary())
            }
        }
    }

    fn log(&self) {
        match self {
            AppError::Auth(e @ AuthError::ServerMisconfigured) => {
                tracing::error!(reason = e.reason_code(), "Auth gate cannot verify tokens: {}", e);
            }
            AppError::Auth(e) => {
                tracing::warn!(reason = e.reason_code(), "Request rejected: {}", e);
            }
            AppError::Validation(message) => {
                tracing::warn!("Invalid request: {}", message);
            }
            AppError::Config(e) => {
                tracing::error!("Server configuration error: {}", e);
            }
            AppError::Generation { source, elapsed } => {
                tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Error calling generation API: {}",
                    source
                );
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status();
        let body = ErrorResponse {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
