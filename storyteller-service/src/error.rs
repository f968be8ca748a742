use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::i18n::I18n;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Illustration not available for session {session_id}")]
    IllustrationNotFound { session_id: String },

    #[error("{0}")]
    Gemini(#[from] GeminiError),

    #[error("Idea longer than {max} characters")]
    IdeaTooLong { max: usize },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Gemini client errors
#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("Connection failed to Gemini at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Gemini request failed (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response from Gemini")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Gemini returned an empty response")]
    EmptyResponse,

    #[error("Image not returned by the image model")]
    ImageNotReturned,
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::SessionNotFound { .. } | ServiceError::IllustrationNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::IdeaTooLong { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Gemini(GeminiError::Connection { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::SessionNotFound { .. } => "session_not_found",
            ServiceError::IllustrationNotFound { .. } => "illustration_not_found",
            ServiceError::Gemini(GeminiError::Connection { .. }) => "gemini_connection",
            ServiceError::Gemini(GeminiError::Api { .. }) => "gemini_api",
            ServiceError::Gemini(GeminiError::InvalidResponse { .. }) => "gemini_invalid_response",
            ServiceError::Gemini(GeminiError::EmptyResponse) => "gemini_empty_response",
            ServiceError::Gemini(GeminiError::ImageNotReturned) => "gemini_image_not_returned",
            ServiceError::IdeaTooLong { .. } => "idea_too_long",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Get a user-friendly translated message
    pub fn user_message(&self, i18n: &I18n, locale: &str) -> String {
        match self {
            ServiceError::SessionNotFound { session_id } => {
                i18n.format(locale, "error-session-not-found", &[("id", session_id)])
            }
            ServiceError::IllustrationNotFound { .. } => {
                i18n.get(locale, "error-illustration-not-found", None)
            }
            ServiceError::IdeaTooLong { max } => {
                i18n.format(locale, "error-idea-too-long", &[("max", &max.to_string())])
            }
            ServiceError::Internal { .. } => i18n.get(locale, "error-internal", None),
            // For other errors, fall back to the technical message
            _ => self.to_string(),
        }
    }

    /// Convert to an error response with i18n support
    pub fn into_response_with_i18n(self, i18n: &I18n, locale: &str) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            message: self.user_message(i18n, locale),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error wrapper with i18n support for API responses
pub struct I18nError {
    pub error: ServiceError,
    pub i18n: std::sync::Arc<I18n>,
    pub locale: String,
}

impl I18nError {
    pub fn new(error: ServiceError, i18n: std::sync::Arc<I18n>, locale: impl Into<String>) -> Self {
        Self {
            error,
            i18n,
            locale: locale.into(),
        }
    }
}

impl IntoResponse for I18nError {
    fn into_response(self) -> Response {
        self.error.into_response_with_i18n(&self.i18n, &self.locale)
    }
}

/// Format an error and its full source chain as a single line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
