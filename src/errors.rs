use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Inference engine errors ──────────────────────────────────────────────
    #[error("Ollama service unavailable at {host}")]
    OllamaUnavailable { host: String },

    #[error("Model '{model_name}' not found in Ollama")]
    ModelNotFound { model_name: String },

    #[error("Inference error: {message}")]
    InferenceError { message: String },

    #[error("Embedding error: {message}")]
    EmbeddingError { message: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Message index {index} is out of range (chat has {len} messages)")]
    MessageIndexOutOfRange { index: usize, len: usize },

    #[error("Message {index} is not a user message")]
    NotAUserMessage { index: usize },

    // ── Conversation errors ──────────────────────────────────────────────────
    #[error("Chat {index} not found")]
    ChatNotFound { index: usize },

    // ── Access errors ────────────────────────────────────────────────────────
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Missing or unknown session token")]
    Unauthorized,

    // ── Configuration / index errors ─────────────────────────────────────────
    #[error("Invalid value '{value}' for {key}")]
    InvalidConfig { key: String, value: String },

    #[error("Index I/O failed for {path}: {source}")]
    IndexIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No documents could be loaded from {dir}")]
    EmptyKnowledgeBase { dir: String },

    #[error("Index format error: {0}")]
    IndexFormat(#[from] serde_json::Error),

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn index_io(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::IndexIo { path: path.into(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ChatNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::MessageIndexOutOfRange { .. }
                | AppError::NotAUserMessage { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::InvalidCredentials | AppError::Unauthorized)
    }

    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, AppError::OllamaUnavailable { .. })
    }

    fn status(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.is_unauthorized() {
            StatusCode::UNAUTHORIZED
        } else if self.is_agent_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = AppError::NotAUserMessage { index: 1 };
        assert!(err.is_validation());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unavailable_engine_maps_to_503() {
        let err = AppError::OllamaUnavailable { host: "http://localhost:11434".into() };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Ollama service unavailable at http://localhost:11434");
    }
}
