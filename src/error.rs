use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommenderError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid weights: {0}")]
    InvalidWeights(String),
    #[error("invalid parameter: {0}")]
    InvalidParam(String),
    #[error("shape mismatch: expected dimension {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("cancelled")]
    Cancelled,
    #[error("timeout")]
    Timeout,
    #[error("store fault: {0}")]
    StoreFault(String),
    #[error("projector step '{step}' failed on '{id}': {message}")]
    ProjectorStep {
        step: String,
        id: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, RecommenderError>;

impl From<mongodb::error::Error> for RecommenderError {
    fn from(e: mongodb::error::Error) -> Self {
        RecommenderError::StoreFault(format!("mongodb: {}", e))
    }
}

impl From<neo4rs::Error> for RecommenderError {
    fn from(e: neo4rs::Error) -> Self {
        RecommenderError::StoreFault(format!("neo4j: {}", e))
    }
}

impl From<reqwest::Error> for RecommenderError {
    fn from(e: reqwest::Error) -> Self {
        RecommenderError::StoreFault(format!("http: {}", e))
    }
}

impl RecommenderError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RecommenderError::InvalidWeights(_) | RecommenderError::InvalidParam(_) => {
                StatusCode::BAD_REQUEST
            }
            RecommenderError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RecommenderError::NotFound(_) => StatusCode::NOT_FOUND,
            RecommenderError::Timeout | RecommenderError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            RecommenderError::ShapeMismatch { .. }
            | RecommenderError::StoreFault(_)
            | RecommenderError::ProjectorStep { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RecommenderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
