use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use order_risk_engine::Error as EngineError;
use std::fmt;

#[derive(Debug)]
pub enum IngestError {
    Unauthorized(String),
    MalformedPayload(String),
    PersistenceError(String),
    InternalError(String),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            IngestError::MalformedPayload(msg) => write!(f, "Malformed payload: {}", msg),
            IngestError::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            IngestError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for IngestError {}

impl IngestError {
    /// Label used for the webhook result metric
    pub fn label(&self) -> &'static str {
        match self {
            IngestError::Unauthorized(_) => "unauthorized",
            IngestError::MalformedPayload(_) => "malformed",
            IngestError::PersistenceError(_) => "persistence_failed",
            IngestError::InternalError(_) => "internal_error",
        }
    }
}

impl ResponseError for IngestError {
    fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            IngestError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            IngestError::PersistenceError(_) | IngestError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message) = match self {
            // Nothing about the mismatch is echoed back to the caller.
            IngestError::Unauthorized(_) => {
                ("UNAUTHORIZED", "invalid webhook signature".to_string())
            }
            IngestError::MalformedPayload(_) => ("MALFORMED_PAYLOAD", self.to_string()),
            IngestError::PersistenceError(_) => ("PERSISTENCE_ERROR", self.to_string()),
            IngestError::InternalError(_) => ("INTERNAL_ERROR", self.to_string()),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": error,
            "message": message
        }))
    }
}

impl From<EngineError> for IngestError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::MalformedPayload(msg) => IngestError::MalformedPayload(msg),
            e @ (EngineError::Persistence(_)
            | EngineError::PersistenceTimeout { .. }
            | EngineError::PartialPersistence { .. }) => {
                IngestError::PersistenceError(e.to_string())
            }
            e => IngestError::InternalError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::MalformedPayload(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
