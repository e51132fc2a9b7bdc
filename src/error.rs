use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("voter has already cast a ballot in election {election_id}")]
    DuplicateVoter { election_id: String },

    #[error("failed to persist snapshot: {0}")]
    Persistence(String),

    #[error("snapshot is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("chain failed integrity validation; refusing new writes")]
    IntegrityViolation,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("mining worker failed: {0}")]
    Worker(String),
}

impl LedgerError {
    fn kind(&self) -> &'static str {
        match self {
            LedgerError::DuplicateVoter { .. } => "DuplicateVoter",
            LedgerError::Persistence(_) => "PersistenceError",
            LedgerError::CorruptSnapshot(_) => "CorruptSnapshot",
            LedgerError::IntegrityViolation => "IntegrityViolation",
            LedgerError::InvalidBlock(_) => "InvalidBlock",
            LedgerError::Worker(_) => "WorkerError",
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::DuplicateVoter { .. } => StatusCode::CONFLICT,
            LedgerError::IntegrityViolation => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        }))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}
