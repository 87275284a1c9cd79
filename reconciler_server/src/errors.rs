use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use ledger_engine::{BalanceError, RailError};
use log::error;
use rail_clients::RailApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Internal failures are logged in full, but the caller only ever sees a generic message for them.
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("💻️ {self}");
            "An internal error occurred. Please try again later.".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": message }).to_string())
    }
}

impl From<BalanceError> for ServerError {
    fn from(e: BalanceError) -> Self {
        match e {
            BalanceError::InvalidArgument(s) => Self::InvalidRequestPath(s),
            e => Self::BackendError(e.to_string()),
        }
    }
}

/// Translates a rail client failure into the engine's rail error, preserving the transient/permanent split.
pub fn rail_error(e: RailApiError) -> RailError {
    match e {
        RailApiError::Timeout(s) => RailError::Timeout(s),
        e @ (RailApiError::Transport(_) | RailApiError::QueryError { .. }) if e.is_transient() => {
            RailError::Unavailable(e.to_string())
        },
        e @ RailApiError::QueryError { .. } => RailError::Rejected(e.to_string()),
        RailApiError::InvalidRequest(s) => RailError::Rejected(s),
        RailApiError::Initialization(s) => RailError::NotConfigured(s),
        e @ (RailApiError::JsonError(_) | RailApiError::EmptyResponse(_) | RailApiError::Transport(_)) => {
            RailError::InvalidResponse(e.to_string())
        },
    }
}
