use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RailApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Could not reach the remote service: {0}")]
    Transport(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The remote service returned an empty response. {0}")]
    EmptyResponse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RailApiError {
    /// Timeouts, connection failures, 5xx responses and rate limiting are worth retrying later. Everything else is a
    /// definitive answer from the remote service.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::QueryError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RailApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_decode() {
            Self::JsonError(e.to_string())
        } else if e.is_builder() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
