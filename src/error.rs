use thiserror::Error;

use crate::db::connection::ConnectFailure;

/// Error type for studio operations
#[derive(Debug, Error)]
pub enum StudioError {
    /// Missing or malformed request input (empty query, bad identifier...)
    #[error("{0}")]
    InputValidation(String),

    #[error("No active database connection")]
    NotConnected,

    #[error("{}", .0.message)]
    ConnectionFailure(Box<ConnectFailure>),

    #[error("Execution failed: {0}")]
    QueryExecution(String),

    #[error("{0}")]
    Metadata(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),
}

impl StudioError {
    /// Whether the caller is at fault rather than the database
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StudioError::InputValidation(_) | StudioError::NotConnected
        )
    }
}

impl From<ConnectFailure> for StudioError {
    fn from(failure: ConnectFailure) -> Self {
        StudioError::ConnectionFailure(Box::new(failure))
    }
}

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;
