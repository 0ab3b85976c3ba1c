use thiserror::Error;

/// Custom error types for the collaboration server and client
#[derive(Debug, Error)]
pub enum CollabError {
    /// Transport errors
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    /// Room and membership errors
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Room verification failed: {0}")]
    RoomVerification(String),

    #[error("Client {0} not found")]
    ClientNotFound(String),

    #[error("Client {0} is not a member of any room")]
    NotInRoom(String),

    /// Document and language errors
    #[error("Unknown language tag: {0}")]
    UnknownLanguage(String),

    /// Execution errors
    #[error("Execution failed: {0}")]
    ExecutionFailure(String),

    #[error("Execution timed out after {0} seconds")]
    ExecutionTimeout(u64),

    /// Protocol errors
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using CollabError
pub type Result<T> = std::result::Result<T, CollabError>;

impl CollabError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        CollabError::Internal(msg.into())
    }

    /// Helper to create Connection errors
    pub fn connection(msg: impl Into<String>) -> Self {
        CollabError::Connection(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollabError::RoomNotFound("test-room".to_string());
        assert_eq!(err.to_string(), "Room test-room not found");
    }

    #[test]
    fn test_error_helpers() {
        let err = CollabError::internal("Something went wrong");
        assert!(matches!(err, CollabError::Internal(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = CollabError::ExecutionTimeout(30);
        assert_eq!(err.to_string(), "Execution timed out after 30 seconds");
    }
}
