//! Error types for platform-common.
//!
//! This module defines all error types using `thiserror`. Driver errors are
//! carried through unchanged so callers can classify them themselves.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// Error returned by the database driver, passed through untouched.
    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error("Decode error: {0}")]
    Decode(#[source] sqlx::Error),

    #[error("No rows in result set")]
    NotFound,

    #[error("Expected exactly one row, got more")]
    MultipleRows,

    #[error("Deadline exceeded: {operation}")]
    DeadlineExceeded { operation: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a deadline error for the named operation.
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// True when the query produced no row, whichever layer noticed it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Driver(sqlx::Error::RowNotFound))
    }

    /// Access the driver error, if this is one.
    pub fn as_driver(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by message consumers and their handlers.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Consumer is closed")]
    Closed,

    #[error("Broker error: {message}")]
    Broker { message: String },

    #[error("Handler failed for {topic}@{offset}: {message}")]
    Handler {
        topic: String,
        offset: i64,
        message: String,
    },
}

impl ConsumerError {
    /// Create a broker error.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker {
            message: message.into(),
        }
    }

    /// Create a handler error for a message.
    pub fn handler(topic: impl Into<String>, offset: i64, message: impl Into<String>) -> Self {
        Self::Handler {
            topic: topic.into(),
            offset,
            message: message.into(),
        }
    }
}
