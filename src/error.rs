use thiserror::Error;

/// Errors raised by the reduce engine.
#[derive(Error, Debug)]
pub enum ReduceError {
    /// Invalid processor configuration, raised before any record flows.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A key was declared with one kind but the record holds another.
    #[error("Type mismatch for key '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("Partition {partition} was already consumed by a reader")]
    PartitionConsumed { partition: usize },

    #[error("Invalid processor state: {message}")]
    InvalidState { message: String },

    #[error("Reducer action '{action}' failed: {message}")]
    Action { action: String, message: String },

    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReduceError {
    pub fn config(message: impl Into<String>) -> Self {
        ReduceError::Config {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ReduceError::InvalidState {
            message: message.into(),
        }
    }

    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        ReduceError::Action {
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn task(message: impl Into<String>) -> Self {
        ReduceError::Task {
            message: message.into(),
        }
    }

    /// Configuration and reentrancy errors point at a programming or setup bug.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReduceError::Config { .. }
                | ReduceError::TypeMismatch { .. }
                | ReduceError::PartitionConsumed { .. }
                | ReduceError::InvalidState { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReduceError>;
