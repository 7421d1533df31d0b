// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid queue options for {queue}: {reason}")]
    InvalidQueueOptions { queue: String, reason: String },

    #[error("Queue option '{key}' collides with the declaration of {queue}")]
    ReservedOption { queue: String, key: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
