use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Sink is closed: {0}")]
    Closed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;
