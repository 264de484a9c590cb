use core_events::EventError;
use core_sinks::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::InvalidArgument(m) => Error::InvalidArgument(m),
            SinkError::InvalidConfiguration(m) => Error::InvalidConfiguration(m),
            SinkError::SessionExists(m) => {
                Error::ConflictingState(format!("session '{}' already exists", m))
            }
            SinkError::Closed(m) => Error::ConflictingState(format!("sink '{}' is closed", m)),
            SinkError::Timeout(m) => Error::ConflictingState(format!("timed out: {}", m)),
            SinkError::Io(e) => Error::Io(e),
        }
    }
}

impl From<EventError> for Error {
    fn from(e: EventError) -> Self {
        match e {
            EventError::InvalidArgument(m) => Error::InvalidArgument(m),
            EventError::ValueOutOfRange(m) => Error::InvalidArgument(m),
            EventError::Decode(m) => Error::InvalidArgument(m),
            EventError::Io(e) => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
