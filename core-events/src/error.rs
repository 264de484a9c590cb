use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Value of parameter does not fit the requested integer width: {0}")]
    ValueOutOfRange(String),

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EventError>;
