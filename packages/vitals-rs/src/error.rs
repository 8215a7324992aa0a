use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the acquisition engine.
///
/// An unrecognized device line is not an error: the parser returns `None`
/// and the line is dropped.
#[derive(Error, Debug)]
pub enum VitalsError {
    #[error("No device connected")]
    NoDevice,

    #[error("Capture already in progress")]
    Busy,

    #[error("Timed out after {0:?} waiting for a reading")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No reading available yet")]
    NoReading,

    #[error("Failed to save reading: {0}")]
    Sink(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio_serial::Error> for VitalsError {
    fn from(err: tokio_serial::Error) -> Self {
        VitalsError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VitalsError>;
