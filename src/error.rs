//! Error types for the streaming pipeline.
//!
//! The crate distinguishes three layers of failure, using `thiserror` for each:
//!
//! - **`DeviceError`**: failures reported by the acquisition device or its driver
//!   library (a numbered protocol error, an unknown channel name, a lost connection).
//! - **`DaqError`**: the application-level error. It wraps device errors together
//!   with configuration, I/O and CSV failures so that `?` works across the crate.
//! - **`LoopFault`**: why the streaming loop left the `Streaming` state abnormally.
//!   A device fault and an unexpected fault are reported differently but both
//!   route to the same finalization path.
//!
//! Errors raised while starting a stream propagate to the caller. Errors raised
//! inside the streaming loop, or while stopping the stream, are logged and
//! recorded in the run statistics instead.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors reported by a sample source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Numbered error returned by the device driver library
    #[error("Device error ({code}): {message}")]
    Protocol { code: i32, message: String },

    /// A channel name that the device cannot map to a register address
    #[error("Invalid channel address '{name}'")]
    InvalidAddress { name: String },

    /// A stream operation was issued while no stream is running
    #[error("Stream is not running")]
    NotStreaming,

    /// The device stopped answering or the stream ended
    #[error("Device disconnected: {message}")]
    Disconnected { message: String },

    /// The device rejected a configuration request
    #[error("Invalid device configuration: {message}")]
    InvalidConfig { message: String },
}

impl DeviceError {
    /// Check if this error leaves the device unusable for further reads.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

/// Application error type.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Settings could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Output file could not be opened or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output file could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error reported by the sample source
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Controller used out of order
    #[error("Data processing error: {0}")]
    Processing(String),
}

/// Reason the streaming loop stopped before it was cancelled.
#[derive(Error, Debug)]
pub enum LoopFault {
    /// The sample source reported an error while reading
    #[error("device fault: {0}")]
    Device(#[from] DeviceError),

    /// Any other failure inside the loop body, e.g. a failed flush
    #[error("unexpected fault: {0}")]
    Unexpected(DaqError),
}

impl From<DaqError> for LoopFault {
    fn from(err: DaqError) -> Self {
        match err {
            DaqError::Device(device) => Self::Device(device),
            other => Self::Unexpected(other),
        }
    }
}
