//! Error types for alignment modeling
//!
//! File parsing problems are returned as values by the import functions and
//! a cancelled run is reported through `RunOutcome::cancelled`, so neither
//! appears here.

use skyalign_mount::MountError;
use thiserror::Error;

/// Modeling error
#[derive(Error, Debug, Clone)]
pub enum ModelingError {
    /// Bad parameters or malformed input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A device or backend could not deliver what was asked
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The mount answered outside the expected grammar or outcome
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Another run or point-set operation is in flight
    #[error("Busy: {0}")]
    Busy(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Mount error: {0}")]
    Mount(#[from] MountError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for ModelingError {
    fn from(e: std::io::Error) -> Self {
        ModelingError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ModelingError {
    fn from(e: serde_json::Error) -> Self {
        ModelingError::Serialization(e.to_string())
    }
}

impl From<ModelingError> for String {
    fn from(e: ModelingError) -> String {
        e.to_string()
    }
}

/// Result type for modeling operations
pub type ModelingResult<T> = Result<T, ModelingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelingError::Busy("model run in progress".to_string());
        assert_eq!(err.to_string(), "Busy: model run in progress");

        let err: ModelingError = MountError::NotConnected.into();
        assert!(err.to_string().contains("Not connected to mount"));
    }

    #[test]
    fn test_io_and_json_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ModelingError = io.into();
        assert!(matches!(err, ModelingError::Io(_)));

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: ModelingError = json_err.into();
        assert!(matches!(err, ModelingError::Serialization(_)));
    }
}
