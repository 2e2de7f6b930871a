//! Error types for the capture application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device discovery and open errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no video capture device found")]
    NotFound,

    #[error("failed to open device {0}: {1}")]
    OpenFailed(String, String),

    #[error("capability query failed for {0}: {1}")]
    CapabilityQuery(String, String),
}

/// Stream format negotiation errors
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("device offers no H.264 frame-based format (offered: {0})")]
    Unsupported(String),

    #[error("stream control configuration failed: {0}")]
    ControlRejected(String),
}

/// Frame delivery errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("streaming already active")]
    AlreadyStreaming,

    #[error("failed to start frame delivery: {0}")]
    StreamStart(String),

    #[error("frame delivery failed: {0}")]
    StreamRead(String),
}

/// Preview and record sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to launch preview process: {0}")]
    PreviewSpawn(String),

    #[error("failed to open record file {0}: {1}")]
    RecordOpen(String, String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
