//! Application error type.
//!
//! `CamError` consolidates the error sources the relay pipeline sees:
//! configuration problems, I/O failures, instrument (camera) failures,
//! and upload failures. Driver crates keep their own richer error
//! types; they are flattened into [`CamError::Instrument`] at the
//! pipeline boundary, the same way instrument errors cross layer
//! boundaries elsewhere in this workspace.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CamError>;

/// Primary error type for the relay application.
#[derive(Error, Debug)]
pub enum CamError {
    /// Configuration validation failed.
    ///
    /// The values parsed correctly but are semantically wrong, such as
    /// an empty serial port path or a zero-length upload address.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Camera (instrument) error.
    ///
    /// Anything the camera driver reports: protocol timeouts, envelope
    /// mismatches, device-reported status codes.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Upload of a finished image failed.
    ///
    /// The image buffer is intact when this is returned; the caller
    /// decides whether to retry the upload or discard the snapshot.
    #[error("Upload error: {0}")]
    Upload(String),
}
