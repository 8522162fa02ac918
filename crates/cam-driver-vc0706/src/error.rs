//! Driver error type and device status codes.

use thiserror::Error;

// =============================================================================
// VC0706 Status Codes
// =============================================================================

/// Status codes the camera reports in the fourth byte of every
/// response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    UnknownCommand = 0x01,
    BadDataLength = 0x02,
    BadDataFormat = 0x03,
    CannotExecute = 0x04,
    ExecutionError = 0x05,
    Unknown = 0xFF,
}

impl Status {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Ok,
            0x01 => Self::UnknownCommand,
            0x02 => Self::BadDataLength,
            0x03 => Self::BadDataFormat,
            0x04 => Self::CannotExecute,
            0x05 => Self::ExecutionError,
            _ => Self::Unknown,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ok => "No error",
            Self::UnknownCommand => "Command not recognized",
            Self::BadDataLength => "Wrong argument count",
            Self::BadDataFormat => "Malformed argument data",
            Self::CannotExecute => "Cannot execute now",
            Self::ExecutionError => "Command execution failed",
            Self::Unknown => "Unknown status code",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.description(), *self as u8)
    }
}

// =============================================================================
// Envelope Fields
// =============================================================================

/// Which envelope field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeField {
    Signature,
    SerialNum,
    Command,
}

impl std::fmt::Display for EnvelopeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EnvelopeField::Signature => "signature",
            EnvelopeField::SerialNum => "serial number",
            EnvelopeField::Command => "command echo",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Driver Error
// =============================================================================

/// Errors the VC0706 driver can report.
///
/// The protocol engine never retries internally; every failure
/// propagates to the caller, which decides whether to flush-and-retry
/// or abort the snapshot. Silent retries could mask a persistently
/// desynchronized link.
#[derive(Debug, Error)]
pub enum Vc0706Error {
    #[error("I/O error on camera link: {0}")]
    Io(#[from] std::io::Error),

    /// The expected response bytes did not arrive in time.
    #[error("timed out during {op}")]
    Timeout { op: &'static str },

    /// An envelope header field did not match the expectation,
    /// which usually means the link is desynchronized.
    #[error("response {field} mismatch: expected {expected:#04x}, got {received:#04x}")]
    Envelope {
        field: EnvelopeField,
        expected: u8,
        received: u8,
    },

    /// The camera reported a nonzero status code.
    #[error("camera reported error status: {0}")]
    Status(Status),

    /// A response shorter than the envelope arrived, or the requested
    /// response would not fit the scratch buffer.
    #[error("response length {len} outside valid range {min}..={max}")]
    ResponseLength { len: usize, min: usize, max: usize },

    /// A single paged read was asked for more than the device's safe
    /// per-transaction chunk size.
    #[error("chunk of {requested} bytes exceeds per-read limit of {limit}")]
    ChunkTooLarge { requested: usize, limit: usize },

    /// The camera reported a frame length beyond the sanity bound.
    /// In a hosted environment this is recoverable; the snapshot is
    /// abandoned and the device resumed.
    #[error("frame length {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: u32, max: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for code in 0x00..=0x05u8 {
            let status = Status::from_u8(code);
            assert_eq!(status as u8, code);
        }
        assert_eq!(Status::from_u8(0x42), Status::Unknown);
    }

    #[test]
    fn test_status_display() {
        let s = Status::CannotExecute;
        assert!(!s.is_ok());
        assert_eq!(s.to_string(), "Cannot execute now (0x04)");
    }

    #[test]
    fn test_envelope_error_display() {
        let err = Vc0706Error::Envelope {
            field: EnvelopeField::SerialNum,
            expected: 0x01,
            received: 0x02,
        };
        assert_eq!(
            err.to_string(),
            "response serial number mismatch: expected 0x01, got 0x02"
        );
    }
}
