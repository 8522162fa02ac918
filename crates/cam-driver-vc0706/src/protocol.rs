//! VC0706 wire protocol: constants, framing, and the session engine.
//!
//! Every exchange on the camera link is one command frame followed by
//! one fixed-length response frame:
//!
//! ```text
//! host -> camera: [0x56][serial_num][cmd][args...]
//! camera -> host: [0x76][serial_num][cmd][status][payload...]
//! ```
//!
//! [`Vc0706Session`] owns all per-link state: the shared port, the
//! assigned serial number, the response scratch buffer, and the
//! exchange timeouts. Nothing is global, so several sessions against
//! several (simulated) devices can coexist in one process.

use crate::error::{EnvelopeField, Status, Vc0706Error};
use cam_core::serial::{drain_serial_buffer, read_exact_timeout, SharedPort};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// =============================================================================
// Wire Constants
// =============================================================================

/// Signature byte marking a host-to-camera frame.
pub const SIGN_HOST: u8 = 0x56;
/// Signature byte marking a camera-to-host frame.
pub const SIGN_DEVICE: u8 = 0x76;

/// Fixed envelope header: signature, serial number, command, status.
pub const ENVELOPE_LEN: usize = 4;
/// Minimal full response: envelope plus the payload-length byte.
pub const ACK_LEN: usize = 5;
/// Fixed footer the camera appends after raw frame-buffer bytes.
pub const FOOTER_LEN: usize = 5;

/// Response scratch buffer capacity.
pub const RESPONSE_BUF_SIZE: usize = 101;

/// Command codes used by this driver.
pub mod command {
    pub const SET_SERIAL_NUM: u8 = 0x21;
    pub const SET_PORT: u8 = 0x24;
    pub const SYSTEM_RESET: u8 = 0x26;
    pub const WRITE_DATA: u8 = 0x31;
    pub const READ_FBUF: u8 = 0x32;
    pub const GET_FBUF_LEN: u8 = 0x34;
    pub const FBUF_CTRL: u8 = 0x36;
}

/// Frame-buffer selector for the currently captured frame.
pub const CURRENT_FRAME: u8 = 0x00;
/// MCU transfer mode for paged frame-buffer reads.
pub const CONTROL_MODE_MCU: u8 = 0x0A;
/// UART interface selector for SET_PORT.
pub const INTERFACE_UART: u8 = 0x01;

/// Frame capture control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameControl {
    /// Freeze the currently captured frame.
    Stop = 0x00,
    /// Resume live capture.
    Resume = 0x02,
}

/// Supported UART baud rates with their SET_PORT divisor codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(try_from = "u32")]
pub enum BaudRate {
    Baud9600,
    Baud19200,
    #[default]
    Baud38400,
    Baud57600,
    Baud115200,
}

impl BaudRate {
    /// Divisor code carried in the SET_PORT argument bytes.
    pub fn divisor(&self) -> u16 {
        match self {
            BaudRate::Baud9600 => 0xAEC8,
            BaudRate::Baud19200 => 0x56E4,
            BaudRate::Baud38400 => 0x2AF2,
            BaudRate::Baud57600 => 0x1C4C,
            BaudRate::Baud115200 => 0x0DA6,
        }
    }

    /// Baud rate as bits per second, for opening the host-side port.
    pub fn bps(&self) -> u32 {
        match self {
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
            BaudRate::Baud115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = String;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        match bps {
            9600 => Ok(BaudRate::Baud9600),
            19200 => Ok(BaudRate::Baud19200),
            38400 => Ok(BaudRate::Baud38400),
            57600 => Ok(BaudRate::Baud57600),
            115_200 => Ok(BaudRate::Baud115200),
            other => Err(format!(
                "unsupported baud rate {other}; expected one of 9600, 19200, 38400, 57600, 115200"
            )),
        }
    }
}

/// JPEG output resolutions the camera supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum ImageSize {
    Px640x480,
    Px320x240,
    #[default]
    Px160x120,
}

impl ImageSize {
    /// Register value carried in the WRITE_DATA argument bytes.
    pub fn code(&self) -> u8 {
        match self {
            ImageSize::Px640x480 => 0x00,
            ImageSize::Px320x240 => 0x11,
            ImageSize::Px160x120 => 0x22,
        }
    }
}

impl TryFrom<String> for ImageSize {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "640x480" => Ok(ImageSize::Px640x480),
            "320x240" => Ok(ImageSize::Px320x240),
            "160x120" => Ok(ImageSize::Px160x120),
            other => Err(format!(
                "unsupported image size '{other}'; expected 640x480, 320x240 or 160x120"
            )),
        }
    }
}

// =============================================================================
// Envelope Verification
// =============================================================================

/// Validate the four envelope header bytes of a response.
///
/// All four fields must match for the exchange to count as successful;
/// a signature or echo mismatch usually means the link is carrying
/// stale bytes from an aborted exchange.
pub(crate) fn verify_envelope(resp: &[u8], serial_num: u8, cmd: u8) -> Result<(), Vc0706Error> {
    if resp.len() < ENVELOPE_LEN {
        return Err(Vc0706Error::ResponseLength {
            len: resp.len(),
            min: ENVELOPE_LEN,
            max: RESPONSE_BUF_SIZE,
        });
    }
    if resp[0] != SIGN_DEVICE {
        return Err(Vc0706Error::Envelope {
            field: EnvelopeField::Signature,
            expected: SIGN_DEVICE,
            received: resp[0],
        });
    }
    if resp[1] != serial_num {
        return Err(Vc0706Error::Envelope {
            field: EnvelopeField::SerialNum,
            expected: serial_num,
            received: resp[1],
        });
    }
    if resp[2] != cmd {
        return Err(Vc0706Error::Envelope {
            field: EnvelopeField::Command,
            expected: cmd,
            received: resp[2],
        });
    }
    let status = Status::from_u8(resp[3]);
    if !status.is_ok() {
        return Err(Vc0706Error::Status(status));
    }
    Ok(())
}

// =============================================================================
// Vc0706Session
// =============================================================================

/// Default deadline for a complete response frame.
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
/// Window for draining stale bytes before a flushed command.
const DRAIN_TIMEOUT_MS: u64 = 50;

/// One command/response session against a VC0706 camera.
///
/// The session executes exactly one exchange at a time: no second
/// command is issued before the prior response is fully consumed or
/// abandoned on timeout. The response scratch buffer is overwritten on
/// every exchange and never carries state between unrelated commands.
pub struct Vc0706Session {
    port: SharedPort,
    serial_num: u8,
    response: [u8; RESPONSE_BUF_SIZE],
    response_len: usize,
    response_timeout: Duration,
}

impl Vc0706Session {
    /// Create a session with the given assigned serial number.
    ///
    /// The serial number is set once here and echoed in every frame;
    /// it does not change for the lifetime of the session.
    pub fn new(port: SharedPort, serial_num: u8) -> Self {
        Self {
            port,
            serial_num,
            response: [0u8; RESPONSE_BUF_SIZE],
            response_len: 0,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Override the response deadline (tests use short timeouts).
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn serial_num(&self) -> u8 {
        self.serial_num
    }

    /// The raw bytes of the most recent response, envelope included.
    pub fn response(&self) -> &[u8] {
        &self.response[..self.response_len]
    }

    /// Execute one command/response exchange.
    ///
    /// Sends `[0x56, serial, cmd, args...]`, reads exactly
    /// `expected_len` response bytes under the response deadline, and
    /// verifies the envelope. With `flush_first`, stale bytes left on
    /// the link by a prior aborted exchange are drained and discarded
    /// before sending.
    ///
    /// Any failure leaves no partial side effect on session state
    /// beyond the overwritten scratch buffer. The engine never retries;
    /// retry is a caller-level policy.
    pub async fn run_command(
        &mut self,
        cmd: u8,
        args: &[u8],
        expected_len: usize,
        flush_first: bool,
    ) -> Result<(), Vc0706Error> {
        if !(ENVELOPE_LEN..=RESPONSE_BUF_SIZE).contains(&expected_len) {
            return Err(Vc0706Error::ResponseLength {
                len: expected_len,
                min: ENVELOPE_LEN,
                max: RESPONSE_BUF_SIZE,
            });
        }

        self.response_len = 0;

        let mut frame = Vec::with_capacity(3 + args.len());
        frame.push(SIGN_HOST);
        frame.push(self.serial_num);
        frame.push(cmd);
        frame.extend_from_slice(args);

        let mut port = self.port.lock().await;

        if flush_first {
            let discarded = drain_serial_buffer(&mut *port, DRAIN_TIMEOUT_MS).await;
            if discarded > 0 {
                tracing::debug!(cmd = format_args!("{cmd:#04x}"), discarded, "drained stale bytes");
            }
        }

        port.write_all(&frame).await?;
        port.flush().await?;

        read_exact_timeout(&mut *port, &mut self.response[..expected_len], self.response_timeout)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut => Vc0706Error::Timeout { op: "response read" },
                _ => Vc0706Error::Io(e),
            })?;
        self.response_len = expected_len;

        verify_envelope(&self.response[..expected_len], self.serial_num, cmd)
    }

    /// Read `len` raw bytes that follow a command acknowledgment, such
    /// as the frame-buffer payload and its footer. Bounded by the same
    /// response deadline; the original firmware polled here without a
    /// timeout, which could stall forever on a wedged device.
    pub(crate) async fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>, Vc0706Error> {
        let mut buf = vec![0u8; len];
        let mut port = self.port.lock().await;
        read_exact_timeout(&mut *port, &mut buf, self.response_timeout)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut => Vc0706Error::Timeout { op: "bulk read" },
                _ => Vc0706Error::Io(e),
            })?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_envelope_accepts_success() {
        let resp = [SIGN_DEVICE, 0x01, command::SYSTEM_RESET, 0x00, 0x00];
        assert!(verify_envelope(&resp, 0x01, command::SYSTEM_RESET).is_ok());
    }

    #[test]
    fn test_verify_envelope_rejects_bad_signature() {
        let resp = [SIGN_HOST, 0x00, command::FBUF_CTRL, 0x00, 0x00];
        let err = verify_envelope(&resp, 0x00, command::FBUF_CTRL).unwrap_err();
        assert!(matches!(
            err,
            Vc0706Error::Envelope {
                field: EnvelopeField::Signature,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_envelope_rejects_wrong_serial() {
        let resp = [SIGN_DEVICE, 0x07, command::FBUF_CTRL, 0x00, 0x00];
        let err = verify_envelope(&resp, 0x01, command::FBUF_CTRL).unwrap_err();
        assert!(matches!(
            err,
            Vc0706Error::Envelope {
                field: EnvelopeField::SerialNum,
                expected: 0x01,
                received: 0x07,
            }
        ));
    }

    #[test]
    fn test_verify_envelope_rejects_wrong_command_echo() {
        let resp = [SIGN_DEVICE, 0x00, command::READ_FBUF, 0x00, 0x00];
        let err = verify_envelope(&resp, 0x00, command::GET_FBUF_LEN).unwrap_err();
        assert!(matches!(
            err,
            Vc0706Error::Envelope {
                field: EnvelopeField::Command,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_envelope_rejects_every_device_status() {
        // Status byte alone fails the exchange even when signature,
        // serial, and command echo all match.
        let cases = [
            (0x01, Status::UnknownCommand),
            (0x02, Status::BadDataLength),
            (0x03, Status::BadDataFormat),
            (0x04, Status::CannotExecute),
            (0x05, Status::ExecutionError),
        ];
        for (code, expected) in cases {
            let resp = [SIGN_DEVICE, 0x00, command::FBUF_CTRL, code, 0x00];
            let err = verify_envelope(&resp, 0x00, command::FBUF_CTRL).unwrap_err();
            match err {
                Vc0706Error::Status(status) => assert_eq!(status, expected),
                other => panic!("expected status error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_verify_envelope_rejects_truncated_response() {
        let resp = [SIGN_DEVICE, 0x00];
        assert!(matches!(
            verify_envelope(&resp, 0x00, command::SYSTEM_RESET),
            Err(Vc0706Error::ResponseLength { len: 2, .. })
        ));
    }

    #[test]
    fn test_baud_rate_divisors() {
        assert_eq!(BaudRate::Baud9600.divisor(), 0xAEC8);
        assert_eq!(BaudRate::Baud38400.divisor(), 0x2AF2);
        assert_eq!(BaudRate::Baud115200.divisor(), 0x0DA6);
        assert_eq!(BaudRate::try_from(57600u32), Ok(BaudRate::Baud57600));
        assert!(BaudRate::try_from(12345u32).is_err());
    }

    #[test]
    fn test_image_size_codes() {
        assert_eq!(ImageSize::Px640x480.code(), 0x00);
        assert_eq!(ImageSize::Px320x240.code(), 0x11);
        assert_eq!(ImageSize::Px160x120.code(), 0x22);
        assert!(ImageSize::try_from("1024x768".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_run_command_times_out_on_silence() {
        let (_host, device) = tokio::io::duplex(64);
        let port = cam_core::serial::wrap_shared(Box::new(device));
        let mut session =
            Vc0706Session::new(port, 0).with_response_timeout(Duration::from_millis(50));

        let err = session
            .run_command(command::SYSTEM_RESET, &[0x00], ACK_LEN, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Vc0706Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_command_rejects_oversized_response_request() {
        let (_host, device) = tokio::io::duplex(64);
        let port = cam_core::serial::wrap_shared(Box::new(device));
        let mut session = Vc0706Session::new(port, 0);

        let err = session
            .run_command(command::READ_FBUF, &[], RESPONSE_BUF_SIZE + 1, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Vc0706Error::ResponseLength { .. }));
    }
}
