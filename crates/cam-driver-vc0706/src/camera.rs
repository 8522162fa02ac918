//! VC0706 camera driver: configuration commands, paged frame-buffer
//! reads, and the snapshot pipeline.

use crate::error::Vc0706Error;
use crate::protocol::{
    command, BaudRate, FrameControl, ImageSize, Vc0706Session, ACK_LEN, CONTROL_MODE_MCU,
    CURRENT_FRAME, FOOTER_LEN, INTERFACE_UART, SIGN_DEVICE,
};
use cam_core::serial::{DynSerial, SharedPort};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

/// Safe per-transaction chunk size for paged frame-buffer reads.
///
/// The device buffers each paged read internally; requests above this
/// size risk overrunning that buffer. Callers wanting more bytes chunk
/// their requests.
pub const MAX_CHUNK: usize = 64;

/// Inter-byte delay hint carried in READ_FBUF, in device time units.
const FBUF_READ_DELAY: u16 = 10;

/// Sanity bound on the reported frame length.
///
/// Paged reads address the device buffer with a 16-bit offset, so
/// anything beyond 64 KiB cannot be retrieved and indicates a corrupt
/// length response. Recoverable: the snapshot is abandoned and the
/// device resumed.
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// GET_FBUF_LEN response: envelope, payload-length byte, 4 length bytes.
const FBUF_LEN_RESPONSE: usize = 9;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the VC0706 driver.
#[derive(Debug, Clone, Deserialize)]
pub struct Vc0706Config {
    /// Serial port path (e.g., "/dev/ttyUSB0").
    pub port: String,
    /// Device serial number echoed in every frame (default: 0).
    #[serde(default)]
    pub serial_num: u8,
    /// UART baud rate; the device must already be at this rate
    /// (factory default: 38400).
    #[serde(default)]
    pub baud: BaudRate,
    /// JPEG output resolution (default: 160x120).
    #[serde(default)]
    pub image_size: ImageSize,
    /// Optional response deadline override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// =============================================================================
// Vc0706Camera
// =============================================================================

/// Driver for the VC0706 serial JPEG camera.
///
/// Owns one [`Vc0706Session`] and is the single writer on the camera
/// link: only one snapshot may be in flight at a time, matching the
/// single-session nature of the hardware.
pub struct Vc0706Camera {
    session: Vc0706Session,
}

impl Vc0706Camera {
    /// Open the configured serial port and run the initialization
    /// sequence: system reset, serial number, baud rate, image size.
    #[cfg(feature = "serial")]
    pub async fn open(cfg: &Vc0706Config) -> anyhow::Result<Self> {
        use anyhow::Context;

        let port = cam_core::serial::open_serial_async(&cfg.port, cfg.baud.bps(), "VC0706")
            .await
            .context("Failed to open VC0706 serial port")?;
        let mut camera = Self::from_port(Box::new(port), cfg.serial_num);
        if let Some(ms) = cfg.timeout_ms {
            camera = camera.with_response_timeout(Duration::from_millis(ms));
        }
        camera
            .initialize(cfg.baud, cfg.image_size)
            .await
            .context("VC0706 initialization failed")?;
        Ok(camera)
    }

    /// Create a driver over an already-open port without initializing.
    ///
    /// Used by tests (duplex streams against a simulated device) and
    /// by callers that manage initialization themselves.
    pub fn from_port(port: DynSerial, serial_num: u8) -> Self {
        Self::from_shared(cam_core::serial::wrap_shared(port), serial_num)
    }

    /// Create a driver over a shared port without initializing.
    pub fn from_shared(port: SharedPort, serial_num: u8) -> Self {
        Self {
            session: Vc0706Session::new(port, serial_num),
        }
    }

    /// Override the response deadline.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.session = self.session.with_response_timeout(timeout);
        self
    }

    pub fn serial_num(&self) -> u8 {
        self.session.serial_num()
    }

    // =========================================================================
    // Configuration Commands
    // =========================================================================

    /// Run the full initialization sequence.
    #[instrument(skip(self), err)]
    pub async fn initialize(
        &mut self,
        baud: BaudRate,
        image_size: ImageSize,
    ) -> Result<(), Vc0706Error> {
        self.system_reset().await?;
        self.set_serial_num().await?;
        self.set_baud_rate(baud).await?;
        self.set_image_size(image_size).await?;
        tracing::info!(
            serial_num = self.serial_num(),
            ?baud,
            ?image_size,
            "VC0706 initialized"
        );
        Ok(())
    }

    /// Reset the camera. Flushes the link first, since reset is the
    /// resynchronization point after any aborted exchange.
    pub async fn system_reset(&mut self) -> Result<(), Vc0706Error> {
        self.session
            .run_command(command::SYSTEM_RESET, &[0x00], ACK_LEN, true)
            .await
    }

    /// Assign the session's serial number on the device.
    pub async fn set_serial_num(&mut self) -> Result<(), Vc0706Error> {
        let args = [0x01, self.session.serial_num()];
        self.session
            .run_command(command::SET_SERIAL_NUM, &args, ACK_LEN, false)
            .await
    }

    /// Configure the device UART baud rate.
    ///
    /// Only the device side is reconfigured; reopening the host port
    /// at the new rate is the transport owner's job.
    pub async fn set_baud_rate(&mut self, baud: BaudRate) -> Result<(), Vc0706Error> {
        let divisor = baud.divisor().to_be_bytes();
        let args = [0x03, INTERFACE_UART, divisor[0], divisor[1]];
        self.session
            .run_command(command::SET_PORT, &args, ACK_LEN, false)
            .await
    }

    /// Configure the JPEG output resolution.
    pub async fn set_image_size(&mut self, size: ImageSize) -> Result<(), Vc0706Error> {
        let args = [0x05, 0x04, 0x01, 0x00, 0x19, size.code()];
        self.session
            .run_command(command::WRITE_DATA, &args, ACK_LEN, false)
            .await
    }

    /// Stop or resume capture of the current frame.
    pub async fn frame_control(&mut self, ctrl: FrameControl) -> Result<(), Vc0706Error> {
        let args = [0x01, ctrl as u8];
        self.session
            .run_command(command::FBUF_CTRL, &args, ACK_LEN, false)
            .await
    }

    // =========================================================================
    // Frame-Buffer Reader
    // =========================================================================

    /// Query the total length of the currently frozen frame.
    #[instrument(skip(self), err)]
    pub async fn frame_length(&mut self) -> Result<u32, Vc0706Error> {
        self.session
            .run_command(command::GET_FBUF_LEN, &[0x01, 0x00], FBUF_LEN_RESPONSE, false)
            .await?;
        let resp = self.session.response();
        // 4 big-endian length bytes at the fixed payload offset.
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&resp[5..9]);
        Ok(u32::from_be_bytes(len_bytes))
    }

    /// Retrieve up to [`MAX_CHUNK`] frame bytes at a device-side offset.
    ///
    /// Issues the paged READ_FBUF command, waits for its 5-byte
    /// acknowledgment, then performs the bulk read of `num_bytes` plus
    /// the fixed footer the device appends. Returns the raw image
    /// bytes with the footer stripped.
    pub async fn read_frame_chunk(
        &mut self,
        num_bytes: u8,
        offset: u16,
    ) -> Result<Vec<u8>, Vc0706Error> {
        if num_bytes as usize > MAX_CHUNK {
            return Err(Vc0706Error::ChunkTooLarge {
                requested: num_bytes as usize,
                limit: MAX_CHUNK,
            });
        }

        let args = read_fbuf_args(num_bytes, offset);
        self.session
            .run_command(command::READ_FBUF, &args, ACK_LEN, false)
            .await?;

        let mut bulk = self
            .session
            .read_bulk(num_bytes as usize + FOOTER_LEN)
            .await?;
        if bulk[num_bytes as usize] != SIGN_DEVICE {
            tracing::trace!(offset, "unexpected footer signature after frame chunk");
        }
        bulk.truncate(num_bytes as usize);
        Ok(bulk)
    }

    // =========================================================================
    // Snapshot Orchestrator
    // =========================================================================

    /// Produce one complete, contiguous image from the camera.
    ///
    /// Freeze -> query length -> allocate -> assemble in chunks of at
    /// most [`MAX_CHUNK`] bytes -> resume. On any failure after the
    /// freeze, a best-effort resume is issued so the device is not
    /// left frozen, and the error is returned; the partially assembled
    /// buffer is dropped. A resume failure after full assembly is
    /// still a pipeline failure, because continuous operation is the
    /// firmware's actual purpose.
    #[instrument(skip(self), err)]
    pub async fn capture_snapshot(&mut self) -> Result<Vec<u8>, Vc0706Error> {
        // Freeze. No allocation has happened yet and a failed freeze
        // means nothing to resume.
        self.frame_control(FrameControl::Stop).await?;

        let frame_len = match self.frame_length().await {
            Ok(len) => len,
            Err(e) => {
                self.try_resume().await;
                return Err(e);
            }
        };
        if frame_len > MAX_FRAME_LEN {
            self.try_resume().await;
            return Err(Vc0706Error::FrameTooLarge {
                len: frame_len,
                max: MAX_FRAME_LEN,
            });
        }
        tracing::debug!(frame_len, "assembling frozen frame");

        let mut image = Vec::with_capacity(frame_len as usize);
        let mut cursor: u32 = 0;
        let mut remaining = frame_len;
        while remaining > 0 {
            let chunk = remaining.min(MAX_CHUNK as u32) as u8;
            match self.read_frame_chunk(chunk, cursor as u16).await {
                Ok(bytes) => {
                    image.extend_from_slice(&bytes);
                    cursor += u32::from(chunk);
                    remaining -= u32::from(chunk);
                }
                Err(e) => {
                    tracing::warn!(cursor, error = %e, "frame chunk read failed, abandoning snapshot");
                    self.try_resume().await;
                    return Err(e);
                }
            }
        }
        debug_assert_eq!(cursor, frame_len);

        self.frame_control(FrameControl::Resume).await?;

        tracing::info!(bytes = image.len(), "snapshot assembled");
        Ok(image)
    }

    /// Best-effort resume on a failure path. The original error is the
    /// one worth reporting; a resume failure on top of it is logged.
    async fn try_resume(&mut self) {
        if let Err(e) = self.frame_control(FrameControl::Resume).await {
            tracing::warn!(error = %e, "best-effort frame resume failed");
        }
    }
}

/// Build the 13-byte READ_FBUF argument block for a paged read.
fn read_fbuf_args(num_bytes: u8, offset: u16) -> [u8; 13] {
    let offset = offset.to_be_bytes();
    let delay = FBUF_READ_DELAY.to_be_bytes();
    [
        0x0C,
        CURRENT_FRAME,
        CONTROL_MODE_MCU,
        0x00,
        0x00,
        offset[0],
        offset[1],
        0x00,
        0x00,
        0x00,
        num_bytes,
        delay[0],
        delay[1],
    ]
}
