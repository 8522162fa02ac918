//! VC0706 Serial JPEG Camera Driver
//!
//! Protocol Overview:
//! - Format: binary command/response frames, strict request-then-response
//! - Command frame: `[0x56][serial_num][cmd][args...]`
//! - Response frame: `[0x76][serial_num][cmd][status][payload...]`
//! - Baud: 38400 factory default, 8N1, no flow control
//! - Status codes: 0x00 success; 0x01-0x05 device-reported errors
//!
//! A snapshot freezes the current frame (FBUF_CTRL stop), queries its
//! length (GET_FBUF_LEN, 4 big-endian bytes), retrieves the image in
//! paged READ_FBUF chunks of at most 64 bytes, and resumes live
//! capture (FBUF_CTRL resume). The driver never retries a failed
//! exchange; failures propagate so callers can decide between
//! flush-and-retry and aborting the snapshot.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cam_driver_vc0706::{Vc0706Camera, Vc0706Config};
//!
//! let cfg: Vc0706Config = toml::from_str(r#"port = "/dev/ttyUSB0""#)?;
//! let mut camera = Vc0706Camera::open(&cfg).await?;
//! let image = camera.capture_snapshot().await?;
//! ```
//!
//! The driver is written against a type-erased async port, so tests
//! exercise the full protocol against a simulated device over
//! `tokio::io::duplex` with no hardware attached.

pub mod camera;
pub mod error;
pub mod protocol;

pub use camera::{Vc0706Camera, Vc0706Config, MAX_CHUNK, MAX_FRAME_LEN};
pub use error::{EnvelopeField, Status, Vc0706Error};
pub use protocol::{BaudRate, FrameControl, ImageSize, Vc0706Session};
