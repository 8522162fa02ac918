//! Serial port abstractions for the camera link.
//!
//! The camera speaks a binary, length-prefixed protocol, so the port
//! is shared unbuffered: every exchange knows exactly how many bytes
//! it expects and reads them with [`read_exact_timeout`]. Line-based
//! buffering would only get in the way here.
//!
//! # Types
//!
//! - [`SerialPortIO`]: trait alias combining `AsyncRead + AsyncWrite`
//! - [`DynSerial`]: type-erased boxed serial port
//! - [`SharedPort`]: thread-safe shared serial port
//!
//! Any type implementing the async I/O traits can stand in for the
//! hardware link, including `tokio::io::DuplexStream` in tests.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

/// Trait alias for async serial port I/O.
///
/// Implemented by `tokio_serial::SerialStream` (real hardware) and
/// `tokio::io::DuplexStream` (tests), among others.
pub trait SerialPortIO: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Thread-safe shared serial port.
///
/// Exactly one exchange may hold the lock at a time; the protocol is
/// strict request-then-response with no pipelining.
pub type SharedPort = Arc<Mutex<DynSerial>>;

/// Create a [`SharedPort`] from a type-erased serial port.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(port))
}

/// Open a serial port asynchronously using `spawn_blocking`.
///
/// Standard settings are applied: 8N1, no flow control. Port opening
/// can block on some platforms, so it is moved off the async runtime.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Drain stale data from a serial port.
///
/// Reads and discards whatever is immediately available, stopping when
/// the port stays silent or `timeout_ms` elapses. Used to resynchronize
/// before a command when a prior exchange may have been abandoned
/// mid-response.
///
/// Returns the total number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, timeout_ms: u64) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut total_discarded = 0usize;

    loop {
        if tokio::time::Instant::now() >= deadline {
            break;
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break, // EOF or no more data
            Ok(Ok(n)) => {
                total_discarded += n;
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Ok(Err(_)) => break, // Real I/O error, abort drain
            Err(_) => break,     // Timeout, no more immediate data
        }
    }

    total_discarded
}

/// Read exactly `buf.len()` bytes, failing if the deadline passes first.
///
/// Every transport read in this workspace is bounded by an explicit
/// timeout; a stalled device surfaces as `ErrorKind::TimedOut` instead
/// of an infinite poll.
pub async fn read_exact_timeout<R: AsyncRead + Unpin>(
    port: &mut R,
    buf: &mut [u8],
    timeout: Duration,
) -> std::io::Result<()> {
    match tokio::time::timeout(timeout, port.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("timed out waiting for {} bytes", buf.len()),
        )),
    }
}
