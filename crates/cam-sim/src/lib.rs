//! Simulated VC0706 camera.
//!
//! [`SimCamera::spawn`] starts a tokio task that speaks the byte-exact
//! VC0706 wire protocol over one end of a `tokio::io::duplex` stream
//! and hands back the other end, ready to be wrapped by a driver. The
//! simulator serves paged frame-buffer reads from configurable backing
//! bytes, tracks counters for test assertions, and injects faults on
//! demand: rejecting commands with a chosen status code, failing or
//! muting a specific chunk read, or echoing a wrong serial number.
//!
//! The simulator deliberately duplicates the handful of wire constants
//! it needs rather than depending on the driver crate; it plays the
//! role of the protocol peer, so the two sides stay independently
//! testable.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

const SIGN_HOST: u8 = 0x56;
const SIGN_DEVICE: u8 = 0x76;

const CMD_SET_SERIAL_NUM: u8 = 0x21;
const CMD_SET_PORT: u8 = 0x24;
const CMD_SYSTEM_RESET: u8 = 0x26;
const CMD_WRITE_DATA: u8 = 0x31;
const CMD_READ_FBUF: u8 = 0x32;
const CMD_GET_FBUF_LEN: u8 = 0x34;
const CMD_FBUF_CTRL: u8 = 0x36;

const FBUF_CTRL_STOP: u8 = 0x00;
const FBUF_CTRL_RESUME: u8 = 0x02;

const DUPLEX_BUF: usize = 256;

/// Fault injection switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fault {
    /// Answer every command faithfully.
    #[default]
    None,
    /// Reject the freeze (FBUF_CTRL stop) with a status code.
    RejectFreeze { status: u8 },
    /// Reject the resume (FBUF_CTRL resume) with a status code.
    RejectResume { status: u8 },
    /// Reject a specific command code with a status code.
    RejectCommand { cmd: u8, status: u8 },
    /// Reject the Nth chunk read (0-based) with a status code.
    FailChunk { index: u32, status: u8 },
    /// Never answer the Nth chunk read; the host sees a timeout.
    MuteChunk { index: u32 },
    /// Echo a wrong serial number in every envelope.
    WrongSerialEcho,
}

/// Simulator configuration.
#[derive(Debug, Clone, Default)]
pub struct SimConfig {
    /// Backing bytes of the "captured" frame.
    pub frame: Vec<u8>,
    pub fault: Fault,
}

/// Counters the simulator maintains for test assertions.
#[derive(Debug, Default)]
pub struct SimStats {
    commands: AtomicU32,
    chunk_reads: AtomicU32,
    freezes: AtomicU32,
    resumes: AtomicU32,
    frozen: AtomicBool,
}

impl SimStats {
    /// Total command frames received.
    pub fn commands(&self) -> u32 {
        self.commands.load(Ordering::SeqCst)
    }

    /// READ_FBUF commands received (including rejected/muted ones).
    pub fn chunk_reads(&self) -> u32 {
        self.chunk_reads.load(Ordering::SeqCst)
    }

    pub fn freezes(&self) -> u32 {
        self.freezes.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> u32 {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Whether the simulated frame is currently frozen.
    pub fn frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

/// Handle to a running simulated camera.
pub struct SimCamera {
    stats: Arc<SimStats>,
    task: JoinHandle<()>,
}

impl SimCamera {
    /// Spawn a simulated camera; returns the host side of the link.
    pub fn spawn(config: SimConfig) -> (DuplexStream, Self) {
        let (host, device) = tokio::io::duplex(DUPLEX_BUF);
        let stats = Arc::new(SimStats::default());
        let task = tokio::spawn(run_device(device, config, stats.clone()));
        (host, Self { stats, task })
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }
}

impl Drop for SimCamera {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Argument byte count for each supported command.
fn arg_len(cmd: u8) -> usize {
    match cmd {
        CMD_SYSTEM_RESET => 1,
        CMD_SET_SERIAL_NUM => 2,
        CMD_SET_PORT => 4,
        CMD_WRITE_DATA => 6,
        CMD_FBUF_CTRL => 2,
        CMD_GET_FBUF_LEN => 2,
        CMD_READ_FBUF => 13,
        _ => 0,
    }
}

async fn run_device(mut port: DuplexStream, cfg: SimConfig, stats: Arc<SimStats>) {
    let mut hdr = [0u8; 3];
    loop {
        if port.read_exact(&mut hdr).await.is_err() {
            break; // host side closed
        }
        let [sign, serial, cmd] = hdr;
        if sign != SIGN_HOST {
            // Desynchronized host; a real device would ignore garbage.
            tracing::debug!(sign, "sim: dropping frame with bad signature");
            continue;
        }

        let mut args = vec![0u8; arg_len(cmd)];
        if !args.is_empty() && port.read_exact(&mut args).await.is_err() {
            break;
        }
        stats.commands.fetch_add(1, Ordering::SeqCst);

        let echo = match cfg.fault {
            Fault::WrongSerialEcho => serial.wrapping_add(1),
            _ => serial,
        };

        let outcome = handle_command(&mut port, &cfg, &stats, echo, cmd, &args).await;
        if outcome.is_err() {
            break;
        }
    }
}

async fn handle_command(
    port: &mut DuplexStream,
    cfg: &SimConfig,
    stats: &SimStats,
    echo: u8,
    cmd: u8,
    args: &[u8],
) -> std::io::Result<()> {
    if let Fault::RejectCommand { cmd: c, status } = cfg.fault {
        if c == cmd {
            return write_ack(port, echo, cmd, status).await;
        }
    }

    match cmd {
        CMD_READ_FBUF => {
            let index = stats.chunk_reads.fetch_add(1, Ordering::SeqCst);
            match cfg.fault {
                Fault::FailChunk { index: i, status } if i == index => {
                    return write_ack(port, echo, cmd, status).await;
                }
                Fault::MuteChunk { index: i } if i == index => return Ok(()),
                _ => {}
            }

            let offset = usize::from(u16::from_be_bytes([args[5], args[6]]));
            let chunk = usize::from(args[10]);

            write_ack(port, echo, cmd, 0x00).await?;

            // Serve the requested window, zero-padded past the end the
            // way the device's buffer would read back.
            let mut payload = vec![0u8; chunk];
            let end = (offset + chunk).min(cfg.frame.len());
            if offset < end {
                payload[..end - offset].copy_from_slice(&cfg.frame[offset..end]);
            }
            port.write_all(&payload).await?;
            // Fixed footer after the raw bytes.
            port.write_all(&[SIGN_DEVICE, echo, cmd, 0x00, 0x00]).await?;
            port.flush().await
        }
        CMD_GET_FBUF_LEN => {
            let len = (cfg.frame.len() as u32).to_be_bytes();
            let resp = [
                SIGN_DEVICE,
                echo,
                cmd,
                0x00,
                0x04,
                len[0],
                len[1],
                len[2],
                len[3],
            ];
            port.write_all(&resp).await?;
            port.flush().await
        }
        CMD_FBUF_CTRL => match args[1] {
            FBUF_CTRL_STOP => {
                if let Fault::RejectFreeze { status } = cfg.fault {
                    return write_ack(port, echo, cmd, status).await;
                }
                stats.frozen.store(true, Ordering::SeqCst);
                stats.freezes.fetch_add(1, Ordering::SeqCst);
                write_ack(port, echo, cmd, 0x00).await
            }
            FBUF_CTRL_RESUME => {
                if let Fault::RejectResume { status } = cfg.fault {
                    return write_ack(port, echo, cmd, status).await;
                }
                stats.frozen.store(false, Ordering::SeqCst);
                stats.resumes.fetch_add(1, Ordering::SeqCst);
                write_ack(port, echo, cmd, 0x00).await
            }
            other => {
                tracing::debug!(other, "sim: unknown frame control action");
                write_ack(port, echo, cmd, 0x03).await
            }
        },
        CMD_SYSTEM_RESET | CMD_SET_SERIAL_NUM | CMD_SET_PORT | CMD_WRITE_DATA => {
            write_ack(port, echo, cmd, 0x00).await
        }
        unknown => write_ack(port, echo, unknown, 0x01).await,
    }
}

async fn write_ack(port: &mut DuplexStream, echo: u8, cmd: u8, status: u8) -> std::io::Result<()> {
    port.write_all(&[SIGN_DEVICE, echo, cmd, status, 0x00]).await?;
    port.flush().await
}
