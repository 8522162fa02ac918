//! Core types and traits for the camera relay.
//!
//! This crate holds everything the driver and binary crates share:
//!
//! - [`serial`]: async serial-port abstractions. The camera driver is
//!   written against a type-erased `AsyncRead + AsyncWrite` port, so
//!   tests can run on `tokio::io::duplex` streams with no hardware.
//! - [`upload`]: the [`upload::Uploader`] capability trait. The core
//!   pipeline hands a finished image to an uploader and only cares
//!   about success or failure.
//! - [`error`]: the application error type, [`error::CamError`].

pub mod error;
pub mod serial;
pub mod upload;

pub use error::{AppResult, CamError};
