//! Upload capability.
//!
//! The snapshot pipeline produces a complete image buffer and hands it
//! to an [`Uploader`]; everything past that point (transport, server,
//! naming) is the uploader's concern. The pipeline only observes
//! success or failure and never sends a partial image.

use crate::error::CamError;
use async_trait::async_trait;

/// Delivers a finished image to a remote host.
///
/// The buffer is borrowed for the duration of the call; implementations
/// must not retain a reference beyond it.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Send one complete image.
    async fn send(&self, image: &[u8]) -> Result<(), CamError>;
}
