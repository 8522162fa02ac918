//! TCP image uploader.
//!
//! The receiving end expects one TCP connection per image carrying the
//! raw JPEG bytes; the connection close marks the end of the image.

use async_trait::async_trait;
use cam_core::{upload::Uploader, CamError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, instrument};

/// Uploads images over a fresh TCP connection per call.
pub struct TcpUploader {
    addr: String,
}

impl TcpUploader {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Uploader for TcpUploader {
    #[instrument(skip(self, image), fields(addr = %self.addr, bytes = image.len()))]
    async fn send(&self, image: &[u8]) -> Result<(), CamError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| CamError::Upload(format!("connect to {}: {e}", self.addr)))?;
        stream
            .write_all(image)
            .await
            .map_err(|e| CamError::Upload(format!("write to {}: {e}", self.addr)))?;
        stream
            .shutdown()
            .await
            .map_err(|e| CamError::Upload(format!("close to {}: {e}", self.addr)))?;
        debug!("image uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_sends_raw_bytes_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).await.unwrap();
            received
        });

        let uploader = TcpUploader::new(addr.to_string());
        let image: Vec<u8> = (0u8..=255).collect();
        uploader.send(&image).await.unwrap();

        assert_eq!(server.await.unwrap(), image);
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_upload_error() {
        // Bind then drop to get a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uploader = TcpUploader::new(addr.to_string());
        let err = uploader.send(&[0xFF, 0xD8]).await.unwrap_err();
        assert!(matches!(err, CamError::Upload(_)));
    }

    #[tokio::test]
    async fn test_each_image_gets_its_own_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut images = Vec::new();
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().await.unwrap();
                let mut received = Vec::new();
                conn.read_to_end(&mut received).await.unwrap();
                images.push(received);
            }
            images
        });

        let uploader = TcpUploader::new(addr.to_string());
        uploader.send(b"first").await.unwrap();
        uploader.send(b"second").await.unwrap();

        let images = server.await.unwrap();
        assert_eq!(images, vec![b"first".to_vec(), b"second".to_vec()]);
    }
}
