//! Snapshot-then-upload pipeline.

use cam_core::{upload::Uploader, AppResult, CamError};
use cam_driver_vc0706::Vc0706Camera;
use tracing::{info, instrument};

/// Take one snapshot and push it to the uploader.
///
/// Returns the captured image on success so callers can additionally
/// persist it. A capture failure is reported without contacting the
/// uploader; a partial image is never sent.
#[instrument(skip(camera, uploader))]
pub async fn snapshot_and_upload(
    camera: &mut Vc0706Camera,
    uploader: &dyn Uploader,
) -> AppResult<Vec<u8>> {
    let image = camera
        .capture_snapshot()
        .await
        .map_err(|e| CamError::Instrument(e.to_string()))?;
    info!(bytes = image.len(), "snapshot captured");

    uploader.send(&image).await?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cam_sim::{Fault, SimCamera, SimConfig};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every image it is asked to send.
    #[derive(Default)]
    struct RecordingUploader {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn send(&self, image: &[u8]) -> Result<(), CamError> {
            self.sent.lock().unwrap().push(image.to_vec());
            Ok(())
        }
    }

    /// Always refuses, as a dead network link would.
    struct FailingUploader;

    #[async_trait]
    impl Uploader for FailingUploader {
        async fn send(&self, _image: &[u8]) -> Result<(), CamError> {
            Err(CamError::Upload("connection refused".to_string()))
        }
    }

    fn camera_for(port: tokio::io::DuplexStream) -> Vc0706Camera {
        Vc0706Camera::from_port(Box::new(port), 0)
            .with_response_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_captured_image_reaches_the_uploader() {
        let frame: Vec<u8> = (0..150).map(|i| (i % 251) as u8).collect();
        let (port, _sim) = SimCamera::spawn(SimConfig {
            frame: frame.clone(),
            ..Default::default()
        });
        let mut camera = camera_for(port);
        let uploader = RecordingUploader::default();

        let image = snapshot_and_upload(&mut camera, &uploader).await.unwrap();

        assert_eq!(image, frame);
        assert_eq!(*uploader.sent.lock().unwrap(), vec![frame]);
    }

    #[tokio::test]
    async fn test_partial_image_is_never_sent() {
        let (port, sim) = SimCamera::spawn(SimConfig {
            frame: vec![0xAB; 150],
            fault: Fault::FailChunk {
                index: 1,
                status: 0x05,
            },
        });
        let mut camera = camera_for(port);
        let uploader = RecordingUploader::default();

        let err = snapshot_and_upload(&mut camera, &uploader)
            .await
            .unwrap_err();

        assert!(matches!(err, CamError::Instrument(_)));
        assert!(uploader.sent.lock().unwrap().is_empty());
        // The device was resumed despite the abandoned snapshot.
        assert!(!sim.stats().frozen());
    }

    #[tokio::test]
    async fn test_upload_failure_surfaces_after_capture() {
        let (port, sim) = SimCamera::spawn(SimConfig {
            frame: vec![0xCD; 80],
            ..Default::default()
        });
        let mut camera = camera_for(port);

        let err = snapshot_and_upload(&mut camera, &FailingUploader)
            .await
            .unwrap_err();

        assert!(matches!(err, CamError::Upload(_)));
        // The capture itself completed and the device is live again.
        assert_eq!(sim.stats().resumes(), 1);
        assert!(!sim.stats().frozen());
    }
}
