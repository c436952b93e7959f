use super::{CameraProvider, FacingMode, Frame, FrameSource};
use crate::barcode::{BarcodeDecoder, Ean13Detector};
use crate::error::{BookFinderError, Result};
use crate::scanner::{self, ImageInfo};
use async_trait::async_trait;
use std::path::PathBuf;

/// フォルダの画像をフレームとして再生するカメラ
#[derive(Debug, Clone)]
pub struct FolderCamera {
    folder: PathBuf,
    native: bool,
}

impl FolderCamera {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            native: true,
        }
    }

    /// ネイティブ検出器の有無を切り替える
    pub fn with_native_detector(mut self, native: bool) -> Self {
        self.native = native;
        self
    }
}

#[async_trait]
impl CameraProvider for FolderCamera {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn FrameSource>> {
        let images = scanner::scan_folder(&self.folder).map_err(|e| match e {
            BookFinderError::FolderNotFound(path) => {
                BookFinderError::CameraAccess(format!("フォルダが見つかりません: {}", path))
            }
            other => other,
        })?;

        tracing::debug!(
            folder = %self.folder.display(),
            frames = images.len(),
            ?facing,
            "camera stream opened"
        );

        Ok(Box::new(FolderStream {
            images,
            position: 0,
            active: true,
        }))
    }

    fn native_detector(&self) -> Option<Box<dyn BarcodeDecoder>> {
        if self.native {
            Some(Box::new(Ean13Detector::new()))
        } else {
            None
        }
    }
}

/// `FolderCamera` のストリーム
#[derive(Debug)]
pub struct FolderStream {
    images: Vec<ImageInfo>,
    position: usize,
    active: bool,
}

#[async_trait]
impl FrameSource for FolderStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        while self.active && self.position < self.images.len() {
            let info = self.images[self.position].clone();
            let sequence = self.position as u64;
            self.position += 1;

            let path = info.path.clone();
            let loaded = tokio::task::spawn_blocking(move || scanner::load_image(&path))
                .await
                .map_err(|e| BookFinderError::ImageLoad(e.to_string()))?;

            match loaded {
                Ok(image) => {
                    return Ok(Some(Frame {
                        sequence,
                        image: image.to_luma8(),
                        path: Some(info.path),
                    }))
                }
                // 読めないフレームは飛ばす
                Err(e) => tracing::trace!(file = %info.file_name, error = %e, "frame skipped"),
            }
        }
        Ok(None)
    }

    fn stop(&mut self) {
        if self.active {
            tracing::debug!("camera stream stopped");
        }
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_folder_is_camera_access_error() {
        let camera = FolderCamera::new("/nonexistent/frames");
        let result = camera.open(FacingMode::Environment).await;
        assert!(matches!(result, Err(BookFinderError::CameraAccess(_))));
    }

    #[tokio::test]
    async fn test_frames_in_order_and_corrupt_skipped() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(3, 3, Luma([10])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"not a jpeg").unwrap();
        GrayImage::from_pixel(5, 2, Luma([20])).save(dir.path().join("c.png")).unwrap();

        let camera = FolderCamera::new(dir.path());
        let mut stream = camera.open(FacingMode::Environment).await.unwrap();

        let first = stream.next_frame().await.unwrap().unwrap();
        assert_eq!(first.image.dimensions(), (3, 3));
        let second = stream.next_frame().await.unwrap().unwrap();
        assert_eq!(second.image.dimensions(), (5, 2));
        assert_eq!(second.sequence, 2);
        assert!(stream.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempdir().unwrap();
        GrayImage::from_pixel(3, 3, Luma([10])).save(dir.path().join("a.png")).unwrap();

        let camera = FolderCamera::new(dir.path());
        let mut stream = camera.open(FacingMode::Environment).await.unwrap();
        stream.stop();
        stream.stop();
        assert!(!stream.is_active());
        assert!(stream.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn test_native_detector_toggle() {
        assert!(FolderCamera::new(".").native_detector().is_some());
        assert!(FolderCamera::new(".").with_native_detector(false).native_detector().is_none());
    }
}
