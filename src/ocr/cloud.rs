use super::{OcrEngine, ProgressFn};
use crate::api::{CatalogApi, OcrService};
use crate::error::{BookFinderError, Result};
use crate::preprocess;
use async_trait::async_trait;
use book_finder_common::types::{OcrEngineKind, OcrJobConfig};
use image::DynamicImage;
use std::sync::Arc;

const UPLOAD_FILE_NAME: &str = "ocr-crop.jpg";

/// カタログAPI経由のクラウドOCR
///
/// 画像は注目領域で切り出すだけで、それ以外の前処理はしない（JPEG品質90）。
pub struct CloudEngine {
    api: Arc<dyn CatalogApi>,
    service: OcrService,
}

impl CloudEngine {
    pub fn new(api: Arc<dyn CatalogApi>, service: OcrService) -> Self {
        Self { api, service }
    }

    fn failure_message(&self) -> &'static str {
        match self.service {
            OcrService::Vision => "Vision OCR failed. Check API key.",
            OcrService::Space => "OCR.space failed. Check API key.",
        }
    }
}

#[async_trait]
impl OcrEngine for CloudEngine {
    fn kind(&self) -> OcrEngineKind {
        match self.service {
            OcrService::Vision => OcrEngineKind::CloudVision,
            OcrService::Space => OcrEngineKind::CloudOcr,
        }
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        job: &OcrJobConfig,
        progress: &ProgressFn<'_>,
    ) -> Result<String> {
        progress(0);
        let cropped = preprocess::crop_for_upload(image, job.focus_region, job.crop_to_center);
        let jpeg = preprocess::encode_jpeg(&cropped)?;

        let text = self
            .api
            .recognize_text(self.service, jpeg, UPLOAD_FILE_NAME)
            .await
            .map_err(|e| {
                tracing::warn!(service = ?self.service, error = %e, "cloud ocr failed");
                BookFinderError::Ocr {
                    engine: self.kind(),
                    message: self.failure_message().to_string(),
                }
            })?;

        progress(100);
        Ok(text.trim().to_string())
    }
}
