//! tesseract CLI による端末内OCR
//!
//! パスごとに前処理を変えて認識し、結果を改行で連結する。
//! 前処理は rayon で並列に済ませ、認識は1パスずつ順に実行する。

use super::{OcrEngine, ProgressFn};
use crate::error::{BookFinderError, Result};
use crate::preprocess::{self, PrepareOptions};
use async_trait::async_trait;
use book_finder_common::types::{FocusRegion, OcrEngineKind, OcrJobConfig};
use image::{DynamicImage, GrayImage, ImageFormat};
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::io::Cursor;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

lazy_static! {
    static ref BLANK_LINES: Regex = Regex::new(r"\n\s*\n+").unwrap();
}

/// 1回分の認識設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcrPass {
    /// 注目領域（None ならジョブの設定に従う）
    pub focus: Option<FocusRegion>,
    /// tesseract の page segmentation mode
    pub psm: u8,
    pub binarize: bool,
    pub contrast: u32,
}

impl Default for OcrPass {
    fn default() -> Self {
        Self {
            focus: None,
            psm: 6,
            binarize: false,
            contrast: 150,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalEngine {
    command: String,
    language: String,
    passes: Vec<OcrPass>,
}

impl LocalEngine {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
            passes: vec![OcrPass::default()],
        }
    }

    pub fn with_passes(mut self, passes: Vec<OcrPass>) -> Self {
        if !passes.is_empty() {
            self.passes = passes;
        }
        self
    }

    pub fn passes(&self) -> &[OcrPass] {
        &self.passes
    }

    fn failure(message: impl Into<String>) -> BookFinderError {
        BookFinderError::Ocr {
            engine: OcrEngineKind::Local,
            message: message.into(),
        }
    }

    /// 全パスの前処理（並列）
    fn prepare_all(&self, image: &DynamicImage, job: &OcrJobConfig) -> Vec<GrayImage> {
        self.passes
            .par_iter()
            .map(|pass| {
                let options = PrepareOptions {
                    focus: pass.focus.unwrap_or(job.focus_region),
                    crop_to_center: job.crop_to_center,
                    contrast_percent: pass.contrast,
                    binarize: pass.binarize,
                };
                preprocess::prepare(image, &options)
            })
            .collect()
    }

    async fn run_tesseract(&self, pass: &OcrPass, png: &[u8]) -> Result<String> {
        let psm = pass.psm.to_string();
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "--psm", psm.as_str(), "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::failure(format!("tesseract を起動できません ({}): {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(png)
                .await
                .map_err(|e| Self::failure(format!("tesseract に画像を渡せません: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Self::failure(format!("tesseract の終了を待てません: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(code = ?output.status.code(), stderr = %stderr.trim(), "tesseract failed");
            return Err(Self::failure("OCR failed. Try again."));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn encode_png(gray: GrayImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(gray).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// パス結果を連結して空行をまとめる
pub(crate) fn combine_passes(texts: &[String]) -> String {
    let joined = texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_LINES.replace_all(&joined, "\n").trim().to_string()
}

#[async_trait]
impl OcrEngine for LocalEngine {
    fn kind(&self) -> OcrEngineKind {
        OcrEngineKind::Local
    }

    async fn recognize(
        &self,
        image: &DynamicImage,
        job: &OcrJobConfig,
        progress: &ProgressFn<'_>,
    ) -> Result<String> {
        let engine = self.clone();
        let source = image.clone();
        let job_config = *job;
        let prepared = tokio::task::spawn_blocking(move || engine.prepare_all(&source, &job_config))
            .await
            .map_err(|e| Self::failure(e.to_string()))?;

        let total = self.passes.len();
        let mut texts = Vec::with_capacity(total);
        for (i, (pass, gray)) in self.passes.iter().zip(prepared).enumerate() {
            progress((i * 100 / total) as u8);
            let png = encode_png(gray).map_err(|e| Self::failure(e.to_string()))?;
            let text = self.run_tesseract(pass, &png).await?;
            tracing::debug!(pass = i + 1, psm = pass.psm, chars = text.len(), "ocr pass done");
            texts.push(text);
        }

        Ok(combine_passes(&texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_single_pass() {
        let engine = LocalEngine::new("tesseract", "eng");
        assert_eq!(
            engine.passes(),
            &[OcrPass { focus: None, psm: 6, binarize: false, contrast: 150 }]
        );
        // 空のパス指定は無視
        let engine = engine.with_passes(Vec::new());
        assert_eq!(engine.passes().len(), 1);
    }

    #[test]
    fn test_prepare_all_one_image_per_pass() {
        let engine = LocalEngine::new("tesseract", "eng").with_passes(vec![
            OcrPass::default(),
            OcrPass { focus: Some(FocusRegion::Title), psm: 7, binarize: true, contrast: 200 },
        ]);
        let image = DynamicImage::new_rgb8(100, 200);
        let prepared = engine.prepare_all(&image, &OcrJobConfig::default());
        assert_eq!(prepared.len(), 2);
        assert_eq!(prepared[0].dimensions(), (100, 200));
        assert_eq!(prepared[1].dimensions(), (100, 90));
    }

    #[test]
    fn test_combine_passes() {
        let texts = vec![
            "THE HOBBIT\n\n\nby J.R.R. Tolkien".to_string(),
            "  ".to_string(),
            "HOBBIT".to_string(),
        ];
        assert_eq!(combine_passes(&texts), "THE HOBBIT\nby J.R.R. Tolkien\nHOBBIT");
    }

    #[tokio::test]
    async fn test_missing_binary_is_ocr_failure() {
        let engine = LocalEngine::new("book-finder-no-such-tesseract", "eng");
        let image = DynamicImage::new_luma8(8, 8);
        let result = engine.recognize(&image, &OcrJobConfig::default(), &|_| {}).await;
        assert!(matches!(
            result,
            Err(BookFinderError::Ocr { engine: OcrEngineKind::Local, .. })
        ));
    }

    /// 標準入力を読まずに終了するコマンドでも OCR の失敗として返る
    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_exiting_early_is_ocr_failure() {
        let engine = LocalEngine::new("false", "eng");
        let image = DynamicImage::new_rgb8(400, 600);
        let result = engine.recognize(&image, &OcrJobConfig::default(), &|_| {}).await;
        assert!(matches!(
            result,
            Err(BookFinderError::Ocr { engine: OcrEngineKind::Local, .. })
        ));
    }
}
