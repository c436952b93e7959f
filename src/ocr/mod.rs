//! OCRエンジン
//!
//! - local: tesseract CLI を呼ぶ端末内認識（複数パス対応）
//! - cloud-vision / cloud-ocr: カタログAPI経由のクラウド認識
//!
//! どのエンジンも 0〜100 の進捗を通知し、前後の空白を除いたテキストを返す。
//! `OcrCapture` は同時に1ジョブだけ実行する。

pub mod cache;
mod cloud;
mod local;

pub use cache::OcrCache;
pub use cloud::CloudEngine;
pub use local::{LocalEngine, OcrPass};

use crate::api::{CatalogApi, OcrService};
use crate::config::Config;
use crate::error::{BookFinderError, Result};
use crate::scanner;
use async_trait::async_trait;
use book_finder_common::types::{OcrEngineKind, OcrJobConfig};
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// 進捗の通知先（0〜100）
pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn kind(&self) -> OcrEngineKind;

    async fn recognize(
        &self,
        image: &DynamicImage,
        job: &OcrJobConfig,
        progress: &ProgressFn<'_>,
    ) -> Result<String>;
}

/// 設定に応じたエンジンを作る
pub fn build_engine(kind: OcrEngineKind, config: &Config, api: Arc<dyn CatalogApi>) -> Arc<dyn OcrEngine> {
    match kind {
        OcrEngineKind::Local => Arc::new(LocalEngine::new(
            config.tesseract_command.clone(),
            config.tesseract_language.clone(),
        )),
        OcrEngineKind::CloudVision => Arc::new(CloudEngine::new(api, OcrService::Vision)),
        OcrEngineKind::CloudOcr => Arc::new(CloudEngine::new(api, OcrService::Space)),
    }
}

/// 実行中フラグを Drop で戻す
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 1回の撮影に対するOCR実行（同時に1ジョブまで）
pub struct OcrCapture {
    engine: Arc<dyn OcrEngine>,
    busy: AtomicBool,
    progress: AtomicU8,
    observer: Option<Arc<ProgressFn<'static>>>,
}

impl OcrCapture {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            busy: AtomicBool::new(false),
            progress: AtomicU8::new(0),
            observer: None,
        }
    }

    /// 進捗を外部（プログレスバー等）にも流す
    pub fn with_observer(mut self, observer: Arc<ProgressFn<'static>>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine_kind(&self) -> OcrEngineKind {
        self.engine.kind()
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    fn report(&self, value: u8) {
        let value = value.min(100);
        self.progress.store(value, Ordering::SeqCst);
        if let Some(observer) = &self.observer {
            observer(value);
        }
    }

    /// OCRを実行する（実行中なら `OcrBusy`）
    pub async fn run(&self, image: &DynamicImage, job: &OcrJobConfig) -> Result<String> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BookFinderError::OcrBusy);
        }
        let _guard = BusyGuard(&self.busy);

        self.report(0);
        let report = |value: u8| self.report(value);
        let text = self.engine.recognize(image, job, &report).await?;
        self.report(100);

        tracing::debug!(engine = %self.engine.kind(), chars = text.len(), "ocr finished");
        Ok(text.trim().to_string())
    }
}

/// 画像ファイルをOCRする（フォルダキャッシュ付き）
///
/// キャッシュキーは画像バイト列とジョブ設定のSHA-256。
pub async fn recognize_file(
    capture: &OcrCapture,
    path: &Path,
    job: &OcrJobConfig,
    use_cache: bool,
) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|_| BookFinderError::FileNotFound(path.display().to_string()))?;
    let folder = path.parent().unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let key = cache::compute_key(&bytes, job);

    let mut cache = if use_cache { Some(OcrCache::load(folder)) } else { None };
    if let Some(text) = cache.as_ref().and_then(|c| c.get(&key)) {
        tracing::debug!(file = %file_name, "ocr cache hit");
        return Ok(text.to_string());
    }

    let image = scanner::load_image(path)?;
    let text = capture.run(&image, job).await?;

    if let Some(cache) = cache.as_mut() {
        cache.insert(key, file_name, bytes.len() as u64, job.engine, text.clone());
        if let Err(e) = cache.save(folder) {
            tracing::warn!(error = %e, "failed to save ocr cache");
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 指定テキストを返すだけのエンジン
    struct StubEngine {
        text: String,
        delay: Duration,
    }

    #[async_trait]
    impl OcrEngine for StubEngine {
        fn kind(&self) -> OcrEngineKind {
            OcrEngineKind::Local
        }

        async fn recognize(
            &self,
            _image: &DynamicImage,
            _job: &OcrJobConfig,
            progress: &ProgressFn<'_>,
        ) -> Result<String> {
            progress(50);
            tokio::time::sleep(self.delay).await;
            Ok(self.text.clone())
        }
    }

    fn stub(text: &str, delay_ms: u64) -> Arc<dyn OcrEngine> {
        Arc::new(StubEngine {
            text: text.to_string(),
            delay: Duration::from_millis(delay_ms),
        })
    }

    #[tokio::test]
    async fn test_run_trims_and_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let capture = OcrCapture::new(stub("  THE HOBBIT\n", 0))
            .with_observer(Arc::new(move |p: u8| sink.lock().unwrap().push(p)));

        let image = DynamicImage::new_luma8(4, 4);
        let text = capture.run(&image, &OcrJobConfig::default()).await.unwrap();

        assert_eq!(text, "THE HOBBIT");
        assert_eq!(*seen.lock().unwrap(), vec![0, 50, 100]);
        assert_eq!(capture.progress(), 100);
        assert!(!capture.is_running());
    }

    #[tokio::test]
    async fn test_second_job_is_rejected_while_running() {
        let capture = Arc::new(OcrCapture::new(stub("text", 50)));
        let image = DynamicImage::new_luma8(4, 4);

        let first = {
            let capture = capture.clone();
            let image = image.clone();
            tokio::spawn(async move { capture.run(&image, &OcrJobConfig::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(capture.is_running());

        let second = capture.run(&image, &OcrJobConfig::default()).await;
        assert!(matches!(second, Err(BookFinderError::OcrBusy)));

        assert_eq!(first.await.unwrap().unwrap(), "text");
        assert!(!capture.is_running());

        // 終了後は再実行できる
        assert!(capture.run(&image, &OcrJobConfig::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_recognize_file_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.png");
        image::GrayImage::new(4, 4).save(&path).unwrap();
        let job = OcrJobConfig::default();

        let first = OcrCapture::new(stub("KAMBING JANTAN", 0));
        let text = recognize_file(&first, &path, &job, true).await.unwrap();
        assert_eq!(text, "KAMBING JANTAN");
        assert!(OcrCache::cache_path(dir.path()).exists());

        // 別のテキストを返すエンジンでもキャッシュが使われる
        let second = OcrCapture::new(stub("something else", 0));
        let cached = recognize_file(&second, &path, &job, true).await.unwrap();
        assert_eq!(cached, "KAMBING JANTAN");

        let fresh = recognize_file(&second, &path, &job, false).await.unwrap();
        assert_eq!(fresh, "something else");
    }

    #[tokio::test]
    async fn test_recognize_missing_file() {
        let capture = OcrCapture::new(stub("x", 0));
        let result = recognize_file(&capture, Path::new("/nonexistent/c.jpg"), &OcrJobConfig::default(), false).await;
        assert!(matches!(result, Err(BookFinderError::FileNotFound(_))));
    }
}
