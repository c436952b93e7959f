//! バーコードのスキャンループ
//!
//! 状態は `idle | running`。`start` でカメラを取得してデコーダを選び、
//! 「フレーム取得 → 検出 → 通知 → 待機」を `stop` まで繰り返す。
//! カメラとデコーダはループのタスク内のガードが所有し、
//! 正常終了・停止・中断のどの経路でもガードの Drop で解放される。

use super::{BarcodeDecoder, BarcodeHit, DecoderChoice, MultiFormatDecoder};
use crate::camera::{CameraProvider, FacingMode, FrameSource};
use crate::error::{BookFinderError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// 入力モード（手入力に切り替えるとスキャンは止まる）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanMode {
    #[default]
    Camera,
    Manual,
}

#[derive(Debug, Clone)]
pub struct ScanLoopConfig {
    pub facing: FacingMode,
    pub interval: Duration,
    pub decoder: DecoderChoice,
}

impl Default for ScanLoopConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            interval: Duration::from_millis(200),
            decoder: DecoderChoice::Auto,
        }
    }
}

/// ループが終わった理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEnd {
    Cancelled,
    /// ストリームが終わった
    Exhausted,
    /// カメラが失敗した
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub decoder: &'static str,
    pub frames: u64,
    pub hits: u64,
    pub end: ScanEnd,
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<ScanSummary>,
}

/// カメラとデコーダの所有者（Drop で必ず解放）
struct LoopResources {
    source: Box<dyn FrameSource>,
    decoder: Box<dyn BarcodeDecoder>,
}

impl Drop for LoopResources {
    fn drop(&mut self) {
        self.source.stop();
        self.decoder.release();
        tracing::debug!(decoder = self.decoder.name(), "scan resources released");
    }
}

pub struct ScanLoop {
    provider: Arc<dyn CameraProvider>,
    config: ScanLoopConfig,
    mode: ScanMode,
    running: Option<RunningLoop>,
}

impl ScanLoop {
    pub fn new(provider: Arc<dyn CameraProvider>, config: ScanLoopConfig) -> Self {
        Self {
            provider,
            config,
            mode: ScanMode::Camera,
            running: None,
        }
    }

    pub fn state(&self) -> LoopState {
        match &self.running {
            Some(running) if !running.task.is_finished() => LoopState::Running,
            _ => LoopState::Idle,
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// スキャンを開始する
    ///
    /// すでに動いていれば何もしない。カメラを取得できなければ `CameraAccess` を返し、
    /// 状態は `idle` のまま。
    pub async fn start<F>(&mut self, mut on_hit: F) -> Result<()>
    where
        F: FnMut(BarcodeHit) + Send + 'static,
    {
        if self.state() == LoopState::Running {
            tracing::debug!("scan loop already running");
            return Ok(());
        }
        // 終了済みのタスクが残っていれば片付ける
        self.stop();

        let mut decoder = self.select_decoder()?;
        let source = match self.provider.open(self.config.facing).await {
            Ok(source) => source,
            Err(e) => {
                decoder.release();
                return Err(e);
            }
        };
        let decoder_name = decoder.name();
        tracing::info!(decoder = decoder_name, "scan loop started");

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let interval = self.config.interval;

        let task = tokio::spawn(async move {
            let mut resources = LoopResources { source, decoder };
            let mut summary = ScanSummary {
                decoder: decoder_name,
                frames: 0,
                hits: 0,
                end: ScanEnd::Cancelled,
            };

            loop {
                let frame = tokio::select! {
                    _ = cancelled.cancelled() => break,
                    frame = resources.source.next_frame() => frame,
                };

                let frame = match frame {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        summary.end = ScanEnd::Exhausted;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "camera stream failed");
                        summary.end = ScanEnd::Failed(e.to_string());
                        break;
                    }
                };
                summary.frames += 1;

                match resources.decoder.decode(&frame.image) {
                    Ok(hits) => {
                        for hit in hits {
                            summary.hits += 1;
                            on_hit(hit);
                        }
                    }
                    // フレーム単位の失敗はノイズとして捨てる
                    Err(e) => tracing::trace!(sequence = frame.sequence, error = %e, "decode failed"),
                }

                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            drop(resources);
            summary
        });

        self.running = Some(RunningLoop { token, task });
        Ok(())
    }

    /// スキャンを止める（何度呼んでもよい）
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.token.cancel();
            running.task.abort();
            tracing::info!("scan loop stopped");
        }
    }

    /// ループの終了を待つ（停止済み・中断された場合は None）
    pub async fn wait(&mut self) -> Option<ScanSummary> {
        let running = self.running.take()?;
        match running.task.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::debug!(error = %e, "scan loop task ended without summary");
                None
            }
        }
    }

    /// 入力モードを切り替える（手入力にするとスキャンを止める）
    pub fn switch_mode(&mut self, mode: ScanMode) {
        if mode == ScanMode::Manual {
            self.stop();
        }
        self.mode = mode;
    }

    fn select_decoder(&self) -> Result<Box<dyn BarcodeDecoder>> {
        match self.config.decoder {
            DecoderChoice::Auto => Ok(self
                .provider
                .native_detector()
                .unwrap_or_else(|| Box::new(MultiFormatDecoder::new()))),
            DecoderChoice::Native => self.provider.native_detector().ok_or_else(|| {
                BookFinderError::CameraAccess("ネイティブのバーコード検出が使えません".into())
            }),
            DecoderChoice::Multi => Ok(Box::new(MultiFormatDecoder::new())),
        }
    }
}

impl Drop for ScanLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
