//! カメラ（フレーム供給元）の抽象
//!
//! - `CameraProvider`: 向きを指定してストリームを取得する。ネイティブ検出器があれば提供する
//! - `FrameSource`: フレームを順に返すストリーム。`stop` は何度呼んでもよい
//! - `FolderCamera`: 撮影済み画像のフォルダを再生する実装

mod folder;

pub use folder::{FolderCamera, FolderStream};

use crate::barcode::BarcodeDecoder;
use crate::error::Result;
use async_trait::async_trait;
use image::GrayImage;
use std::path::PathBuf;

/// カメラの向き
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FacingMode {
    /// 背面（バーコード読み取りの既定）
    #[default]
    Environment,
    User,
}

/// 1フレーム
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub image: GrayImage,
    pub path: Option<PathBuf>,
}

#[async_trait]
pub trait FrameSource: Send {
    /// 次のフレーム（ストリーム終了・停止済みなら None）
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// トラックを止める（複数回呼ばれてもよい）
    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// ストリームを取得する（権限・デバイスの失敗は `CameraAccess`）
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn FrameSource>>;

    /// 実行環境のネイティブ検出器（なければ None）
    fn native_detector(&self) -> Option<Box<dyn BarcodeDecoder>> {
        None
    }
}
