//! OCR結果キャッシュ
//!
//! 画像バイト列とジョブ設定のSHA-256をキーにして認識結果を保存し、
//! 同じ画像の再認識をスキップする。

use crate::error::Result;
use book_finder_common::types::{OcrEngineKind, OcrJobConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const CACHE_FILE_NAME: &str = ".ocr-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キー → 認識結果
    entries: HashMap<String, OcrCacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrCacheEntry {
    pub file_name: String,
    pub file_size: u64,
    pub engine: OcrEngineKind,
    pub text: String,
    pub cached_at: DateTime<Utc>,
}

impl OcrCache {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（無い・壊れている・版違いなら空）
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, OcrCache>(reader) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(cache) => {
                tracing::warn!(
                    found = cache.version,
                    expected = Self::CURRENT_VERSION,
                    "ocr cache version mismatch, starting fresh"
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %cache_path.display(), error = %e, "ocr cache unreadable");
                Self::default()
            }
        }
    }

    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::create(Self::cache_path(folder))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除（存在しなければ false）
    pub fn clear(folder: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(cache_path)?;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.text.as_str())
    }

    pub fn insert(
        &mut self,
        key: String,
        file_name: String,
        file_size: u64,
        engine: OcrEngineKind,
        text: String,
    ) {
        self.entries.insert(
            key,
            OcrCacheEntry {
                file_name,
                file_size,
                engine,
                text,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &OcrCacheEntry> {
        self.entries.values()
    }
}

impl Default for OcrCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// キャッシュキー（画像バイト列 + エンジン・領域・切り出し設定）
pub fn compute_key(bytes: &[u8], job: &OcrJobConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let settings = format!("\0{}\0{}\0{}", job.engine, job.focus_region, job.crop_to_center);
    hasher.update(settings.as_bytes());
    hex::encode(hasher.finalize())
}
