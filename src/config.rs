use crate::error::{BookFinderError, Result};
use book_finder_common::query::{DEFAULT_AUTHOR_PATTERNS, DEFAULT_STOPWORDS};
use book_finder_common::types::OcrEngineKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_API_BASE_URL: &str = "BOOK_FINDER_API_BASE_URL";
pub const ENV_TOKEN: &str = "BOOK_FINDER_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub token: Option<String>,
    pub default_engine: OcrEngineKind,
    pub search_limit: u32,
    pub timeout_seconds: u64,
    /// tesseract実行ファイル
    pub tesseract_command: String,
    pub tesseract_language: String,
    /// スキャンループの周期（ミリ秒）
    pub scan_interval_ms: u64,
    /// 著者行の判定パターン（正規表現、大文字小文字無視）
    pub author_patterns: Vec<String>,
    /// OCRテキストから除去するノイズ語
    pub stopwords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".into(),
            token: None,
            default_engine: OcrEngineKind::CloudVision,
            search_limit: 10,
            timeout_seconds: 30,
            tesseract_command: "tesseract".into(),
            tesseract_language: "eng+ind".into(),
            scan_interval_ms: 200,
            author_patterns: DEFAULT_AUTHOR_PATTERNS.iter().map(|s| s.to_string()).collect(),
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| BookFinderError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("book-finder").join("config.json"))
    }

    /// APIのベースURL（環境変数を優先、末尾の `/` は除く）
    pub fn api_base_url(&self) -> String {
        let base = std::env::var(ENV_API_BASE_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.api_base_url.clone());
        base.trim().trim_end_matches('/').to_string()
    }

    pub fn get_token(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.trim().is_empty() {
                return Ok(token);
            }
        }

        self.token.clone().ok_or(BookFinderError::MissingApiToken)
    }

    pub fn set_token(&mut self, token: String) -> Result<()> {
        self.token = Some(token);
        self.save()
    }

    pub fn set_api_base_url(&mut self, url: String) -> Result<()> {
        self.api_base_url = url;
        self.save()
    }
}
