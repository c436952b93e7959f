use book_finder_common::types::OcrEngineKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookFinderError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIトークンが設定されていません。`book-finder config --set-token YOUR_TOKEN` で設定してください")]
    MissingApiToken,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("カメラを開けません: {0}")]
    CameraAccess(String),

    #[error("OCR失敗 ({engine}): {message}")]
    Ocr { engine: OcrEngineKind, message: String },

    #[error("OCRは実行中です")]
    OcrBusy,

    #[error("検索失敗: {0}")]
    Search(String),

    #[error("保存失敗: {0}")]
    Save(String),

    #[error("{message}")]
    Request { status: u16, message: String },

    #[error("入力エラー: {0}")]
    Prompt(String),

    #[error("通信エラー: {0}")]
    Network(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] book_finder_common::Error),
}

impl BookFinderError {
    /// ユーザーに見せる短いメッセージ（行・ダイアログ表示用）
    pub fn user_message(&self) -> String {
        match self {
            BookFinderError::Request { message, .. } => message.clone(),
            BookFinderError::Ocr { message, .. } => message.clone(),
            BookFinderError::Search(message) | BookFinderError::Save(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for BookFinderError {
    fn from(e: reqwest::Error) -> Self {
        BookFinderError::Network(e.to_string())
    }
}

impl From<dialoguer::Error> for BookFinderError {
    fn from(e: dialoguer::Error) -> Self {
        BookFinderError::Prompt(e.to_string())
    }
}

impl From<image::ImageError> for BookFinderError {
    fn from(e: image::ImageError) -> Self {
        BookFinderError::ImageLoad(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BookFinderError>;
