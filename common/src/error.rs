//! エラー型定義

use crate::types::{RowId, ScanStatus};
use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid ISBN. Enter 10 or 13 digits.")]
    InvalidIsbn(String),

    #[error("{0}")]
    Validation(String),

    #[error("ISBN is required to search.")]
    EmptyQuery,

    #[error("Unknown row: {0}")]
    UnknownRow(RowId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
