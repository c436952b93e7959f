//! book-finder-rust
//!
//! 書籍のバーコード・表紙写真からカタログの書籍を特定し、所蔵を登録する。
//! 登録済みの本棚は一覧・編集・表紙取得ができる。

pub mod api;
pub mod barcode;
pub mod bookshelf;
pub mod camera;
pub mod cataloger;
pub mod cli;
pub mod config;
pub mod error;
pub mod interactive;
pub mod ocr;
pub mod preprocess;
pub mod resolver;
pub mod scanner;

pub use book_finder_common::types;
pub use cataloger::Cataloger;
pub use error::{BookFinderError, Result};
