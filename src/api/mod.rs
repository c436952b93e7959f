//! カタログAPI
//!
//! 書籍・所蔵・保管場所のCRUD、本棚一覧、OCRエンドポイントは外部のREST APIが持つ。
//! パイプラインは `CatalogApi` だけに依存し、HTTP実装は `HttpCatalogClient`。

mod client;

pub use client::HttpCatalogClient;

use crate::error::Result;
use async_trait::async_trait;
use book_finder_common::types::{
    Book, BookshelfFilter, BookshelfPage, Candidate, HoldingInfo, Location, LookupResponse,
    NewBook, NewHolding,
};
use serde::Deserialize;

/// 検索オプション（`force_external` / `limit`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub force_external: bool,
    pub limit: Option<u32>,
}

/// サーバ側のOCRサービス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrService {
    Vision,
    Space,
}

impl OcrService {
    pub fn path(&self) -> &'static str {
        match self {
            OcrService::Vision => "/api/ocr/vision",
            OcrService::Space => "/api/ocr/space",
        }
    }
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// `GET /api/books/by-isbn/{isbn}`
    async fn lookup_isbn(&self, isbn: &str) -> Result<LookupResponse>;

    /// `GET /api/books/search?q=...`
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Candidate>>;

    /// `POST /api/books`
    async fn create_book(&self, book: &NewBook) -> Result<Book>;

    /// `PUT /api/books/{id}`
    async fn update_book(&self, book_id: i64, book: &NewBook) -> Result<Book>;

    /// `GET /api/bookshelf?title=&author=&isbn=&location=&shelf=&limit=&offset=`
    async fn list_bookshelf(&self, filter: &BookshelfFilter) -> Result<BookshelfPage>;

    /// `POST /api/books/{id}/holdings`
    async fn add_holding(&self, book_id: i64, holding: &NewHolding) -> Result<HoldingInfo>;

    /// `PUT /api/holdings/{id}`
    async fn update_holding(&self, holding_id: i64, holding: &NewHolding) -> Result<HoldingInfo>;

    /// `DELETE /api/holdings/{id}`
    async fn delete_holding(&self, holding_id: i64) -> Result<()>;

    /// `GET /api/locations?search=...`
    async fn search_locations(&self, query: &str) -> Result<Vec<Location>>;

    /// `POST /api/ocr/vision` / `POST /api/ocr/space`（multipart の `image`）
    async fn recognize_text(&self, service: OcrService, jpeg: Vec<u8>, file_name: &str) -> Result<String>;
}

// ワイヤ上の包み

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookEnvelope {
    pub book: Book,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HoldingEnvelope {
    pub holding: HoldingInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextEnvelope {
    #[serde(default)]
    pub text: String,
}
