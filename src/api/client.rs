use super::{
    BookEnvelope, CatalogApi, DataEnvelope, HoldingEnvelope, OcrService, SearchOptions,
    TextEnvelope,
};
use crate::config::Config;
use crate::error::{BookFinderError, Result};
use async_trait::async_trait;
use book_finder_common::types::{
    Book, BookshelfFilter, BookshelfPage, Candidate, HoldingInfo, Location, LookupResponse,
    NewBook, NewHolding,
};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = concat!("book-finder/", env!("CARGO_PKG_VERSION"));

/// HTTP版カタログAPIクライアント（Bearerトークン付き）
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| BookFinderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// 設定から生成する（トークン未設定ならヘッダなしで送る）
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.api_base_url(),
            config.get_token().ok(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(request_error(status, &text));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// 非2xxレスポンスのエラー（本文が空なら `Request failed: <status>`）
pub(crate) fn request_error(status: StatusCode, body: &str) -> BookFinderError {
    let message = if body.trim().is_empty() {
        format!("Request failed: {}", status.as_u16())
    } else {
        body.trim().to_string()
    };
    BookFinderError::Request {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl CatalogApi for HttpCatalogClient {
    async fn lookup_isbn(&self, isbn: &str) -> Result<LookupResponse> {
        let url = self.url(&format!("/api/books/by-isbn/{}", isbn));
        tracing::debug!(isbn = %isbn, url = %url, "looking up ISBN");
        self.send_json(self.http_client.get(&url)).await
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let url = self.url("/api/books/search");
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string())];
        if options.force_external {
            params.push(("force_external", "true".to_string()));
        }
        if let Some(limit) = options.limit {
            params.push(("limit", limit.to_string()));
        }

        tracing::debug!(query = %query, ?options, "searching catalog");
        let envelope: DataEnvelope<Candidate> =
            self.send_json(self.http_client.get(&url).query(&params)).await?;
        Ok(envelope.data)
    }

    async fn create_book(&self, book: &NewBook) -> Result<Book> {
        let url = self.url("/api/books");
        let envelope: BookEnvelope = self.send_json(self.http_client.post(&url).json(book)).await?;
        tracing::info!(book_id = envelope.book.id, title = %envelope.book.title, "book created");
        Ok(envelope.book)
    }

    async fn update_book(&self, book_id: i64, book: &NewBook) -> Result<Book> {
        let url = self.url(&format!("/api/books/{}", book_id));
        let envelope: BookEnvelope = self.send_json(self.http_client.put(&url).json(book)).await?;
        tracing::info!(book_id, title = %envelope.book.title, "book updated");
        Ok(envelope.book)
    }

    async fn list_bookshelf(&self, filter: &BookshelfFilter) -> Result<BookshelfPage> {
        let url = self.url("/api/bookshelf");
        let params = filter.query_params();
        tracing::debug!(?params, "loading bookshelf");
        self.send_json(self.http_client.get(&url).query(&params)).await
    }

    async fn add_holding(&self, book_id: i64, holding: &NewHolding) -> Result<HoldingInfo> {
        let url = self.url(&format!("/api/books/{}/holdings", book_id));
        let envelope: HoldingEnvelope =
            self.send_json(self.http_client.post(&url).json(holding)).await?;
        tracing::info!(book_id, holding = %envelope.holding.summary(), "holding added");
        Ok(envelope.holding)
    }

    async fn update_holding(&self, holding_id: i64, holding: &NewHolding) -> Result<HoldingInfo> {
        let url = self.url(&format!("/api/holdings/{}", holding_id));
        let envelope: HoldingEnvelope =
            self.send_json(self.http_client.put(&url).json(holding)).await?;
        Ok(envelope.holding)
    }

    async fn delete_holding(&self, holding_id: i64) -> Result<()> {
        let url = self.url(&format!("/api/holdings/{}", holding_id));
        self.send(self.http_client.delete(&url)).await?;
        Ok(())
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<Location>> {
        let url = self.url("/api/locations");
        let envelope: DataEnvelope<Location> = self
            .send_json(self.http_client.get(&url).query(&[("search", query)]))
            .await?;
        Ok(envelope.data)
    }

    async fn recognize_text(&self, service: OcrService, jpeg: Vec<u8>, file_name: &str) -> Result<String> {
        let url = self.url(service.path());
        let part = Part::bytes(jpeg)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new().part("image", part);

        let envelope: TextEnvelope = self
            .send_json(self.http_client.post(&url).multipart(form))
            .await?;
        Ok(envelope.text.trim().to_string())
    }
}
