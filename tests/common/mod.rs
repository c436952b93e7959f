//! テスト用のカタログAPI
//!
//! 応答を事前に登録しておき、呼び出しを記録する。未登録のISBNは「カタログになし」、
//! 未登録のクエリは0件を返す。

#![allow(dead_code)]

use async_trait::async_trait;
use book_finder_common::types::{
    Book, BookshelfEntry, BookshelfFilter, BookshelfHolding, BookshelfPage, Candidate,
    CandidateSource, HoldingInfo, Location, LookupResponse, NewBook, NewHolding, Paging,
};
use book_finder_rust::api::{CatalogApi, OcrService, SearchOptions};
use book_finder_rust::error::{BookFinderError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// 登録する応答
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(u16, String),
}

impl<T: Clone> Reply<T> {
    fn get(&self) -> Result<T> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::Fail(status, message) => Err(BookFinderError::Request {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Default)]
pub struct ScriptedCatalog {
    lookups: Mutex<HashMap<String, Reply<LookupResponse>>>,
    lookup_delays: Mutex<HashMap<String, Duration>>,
    searches: Mutex<HashMap<String, Reply<Vec<Candidate>>>>,
    search_delays: Mutex<HashMap<String, Duration>>,
    create_reply: Mutex<Option<Reply<Book>>>,
    update_book_reply: Mutex<Option<Reply<Book>>>,
    bookshelf: Mutex<Vec<BookshelfEntry>>,
    bookshelf_failure: Mutex<Option<Reply<()>>>,
    holding_reply: Mutex<Option<Reply<HoldingInfo>>>,
    locations: Mutex<Vec<Location>>,
    ocr_text: Mutex<Option<Reply<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(self, isbn: &str, reply: Reply<LookupResponse>) -> Self {
        self.lookups.lock().unwrap().insert(isbn.to_string(), reply);
        self
    }

    pub fn with_lookup_delay(self, isbn: &str, delay: Duration) -> Self {
        self.lookup_delays.lock().unwrap().insert(isbn.to_string(), delay);
        self
    }

    pub fn with_search(self, query: &str, reply: Reply<Vec<Candidate>>) -> Self {
        self.searches.lock().unwrap().insert(query.to_string(), reply);
        self
    }

    pub fn with_search_delay(self, query: &str, delay: Duration) -> Self {
        self.search_delays.lock().unwrap().insert(query.to_string(), delay);
        self
    }

    pub fn with_create_reply(self, reply: Reply<Book>) -> Self {
        *self.create_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_update_book_reply(self, reply: Reply<Book>) -> Self {
        *self.update_book_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_bookshelf(self, entries: Vec<BookshelfEntry>) -> Self {
        *self.bookshelf.lock().unwrap() = entries;
        self
    }

    pub fn with_bookshelf_failure(self, status: u16, message: &str) -> Self {
        *self.bookshelf_failure.lock().unwrap() = Some(Reply::Fail(status, message.to_string()));
        self
    }

    pub fn with_holding_reply(self, reply: Reply<HoldingInfo>) -> Self {
        *self.holding_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_locations(self, locations: Vec<Location>) -> Self {
        *self.locations.lock().unwrap() = locations;
        self
    }

    pub fn with_ocr_text(self, reply: Reply<String>) -> Self {
        *self.ocr_text.lock().unwrap() = Some(reply);
        self
    }

    /// 記録された呼び出し（`lookup:<isbn>` / `search:<q>` など）
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// 指定した種類の呼び出しだけ
    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{}:", kind);
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CatalogApi for ScriptedCatalog {
    async fn lookup_isbn(&self, isbn: &str) -> Result<LookupResponse> {
        self.record(format!("lookup:{}", isbn));
        let delay = self.lookup_delays.lock().unwrap().get(isbn).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.lookups.lock().unwrap().get(isbn).cloned();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(not_found(isbn)),
        }
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<Candidate>> {
        let suffix = if options.force_external { " [external]" } else { "" };
        self.record(format!("search:{}{}", query, suffix));
        let delay = self.search_delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.searches.lock().unwrap().get(query).cloned();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(Vec::new()),
        }
    }

    async fn create_book(&self, book: &NewBook) -> Result<Book> {
        self.record(format!("create:{}", book.isbn));
        let reply = self.create_reply.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(Book {
                id: 100,
                isbn: book.isbn.clone(),
                title: book.title.clone(),
                author: book.author.clone(),
                cover_url: book.cover_url.clone(),
            }),
        }
    }

    async fn update_book(&self, book_id: i64, book: &NewBook) -> Result<Book> {
        self.record(format!("update_book:{}", book_id));
        let reply = self.update_book_reply.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(Book {
                id: book_id,
                isbn: book.isbn.clone(),
                title: book.title.clone(),
                author: book.author.clone(),
                cover_url: book.cover_url.clone(),
            }),
        }
    }

    async fn list_bookshelf(&self, filter: &BookshelfFilter) -> Result<BookshelfPage> {
        let query = filter
            .query_params()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        self.record(format!("bookshelf:{}", query));
        let failure = self.bookshelf_failure.lock().unwrap().clone();
        if let Some(reply) = failure {
            reply.get()?;
        }

        let contains = |value: &str, wanted: &str| {
            wanted.trim().is_empty() || value.to_lowercase().contains(&wanted.trim().to_lowercase())
        };
        let matched: Vec<BookshelfEntry> = self
            .bookshelf
            .lock()
            .unwrap()
            .iter()
            .filter(|e| contains(&e.title, &filter.title))
            .filter(|e| contains(&e.author, &filter.author))
            .filter(|e| contains(&e.isbn, &filter.isbn))
            .filter(|e| {
                filter.location.trim().is_empty()
                    || e.holdings.iter().any(|h| contains(&h.location, &filter.location))
            })
            .filter(|e| {
                filter.shelf.trim().is_empty() || e.holdings.iter().any(|h| contains(&h.shelf, &filter.shelf))
            })
            .cloned()
            .collect();

        let total = matched.len() as u32;
        let data = matched
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok(BookshelfPage {
            data,
            paging: Paging {
                limit: filter.limit,
                offset: filter.offset,
                total,
            },
        })
    }

    async fn add_holding(&self, book_id: i64, holding: &NewHolding) -> Result<HoldingInfo> {
        self.record(format!("holding:{}", book_id));
        let reply = self.holding_reply.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(holding_info(holding)),
        }
    }

    async fn update_holding(&self, holding_id: i64, holding: &NewHolding) -> Result<HoldingInfo> {
        self.record(format!("update:{}", holding_id));
        let mut info = holding_info(holding);
        info.id = Some(holding_id);
        Ok(info)
    }

    async fn delete_holding(&self, holding_id: i64) -> Result<()> {
        self.record(format!("delete:{}", holding_id));
        Ok(())
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<Location>> {
        self.record(format!("locations:{}", query));
        let locations = self.locations.lock().unwrap().clone();
        let query = query.to_lowercase();
        Ok(locations
            .into_iter()
            .filter(|l| l.name.to_lowercase().contains(&query))
            .collect())
    }

    async fn recognize_text(&self, service: OcrService, _jpeg: Vec<u8>, file_name: &str) -> Result<String> {
        self.record(format!("ocr:{}:{}", service.path(), file_name));
        let reply = self.ocr_text.lock().unwrap().clone();
        match reply {
            Some(reply) => reply.get(),
            None => Ok(String::new()),
        }
    }
}

fn holding_info(holding: &NewHolding) -> HoldingInfo {
    HoldingInfo {
        id: Some(1),
        location_id: Some(holding.location_id),
        location_name: format!("Loc{}", holding.location_id),
        shelf_number: holding.shelf_number.clone(),
        qty: holding.qty,
    }
}

pub fn book(id: i64, isbn: &str, title: &str, author: &str) -> Book {
    Book {
        id,
        isbn: isbn.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        cover_url: None,
    }
}

pub fn found(book: Book, holdings: Vec<HoldingInfo>) -> LookupResponse {
    LookupResponse {
        found: true,
        normalized_isbn: Some(book.isbn.clone()),
        book: Some(book),
        holdings,
    }
}

pub fn not_found(isbn: &str) -> LookupResponse {
    LookupResponse {
        found: false,
        book: None,
        holdings: Vec::new(),
        normalized_isbn: Some(isbn.to_string()),
    }
}

pub fn candidate(title: &str, author: &str, source: CandidateSource) -> Candidate {
    Candidate {
        title: title.to_string(),
        author: author.to_string(),
        isbn: None,
        source,
        cover_url: None,
        catalog_book_id: None,
        holdings: Vec::new(),
    }
}

pub fn location(id: i64, name: &str) -> Location {
    Location {
        id,
        name: name.to_string(),
    }
}

pub fn shelf_entry(book_id: i64, isbn: &str, title: &str, author: &str, holdings: Vec<BookshelfHolding>) -> BookshelfEntry {
    BookshelfEntry {
        book_id,
        isbn: isbn.to_string(),
        title: title.to_string(),
        author: author.to_string(),
        cover_url: None,
        total_qty: holdings.iter().map(|h| h.qty).sum(),
        holdings,
    }
}

pub fn shelf_holding(id: i64, location: &str, shelf: &str, qty: u32) -> BookshelfHolding {
    BookshelfHolding {
        id,
        location_id: id,
        location: location.to_string(),
        shelf: shelf.to_string(),
        qty,
    }
}
