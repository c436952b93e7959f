//! 本棚（登録済み書籍）の一覧・編集・表紙取得
//!
//! - 一覧: タイトル・著者・ISBN・場所・棚で絞り込み、50件ずつページング
//! - 編集: ISBN・タイトル・著者を `PUT /api/books/{id}` で更新
//! - 表紙取得: 外部ソースを強制して検索し、最初に表紙URLを持つ候補で書籍を更新

use crate::api::{CatalogApi, SearchOptions};
use crate::error::{BookFinderError, Result};
use book_finder_common::forms::BookForm;
use book_finder_common::isbn;
use book_finder_common::types::{Book, BookshelfEntry, BookshelfFilter, BookshelfPage, NewBook};

/// 表紙検索で見る候補数
const COVER_SEARCH_LIMIT: u32 = 5;

/// 1ページ分を取得する
pub async fn browse(api: &dyn CatalogApi, filter: &BookshelfFilter) -> Result<BookshelfPage> {
    api.list_bookshelf(filter).await.map_err(|e| {
        tracing::warn!(error = %e, "bookshelf load failed");
        BookFinderError::Search("Failed to load bookshelf items.".into())
    })
}

/// ISBNで本棚の1冊を探す（完全一致のみ）
pub async fn find_by_isbn(api: &dyn CatalogApi, raw_isbn: &str) -> Result<Option<BookshelfEntry>> {
    let wanted = match isbn::normalize(raw_isbn) {
        normalized if normalized.is_empty() => raw_isbn.trim().to_string(),
        normalized => normalized,
    };
    let filter = BookshelfFilter {
        isbn: wanted.clone(),
        ..BookshelfFilter::default()
    };
    let page = browse(api, &filter).await?;
    Ok(page
        .data
        .into_iter()
        .find(|entry| entry.isbn.trim() == wanted || isbn::normalize(&entry.isbn) == wanted))
}

/// 編集フォームの初期値
pub fn edit_form(entry: &BookshelfEntry) -> BookForm {
    BookForm {
        isbn: entry.isbn.clone(),
        title: entry.title.clone(),
        author: entry.author.clone(),
        cover_url: entry.cover_url.clone(),
    }
}

/// 書籍を更新する（検証に失敗したらリクエストしない）
pub async fn update_book(api: &dyn CatalogApi, book_id: i64, form: &BookForm) -> Result<Book> {
    let book = form.validate_update()?;
    api.update_book(book_id, &book).await.map_err(|e| {
        tracing::warn!(book_id, error = %e, "book update failed");
        BookFinderError::Save("Failed to update book.".into())
    })
}

/// 外部ソースから表紙を探して書籍に設定する
pub async fn fetch_cover(api: &dyn CatalogApi, entry: &BookshelfEntry) -> Result<Book> {
    let lookup_failed = |e: BookFinderError| {
        tracing::warn!(book_id = entry.book_id, error = %e, "cover lookup failed");
        BookFinderError::Search("Cover lookup failed. Try again.".into())
    };

    let query = entry.cover_query();
    if query.is_empty() {
        return Err(book_finder_common::Error::EmptyQuery.into());
    }
    let options = SearchOptions {
        force_external: true,
        limit: Some(COVER_SEARCH_LIMIT),
    };
    let candidates = api.search(&query, &options).await.map_err(lookup_failed)?;

    let Some(cover_url) = candidates
        .into_iter()
        .filter_map(|c| c.cover_url)
        .find(|url| !url.trim().is_empty())
    else {
        return Err(BookFinderError::Search("No cover found from external sources.".into()));
    };

    let update = NewBook {
        isbn: entry.isbn.clone(),
        title: entry.title.clone(),
        author: entry.author.clone(),
        cover_url: Some(cover_url.clone()),
    };
    let mut book = api
        .update_book(entry.book_id, &update)
        .await
        .map_err(lookup_failed)?;
    if book.cover_url.is_none() {
        book.cover_url = Some(cover_url);
    }
    tracing::info!(book_id = entry.book_id, "cover updated");
    Ok(book)
}
