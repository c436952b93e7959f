//! 識別パイプラインの取りまとめ
//!
//! 検出・手入力 → 行を即座に追加（loading）→ ルックアップを非同期に実行して行IDで反映。
//! カタログに無ければその行を対象に候補検索、OCR・手入力の検索は行に紐付かない候補として扱う。
//! 保存（書籍作成・所蔵追加）の失敗は行を `error` にする。

use crate::api::{CatalogApi, SearchOptions};
use crate::error::{BookFinderError, Result};
use crate::resolver::{self, Resolution};
use book_finder_common::forms::{BookForm, HoldingForm};
use book_finder_common::query::QueryBuilder;
use book_finder_common::session::{
    CandidatePicker, Detection, LookupOutcome, SavedRecord, SearchTicket, Session,
};
use book_finder_common::types::{Book, Candidate, HoldingInfo, Location, RowId, ScanRow, ScanStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Cataloger {
    session: Arc<Mutex<Session>>,
    api: Arc<dyn CatalogApi>,
    queries: Arc<QueryBuilder>,
    search_options: SearchOptions,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Cataloger {
    pub fn new(api: Arc<dyn CatalogApi>, queries: QueryBuilder) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            api,
            queries: Arc::new(queries),
            search_options: SearchOptions::default(),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    pub fn api(&self) -> Arc<dyn CatalogApi> {
        self.api.clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ============================================
    // 検出・ルックアップ
    // ============================================

    /// バーコードの検出を反映する（無効・既出は黙って捨てる）
    pub fn handle_detection(&self, raw: &str) -> Option<RowId> {
        let detection = self.session().record_detection(raw);
        self.after_detection(detection)
    }

    /// 手入力のISBNを反映する（無効なら `InvalidIsbn`、既出なら None）
    pub fn submit_manual_isbn(&self, raw: &str) -> Result<Option<RowId>> {
        let detection = self.session().submit_manual_isbn(raw)?;
        Ok(self.after_detection(detection))
    }

    fn after_detection(&self, detection: Detection) -> Option<RowId> {
        match detection {
            Detection::Inserted { id, isbn } => {
                tracing::info!(row = %id, isbn = %isbn, "row added");
                self.spawn_lookup(id, isbn);
                Some(id)
            }
            Detection::Duplicate(isbn) => {
                tracing::trace!(isbn = %isbn, "duplicate detection ignored");
                None
            }
            Detection::Invalid => {
                tracing::trace!("invalid detection ignored");
                None
            }
        }
    }

    fn spawn_lookup(&self, id: RowId, isbn: String) {
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_lookup(id, isbn).await });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    async fn run_lookup(&self, id: RowId, isbn: String) {
        let outcome = match self.api.lookup_isbn(&isbn).await {
            Ok(response) => LookupOutcome::from(response),
            Err(e) => {
                tracing::warn!(row = %id, isbn = %isbn, error = %e, "lookup failed");
                LookupOutcome::Failed(e.user_message())
            }
        };

        let ticket = self.session().apply_lookup(id, outcome);
        match ticket {
            Ok(Some(ticket)) => {
                tracing::debug!(row = %id, "not in catalog, searching candidates");
                self.run_row_search(ticket).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(row = %id, error = %e, "lookup result not applied"),
        }
    }

    async fn run_row_search(&self, ticket: SearchTicket) {
        let result = resolver::search_direct(self.api.as_ref(), ticket.query(), &self.search_options)
            .await
            .map_err(|e| e.user_message());
        if !self.session().apply_candidates(&ticket, result) {
            tracing::debug!(query = %ticket.query(), "stale search result dropped");
        }
    }

    /// 行の候補検索をやり直す
    pub async fn rerun_search(&self, id: RowId) -> Result<()> {
        let ticket = self.session().begin_row_search(id)?;
        self.run_row_search(ticket).await;
        Ok(())
    }

    /// 実行中のルックアップ・検索がすべて終わるまで待つ
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task failed");
                }
            }
        }
    }

    // ============================================
    // 行に紐付かない検索（OCR・手入力）
    // ============================================

    /// OCRテキストからクエリを作り、フォールバック検索する
    pub async fn search_with_fallback(&self, raw_text: &str) -> Result<Resolution> {
        let queries = self.queries.build(raw_text);
        let Some(first) = queries.first() else {
            return Err(BookFinderError::Search("No text extracted. Try again.".into()));
        };

        let ticket = self.session().begin_transient_search(first.clone());
        let resolution =
            resolver::resolve_with_fallback(self.api.as_ref(), &queries, &self.search_options).await;
        self.session()
            .apply_candidates(&ticket, Ok(resolution.candidates.clone()));

        tracing::info!(
            attempts = resolution.attempts,
            matched = ?resolution.matched_query,
            hits = resolution.candidates.len(),
            "fallback search finished"
        );
        Ok(resolution)
    }

    /// 1クエリだけの検索（失敗は `Search` として返す）
    pub async fn search_direct(&self, query: &str) -> Result<Vec<Candidate>> {
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if query.is_empty() {
            return Err(book_finder_common::Error::EmptyQuery.into());
        }
        let ticket = self.session().begin_transient_search(query.clone());
        let result = resolver::search_direct(self.api.as_ref(), &query, &self.search_options).await;

        let applied = match &result {
            Ok(candidates) => Ok(candidates.clone()),
            Err(e) => Err(e.user_message()),
        };
        self.session().apply_candidates(&ticket, applied);
        result
    }

    /// 候補を選ぶ（None は手入力）
    pub fn select_candidate(&self, index: Option<usize>) -> Result<RowId> {
        let mut session = self.session();
        let candidate = match index {
            Some(i) => Some(
                session
                    .picker()
                    .and_then(|p| p.candidates.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        book_finder_common::Error::Validation(format!("No candidate #{}.", i + 1))
                    })?,
            ),
            None => None,
        };
        let id = session.select_candidate(candidate.as_ref())?;
        tracing::info!(row = %id, "candidate selected");
        Ok(id)
    }

    pub fn close_picker(&self) {
        self.session().close_picker();
    }

    // ============================================
    // 保存
    // ============================================

    /// カタログにある書籍へ所蔵を追加する
    pub async fn save_holding(&self, id: RowId, form: &HoldingForm) -> Result<HoldingInfo> {
        let holding = form.validate()?;
        let (book_id, status, summary) = {
            let session = self.session();
            let row = session.row(id).ok_or(book_finder_common::Error::UnknownRow(id))?;
            (row.catalog_book_id, row.status, row.holding_summary.clone())
        };
        let Some(book_id) = book_id else {
            return Err(book_finder_common::Error::Validation("Book is not in the catalog.".into()).into());
        };

        match self.api.add_holding(book_id, &holding).await {
            Ok(info) => {
                let line = saved_holding_line(&info, form);
                let combined = match summary {
                    Some(existing) if status != ScanStatus::Error => format!("{}, {}", existing, line),
                    _ => line,
                };
                let mut session = self.session();
                if status == ScanStatus::Saved {
                    session.update_holding_summary(id, Some(combined))?;
                } else {
                    session.mark_saved(
                        id,
                        SavedRecord {
                            book_id: Some(book_id),
                            holding_summary: Some(combined),
                            ..SavedRecord::default()
                        },
                    )?;
                }
                Ok(info)
            }
            Err(e) => Err(self.save_failed(id, "Failed to save holding.", e)),
        }
    }

    /// 書籍を作成して所蔵を追加する
    pub async fn save_book_and_holding(
        &self,
        id: RowId,
        book: &BookForm,
        holding: &HoldingForm,
    ) -> Result<Book> {
        let new_book = book.validate()?;
        let new_holding = holding.validate()?;
        if self.row(id).is_none() {
            return Err(book_finder_common::Error::UnknownRow(id).into());
        }

        let created = match self.api.create_book(&new_book).await {
            Ok(created) => created,
            Err(e) => return Err(self.save_failed(id, "Failed to save book and holding.", e)),
        };
        self.session().link_book(id, &created)?;

        match self.api.add_holding(created.id, &new_holding).await {
            Ok(info) => {
                self.session().mark_saved(
                    id,
                    SavedRecord {
                        book_id: Some(created.id),
                        isbn: Some(created.isbn.clone()),
                        title: Some(created.title.clone()),
                        author: Some(created.author.clone()),
                        holding_summary: Some(saved_holding_line(&info, holding)),
                    },
                )?;
                Ok(created)
            }
            Err(e) => Err(self.save_failed(id, "Failed to save book and holding.", e)),
        }
    }

    fn save_failed(&self, id: RowId, fallback: &str, error: BookFinderError) -> BookFinderError {
        let message = match error.user_message() {
            m if m.trim().is_empty() => fallback.to_string(),
            m => m,
        };
        tracing::warn!(row = %id, error = %error, "save failed");
        if let Err(e) = self.session().mark_failed(id, message.clone()) {
            tracing::warn!(row = %id, error = %e, "row not marked as failed");
        }
        BookFinderError::Save(message)
    }

    pub async fn search_locations(&self, query: &str) -> Result<Vec<Location>> {
        self.api.search_locations(query).await
    }

    // ============================================
    // セッション
    // ============================================

    pub fn clear_session(&self) {
        self.session().clear();
        tracing::info!("session cleared");
    }

    pub fn rows(&self) -> Vec<ScanRow> {
        self.session().rows().cloned().collect()
    }

    pub fn row(&self, id: RowId) -> Option<ScanRow> {
        self.session().row(id).cloned()
    }

    pub fn picker(&self) -> Option<CandidatePicker> {
        self.session().picker().cloned()
    }
}

/// 保存した所蔵の要約（APIが場所名を返さなければフォームの値を使う）
fn saved_holding_line(info: &HoldingInfo, form: &HoldingForm) -> String {
    if info.location_name.trim().is_empty() {
        form.summary()
    } else {
        info.summary()
    }
}
