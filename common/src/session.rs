//! スキャンセッションの状態管理
//!
//! - 行は新しい順に並べ、IDで引く（非同期結果はリスト位置ではなくIDで反映する）
//! - 正規化済みISBNの「既出」セットで重複行を防ぐ（ISBNなしの行は対象外）
//! - 候補検索はチケットの世代番号で管理し、古い検索結果はピッカーに反映しない
//!   （行を対象とした検索の状態・失敗メッセージは、その行の最新の検索なら必ず行へ反映する）
//! - `clear` は行・既出セット・候補ピッカーをまとめて初期化する（IDの採番は継続）

use crate::error::{Error, Result};
use crate::isbn;
use crate::types::{
    holding_summary, Book, Candidate, CandidateSource, HoldingInfo, LookupResponse, RowId,
    ScanRow, ScanStatus,
};
use std::collections::{HashMap, HashSet, VecDeque};

/// 検出（スキャン・手入力）の反映結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// 新しい行を追加した（このISBNでルックアップする）
    Inserted { id: RowId, isbn: String },
    /// 既出のISBN（何もしない）
    Duplicate(String),
    /// ISBNとして無効（何もしない）
    Invalid,
}

/// ISBNルックアップの結果
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found { book: Book, holdings: Vec<HoldingInfo> },
    NotFound,
    Failed(String),
}

impl From<LookupResponse> for LookupOutcome {
    fn from(response: LookupResponse) -> Self {
        match response.book {
            Some(book) if response.found => LookupOutcome::Found {
                book,
                holdings: response.holdings,
            },
            _ => LookupOutcome::NotFound,
        }
    }
}

/// 候補検索のチケット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    generation: u64,
    target: Option<RowId>,
    query: String,
}

impl SearchTicket {
    /// 結果を反映する行（OCR・手入力の候補フローでは None）
    pub fn target(&self) -> Option<RowId> {
        self.target
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// 候補選択ダイアログの状態
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePicker {
    pub target: Option<RowId>,
    pub query: String,
    pub candidates: Vec<Candidate>,
    pub status: String,
    pub searching: bool,
}

impl CandidatePicker {
    pub fn has_catalog_candidates(&self) -> bool {
        self.candidates
            .iter()
            .any(|c| c.source == CandidateSource::Catalog)
    }
}

/// 保存完了時に行へ書き戻す内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedRecord {
    pub book_id: Option<i64>,
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub holding_summary: Option<String>,
}

/// 1回分のスキャンセッション
#[derive(Debug, Default)]
pub struct Session {
    rows: HashMap<RowId, ScanRow>,
    order: VecDeque<RowId>,
    seen: HashSet<String>,
    next_id: u64,
    search_generation: u64,
    row_searches: HashMap<RowId, u64>,
    picker: Option<CandidatePicker>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 新しい順の行
    pub fn rows(&self) -> impl Iterator<Item = &ScanRow> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    pub fn row(&self, id: RowId) -> Option<&ScanRow> {
        self.rows.get(&id)
    }

    pub fn has_seen(&self, normalized_isbn: &str) -> bool {
        self.seen.contains(normalized_isbn)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn picker(&self) -> Option<&CandidatePicker> {
        self.picker.as_ref()
    }

    /// バーコード検出を反映する（無効・既出は黙って無視）
    pub fn record_detection(&mut self, raw: &str) -> Detection {
        let normalized = isbn::normalize(raw);
        if normalized.is_empty() {
            return Detection::Invalid;
        }
        if !self.seen.insert(normalized.clone()) {
            return Detection::Duplicate(normalized);
        }

        let id = self.allocate_id();
        self.push_row(ScanRow::new(id, normalized.clone(), ScanStatus::Loading));
        Detection::Inserted { id, isbn: normalized }
    }

    /// 手入力のISBNを反映する（無効ならエラーを返す）
    pub fn submit_manual_isbn(&mut self, raw: &str) -> Result<Detection> {
        let normalized = isbn::validate(raw)?;
        Ok(self.record_detection(&normalized))
    }

    /// ルックアップ結果を行IDで反映する
    ///
    /// カタログに無ければ `not_in_catalog` にして、その行を対象とした候補検索を開始する。
    /// セッションがクリア済みで行が無い場合、行がすでに loading を抜けている場合は何もしない。
    pub fn apply_lookup(&mut self, id: RowId, outcome: LookupOutcome) -> Result<Option<SearchTicket>> {
        let Some(row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != ScanStatus::Loading {
            return Ok(None);
        }

        match outcome {
            LookupOutcome::Found { book, holdings } => {
                transition(row, ScanStatus::FoundInCatalog)?;
                row.title = Some(book.title);
                row.author = Some(book.author);
                row.cover_url = book.cover_url;
                row.catalog_book_id = Some(book.id);
                row.holding_summary = holding_summary(&holdings);
                row.message = None;
                Ok(None)
            }
            LookupOutcome::NotFound => {
                transition(row, ScanStatus::NotInCatalog)?;
                row.message = None;
                self.begin_row_search(id).map(Some)
            }
            LookupOutcome::Failed(message) => {
                transition(row, ScanStatus::Error)?;
                row.message = Some(message);
                Ok(None)
            }
        }
    }

    /// 特定の行を対象に候補検索を開始する（エラー行は loading に戻す）
    pub fn begin_row_search(&mut self, id: RowId) -> Result<SearchTicket> {
        let row = self.rows.get_mut(&id).ok_or(Error::UnknownRow(id))?;
        let query = row.search_query();
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        if row.status == ScanStatus::Error {
            transition(row, ScanStatus::Loading)?;
            row.message = None;
        }
        Ok(self.open_picker(Some(id), query))
    }

    /// 行に紐付かない候補検索を開始する（OCR・手入力フロー）
    pub fn begin_transient_search(&mut self, query: impl Into<String>) -> SearchTicket {
        self.open_picker(None, query.into())
    }

    /// 候補検索の結果を反映する
    ///
    /// ピッカーには最新のチケットの結果だけを反映する。
    /// 行を対象とした検索は、その行の最新の検索であればピッカーが別の検索に移っていても
    /// 行の状態と失敗メッセージを反映する。どちらにも反映しなければ `false` を返す。
    pub fn apply_candidates(
        &mut self,
        ticket: &SearchTicket,
        result: std::result::Result<Vec<Candidate>, String>,
    ) -> bool {
        let failure = result.as_ref().err().cloned();
        let row_applied = self.apply_row_search_result(ticket, failure);
        let picker_applied = self.apply_picker_result(ticket, result);
        row_applied || picker_applied
    }

    fn apply_row_search_result(&mut self, ticket: &SearchTicket, failure: Option<String>) -> bool {
        let Some(id) = ticket.target else {
            return false;
        };
        if self.row_searches.get(&id) != Some(&ticket.generation) {
            return false;
        }
        self.row_searches.remove(&id);
        let Some(row) = self.rows.get_mut(&id) else {
            return false;
        };

        match failure {
            Some(message) => {
                if row.status.can_transition_to(ScanStatus::NeedsManualEntry) {
                    row.status = ScanStatus::NeedsManualEntry;
                }
                row.message = Some(message);
            }
            None if row.status == ScanStatus::Loading => {
                row.status = ScanStatus::NeedsManualEntry;
            }
            None => {}
        }
        true
    }

    fn apply_picker_result(
        &mut self,
        ticket: &SearchTicket,
        result: std::result::Result<Vec<Candidate>, String>,
    ) -> bool {
        if ticket.generation != self.search_generation {
            return false;
        }
        let Some(picker) = self.picker.as_mut() else {
            return false;
        };

        picker.searching = false;
        match result {
            Ok(candidates) => {
                picker.status = if candidates.is_empty() {
                    format!("No results for \"{}\".", picker.query)
                } else {
                    format!(
                        "Found {} from {}.",
                        candidates.len(),
                        source_labels(&candidates)
                    )
                };
                picker.candidates = candidates;
            }
            Err(_) => {
                picker.status = "Search failed.".to_string();
                picker.candidates.clear();
            }
        }
        true
    }

    /// 候補（または手入力）を選択して行を確定する
    ///
    /// ピッカーに対象行があればその行へマージ、なければ先頭に新しい行を作る。
    /// 既出ISBNの候補は既存の行へマージする。
    pub fn select_candidate(&mut self, candidate: Option<&Candidate>) -> Result<RowId> {
        let target = self.picker.as_ref().and_then(|p| p.target);
        let candidate_isbn = candidate
            .and_then(|c| c.isbn.as_deref())
            .map(isbn::normalize)
            .unwrap_or_default();

        let id = match target {
            Some(id) => {
                if !self.rows.contains_key(&id) {
                    return Err(Error::UnknownRow(id));
                }
                id
            }
            None => match self.owner_of(&candidate_isbn) {
                Some(existing) => existing,
                None => {
                    let id = self.allocate_id();
                    self.push_row(ScanRow::new(id, String::new(), ScanStatus::NeedsManualEntry))
                }
            },
        };

        self.assign_isbn(id, &candidate_isbn);

        let row = self.rows.get_mut(&id).ok_or(Error::UnknownRow(id))?;
        let next = match candidate {
            Some(c) if c.source == CandidateSource::Catalog && c.catalog_book_id.is_some() => {
                ScanStatus::FoundInCatalog
            }
            _ => ScanStatus::NeedsManualEntry,
        };
        transition(row, next)?;

        if let Some(c) = candidate {
            if !c.title.trim().is_empty() {
                row.title = Some(c.title.clone());
            }
            if !c.author.trim().is_empty() {
                row.author = Some(c.author.clone());
            }
            if c.cover_url.is_some() {
                row.cover_url = c.cover_url.clone();
            }
            if c.catalog_book_id.is_some() {
                row.catalog_book_id = c.catalog_book_id;
            }
            if !c.holdings.is_empty() {
                row.holding_summary = holding_summary(&c.holdings);
            }
        }
        row.message = None;

        self.picker = None;
        Ok(id)
    }

    /// 候補ピッカーを閉じる（進行中の検索結果は以後捨てる）
    pub fn close_picker(&mut self) {
        self.picker = None;
        self.search_generation += 1;
    }

    /// 保存成功を反映する
    pub fn mark_saved(&mut self, id: RowId, record: SavedRecord) -> Result<()> {
        if let Some(raw) = record.isbn.as_deref() {
            let normalized = isbn::normalize(raw);
            self.assign_isbn(id, &normalized);
        }

        let row = self.rows.get_mut(&id).ok_or(Error::UnknownRow(id))?;
        transition(row, ScanStatus::Saved)?;
        if record.book_id.is_some() {
            row.catalog_book_id = record.book_id;
        }
        if record.title.is_some() {
            row.title = record.title;
        }
        if record.author.is_some() {
            row.author = record.author;
        }
        if record.holding_summary.is_some() {
            row.holding_summary = record.holding_summary;
        }
        row.message = None;
        Ok(())
    }

    /// 作成済みの書籍を行に結び付ける（状態は変えない）
    pub fn link_book(&mut self, id: RowId, book: &Book) -> Result<()> {
        let row = self.rows.get_mut(&id).ok_or(Error::UnknownRow(id))?;
        row.catalog_book_id = Some(book.id);
        row.title = Some(book.title.clone());
        row.author = Some(book.author.clone());
        if book.cover_url.is_some() {
            row.cover_url = book.cover_url.clone();
        }
        Ok(())
    }

    /// 保存済みの行に所蔵の要約だけ書き戻す
    pub fn update_holding_summary(&mut self, id: RowId, summary: Option<String>) -> Result<()> {
        let row = self.rows.get_mut(&id).ok_or(Error::UnknownRow(id))?;
        row.holding_summary = summary;
        Ok(())
    }

    /// 失敗を反映する（行が消えていれば何もしない）
    pub fn mark_failed(&mut self, id: RowId, message: impl Into<String>) -> Result<()> {
        let Some(row) = self.rows.get_mut(&id) else {
            return Ok(());
        };
        transition(row, ScanStatus::Error)?;
        row.message = Some(message.into());
        Ok(())
    }

    /// 行・既出セット・ピッカーを初期化する
    pub fn clear(&mut self) {
        self.rows.clear();
        self.order.clear();
        self.seen.clear();
        self.row_searches.clear();
        self.picker = None;
        self.search_generation += 1;
    }

    fn allocate_id(&mut self) -> RowId {
        self.next_id += 1;
        RowId::new(self.next_id)
    }

    fn push_row(&mut self, row: ScanRow) -> RowId {
        let id = row.id;
        self.order.push_front(id);
        self.rows.insert(id, row);
        id
    }

    fn open_picker(&mut self, target: Option<RowId>, query: String) -> SearchTicket {
        self.search_generation += 1;
        if let Some(id) = target {
            self.row_searches.insert(id, self.search_generation);
        }
        self.picker = Some(CandidatePicker {
            target,
            query: query.clone(),
            candidates: Vec::new(),
            status: format!("Searching \"{}\"...", query),
            searching: true,
        });
        SearchTicket {
            generation: self.search_generation,
            target,
            query,
        }
    }

    fn owner_of(&self, normalized_isbn: &str) -> Option<RowId> {
        if normalized_isbn.is_empty() || !self.seen.contains(normalized_isbn) {
            return None;
        }
        self.rows
            .values()
            .find(|row| row.isbn == normalized_isbn)
            .map(|row| row.id)
    }

    /// 他の行が持っていないISBNなら行へ設定して既出に登録
    fn assign_isbn(&mut self, id: RowId, normalized_isbn: &str) {
        if normalized_isbn.is_empty() {
            return;
        }
        if let Some(owner) = self.owner_of(normalized_isbn) {
            if owner != id {
                return;
            }
        }
        if let Some(row) = self.rows.get_mut(&id) {
            row.isbn = normalized_isbn.to_string();
            self.seen.insert(normalized_isbn.to_string());
        }
    }
}

fn transition(row: &mut ScanRow, next: ScanStatus) -> Result<()> {
    if !row.status.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            from: row.status,
            to: next,
        });
    }
    row.status = next;
    Ok(())
}

fn source_labels(candidates: &[Candidate]) -> String {
    let mut labels: Vec<&str> = Vec::new();
    for candidate in candidates {
        let label = candidate.source.label();
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels.join(", ")
}
