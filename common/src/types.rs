//! データモデルとカタログAPIのワイヤ型
//!
//! - ScanRow: セッション内の1行（スキャン/手入力/候補選択で生成）
//! - Candidate: カタログ・外部検索のヒット（選択ダイアログの間だけ存在）
//! - OcrJobConfig: OCR撮影1回分の設定
//! - LookupResponse 等: `/books/...` エンドポイントのレスポンス形
//! - BookshelfPage 等: `/bookshelf` の一覧（ページング付き）

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// セッション行
// ============================================

/// セッション内で一意な行ID（生成後は不変）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

/// 行のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Loading,
    FoundInCatalog,
    NotInCatalog,
    NeedsManualEntry,
    Saved,
    Error,
}

impl ScanStatus {
    /// `saved` / `error` はユーザー操作なしには動かない
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Saved | ScanStatus::Error)
    }

    /// 状態遷移表
    ///
    /// - loading → found_in_catalog | not_in_catalog
    /// - not_in_catalog / needs_manual_entry → saved
    /// - 非終端 → error
    /// - error → loading（再検索）/ needs_manual_entry / saved（再保存）
    /// - saved → needs_manual_entry / loading（編集の再オープン）
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        match (*self, next) {
            (Loading, FoundInCatalog | NotInCatalog | NeedsManualEntry | Error) => true,
            (NotInCatalog, NeedsManualEntry | FoundInCatalog | Saved | Loading | Error) => true,
            (NeedsManualEntry, NeedsManualEntry | FoundInCatalog | Saved | Loading | Error) => true,
            (FoundInCatalog, FoundInCatalog | NeedsManualEntry | Saved | Loading | Error) => true,
            (Error, Loading | NeedsManualEntry | FoundInCatalog | Saved) => true,
            (Saved, NeedsManualEntry | FoundInCatalog | Loading) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Loading => "loading",
            ScanStatus::FoundInCatalog => "found_in_catalog",
            ScanStatus::NotInCatalog => "not_in_catalog",
            ScanStatus::NeedsManualEntry => "needs_manual_entry",
            ScanStatus::Saved => "saved",
            ScanStatus::Error => "error",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// セッションの1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRow {
    pub id: RowId,

    /// 正規化済みISBN（OCR/手入力で未確定なら空）
    #[serde(default)]
    pub isbn: String,

    pub status: ScanStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_book_id: Option<i64>,

    /// 棚・冊数の要約（例: "Main · A-3 · qty 2"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_summary: Option<String>,

    /// 直近のエラーメッセージ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ScanRow {
    pub fn new(id: RowId, isbn: impl Into<String>, status: ScanStatus) -> Self {
        Self {
            id,
            isbn: isbn.into(),
            status,
            title: None,
            author: None,
            cover_url: None,
            catalog_book_id: None,
            holding_summary: None,
            message: None,
        }
    }

    /// 行の再検索に使うクエリ（ISBN優先、なければ「タイトル 著者」）
    pub fn search_query(&self) -> String {
        if !self.isbn.is_empty() {
            return self.isbn.clone();
        }
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or(""),
            self.author.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

// ============================================
// 候補
// ============================================

/// 候補の出所
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateSource {
    /// 自前のカタログ（APIでは "db"）
    #[serde(rename = "db", alias = "catalog")]
    Catalog,
    #[serde(rename = "external")]
    External,
}

impl CandidateSource {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateSource::Catalog => "DB",
            CandidateSource::External => "EXTERNAL",
        }
    }
}

/// 検索ヒット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,

    pub source: CandidateSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default, rename = "book_id", skip_serializing_if = "Option::is_none")]
    pub catalog_book_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holdings: Vec<HoldingInfo>,
}

// ============================================
// カタログAPIのワイヤ型
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// 所蔵（どの場所のどの棚に何冊あるか）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<i64>,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub shelf_number: String,
    #[serde(default)]
    pub qty: u32,
}

impl HoldingInfo {
    pub fn summary(&self) -> String {
        format!("{} · {} · qty {}", self.location_name, self.shelf_number, self.qty)
    }
}

/// 所蔵リストを1行の要約にまとめる（空なら None）
pub fn holding_summary(holdings: &[HoldingInfo]) -> Option<String> {
    if holdings.is_empty() {
        return None;
    }
    Some(
        holdings
            .iter()
            .map(HoldingInfo::summary)
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// `GET /books/by-isbn/{isbn}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
    #[serde(default)]
    pub holdings: Vec<HoldingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_isbn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

/// `POST /books`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

/// `POST /books/{id}/holdings` / `PUT /holdings/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHolding {
    pub location_id: i64,
    pub shelf_number: String,
    pub qty: u32,
}

// ============================================
// 本棚一覧
// ============================================

/// 本棚一覧の1冊分の所蔵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookshelfHolding {
    pub id: i64,
    #[serde(default)]
    pub location_id: i64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub shelf: String,
    #[serde(default)]
    pub qty: u32,
}

impl BookshelfHolding {
    pub fn summary(&self) -> String {
        format!("{} · {} · qty {}", self.location, self.shelf, self.qty)
    }
}

/// 本棚一覧の1冊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookshelfEntry {
    pub book_id: i64,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub total_qty: u32,
    #[serde(default)]
    pub holdings: Vec<BookshelfHolding>,
}

impl BookshelfEntry {
    /// 表紙検索に使うクエリ（ISBNがなければ「タイトル 著者」）
    pub fn cover_query(&self) -> String {
        if !self.isbn.trim().is_empty() {
            return self.isbn.trim().to_string();
        }
        format!("{} {}", self.title.trim(), self.author.trim())
            .trim()
            .to_string()
    }
}

/// 一覧のページ情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub limit: u32,
    pub offset: u32,
    pub total: u32,
}

impl Paging {
    /// `1-50 of 120` 形式（0件なら `0 results`）
    pub fn range_label(&self) -> String {
        if self.total == 0 {
            return "0 results".to_string();
        }
        let end = self.offset.saturating_add(self.limit).min(self.total);
        format!("{}-{} of {}", self.offset + 1, end, self.total)
    }

    /// 次ページの開始位置（最終ページなら None）
    pub fn next_offset(&self) -> Option<u32> {
        let next = self.offset.saturating_add(self.limit);
        (self.limit > 0 && next < self.total).then_some(next)
    }

    /// 前ページの開始位置（先頭ページなら None）
    pub fn previous_offset(&self) -> Option<u32> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }
}

/// `GET /bookshelf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookshelfPage {
    #[serde(default)]
    pub data: Vec<BookshelfEntry>,
    #[serde(default)]
    pub paging: Paging,
}

/// 本棚一覧の絞り込み条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookshelfFilter {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub location: String,
    pub shelf: String,
    pub limit: u32,
    pub offset: u32,
}

impl Default for BookshelfFilter {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            isbn: String::new(),
            location: String::new(),
            shelf: String::new(),
            limit: 50,
            offset: 0,
        }
    }
}

impl BookshelfFilter {
    /// クエリパラメータ（空の条件は送らない）
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        for (key, value) in [
            ("title", &self.title),
            ("author", &self.author),
            ("isbn", &self.isbn),
            ("location", &self.location),
            ("shelf", &self.shelf),
        ] {
            let value = value.trim();
            if !value.is_empty() {
                params.push((key, value.to_string()));
            }
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("offset", self.offset.to_string()));
        params
    }
}

// ============================================
// OCR設定
// ============================================

/// OCRエンジンの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrEngineKind {
    /// 端末内認識（tesseract）
    Local,
    /// クラウド Vision
    #[default]
    CloudVision,
    /// クラウド OCR（OCR.space）
    CloudOcr,
}

impl fmt::Display for OcrEngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrEngineKind::Local => write!(f, "local"),
            OcrEngineKind::CloudVision => write!(f, "cloud-vision"),
            OcrEngineKind::CloudOcr => write!(f, "cloud-ocr"),
        }
    }
}

impl FromStr for OcrEngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "tesseract" => Ok(OcrEngineKind::Local),
            "cloud-vision" | "vision" => Ok(OcrEngineKind::CloudVision),
            "cloud-ocr" | "ocrspace" | "ocr-space" => Ok(OcrEngineKind::CloudOcr),
            _ => Err(format!(
                "Unknown engine: {}. Use local, cloud-vision, or cloud-ocr",
                s
            )),
        }
    }
}

/// OCRで注目する領域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusRegion {
    #[default]
    Full,
    /// 上部（タイトル帯）
    Title,
    /// 中央（著者帯）
    Author,
}

impl fmt::Display for FocusRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusRegion::Full => write!(f, "full"),
            FocusRegion::Title => write!(f, "title"),
            FocusRegion::Author => write!(f, "author"),
        }
    }
}

impl FromStr for FocusRegion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(FocusRegion::Full),
            "title" => Ok(FocusRegion::Title),
            "author" => Ok(FocusRegion::Author),
            _ => Err(format!("Unknown focus region: {}. Use full, title, or author", s)),
        }
    }
}

/// OCR撮影1回分の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrJobConfig {
    pub engine: OcrEngineKind,
    pub focus_region: FocusRegion,
    pub crop_to_center: bool,
    pub auto_search: bool,
}

impl Default for OcrJobConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::CloudVision,
            focus_region: FocusRegion::Full,
            crop_to_center: false,
            auto_search: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookshelf_filter_params_skip_blank() {
        let filter = BookshelfFilter {
            author: "  Raditya Dika ".into(),
            shelf: "   ".into(),
            offset: 50,
            ..BookshelfFilter::default()
        };
        assert_eq!(
            filter.query_params(),
            vec![
                ("author", "Raditya Dika".to_string()),
                ("limit", "50".to_string()),
                ("offset", "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_paging_labels_and_offsets() {
        let empty = Paging { limit: 50, offset: 0, total: 0 };
        assert_eq!(empty.range_label(), "0 results");
        assert_eq!(empty.next_offset(), None);

        let first = Paging { limit: 50, offset: 0, total: 120 };
        assert_eq!(first.range_label(), "1-50 of 120");
        assert_eq!(first.next_offset(), Some(50));
        assert_eq!(first.previous_offset(), None);

        let last = Paging { limit: 50, offset: 100, total: 120 };
        assert_eq!(last.range_label(), "101-120 of 120");
        assert_eq!(last.next_offset(), None);
        assert_eq!(last.previous_offset(), Some(50));
    }

    #[test]
    fn test_bookshelf_page_parse() {
        let json = r#"{
            "data": [{
                "book_id": 7, "isbn": "", "title": "Kambing Jantan", "author": "Raditya Dika",
                "total_qty": 3,
                "holdings": [{"id": 1, "location_id": 2, "location": "Main", "shelf": "A-3", "qty": 3}]
            }],
            "paging": {"limit": 50, "offset": 0, "total": 1}
        }"#;
        let page: BookshelfPage = serde_json::from_str(json).unwrap();
        let entry = &page.data[0];
        assert_eq!(entry.holdings[0].summary(), "Main · A-3 · qty 3");
        assert_eq!(entry.cover_query(), "Kambing Jantan Raditya Dika");
        assert_eq!(page.paging.range_label(), "1-1 of 1");
    }

    #[test]
    fn test_candidate_source_wire_names() {
        let json = r#"[
            {"title": "Kambing Jantan", "author": "Raditya Dika", "source": "db", "book_id": 12},
            {"title": "Manusia Setengah Salmon", "author": "Raditya Dika", "source": "external", "isbn": "9789797805142"}
        ]"#;
        let candidates: Vec<Candidate> = serde_json::from_str(json).unwrap();
        assert_eq!(candidates[0].source, CandidateSource::Catalog);
        assert_eq!(candidates[0].catalog_book_id, Some(12));
        assert_eq!(candidates[1].source, CandidateSource::External);
        assert_eq!(candidates[1].isbn.as_deref(), Some("9789797805142"));

        let alias: Candidate =
            serde_json::from_str(r#"{"title": "t", "author": "a", "source": "catalog"}"#).unwrap();
        assert_eq!(alias.source, CandidateSource::Catalog);
    }

    #[test]
    fn test_lookup_response_parse() {
        let json = r#"{
            "found": true,
            "source": "db",
            "normalized_isbn": "9780141036144",
            "book": {"id": 3, "isbn": "9780141036144", "title": "1984", "author": "George Orwell"},
            "holdings": [
                {"id": 1, "location_id": 2, "location_name": "Main", "shelf_number": "A-3", "qty": 2}
            ]
        }"#;
        let response: LookupResponse = serde_json::from_str(json).unwrap();
        assert!(response.found);
        assert_eq!(response.book.as_ref().map(|b| b.id), Some(3));
        assert_eq!(holding_summary(&response.holdings).as_deref(), Some("Main · A-3 · qty 2"));
    }

    #[test]
    fn test_lookup_response_not_found_minimal() {
        let response: LookupResponse = serde_json::from_str(r#"{"found": false}"#).unwrap();
        assert!(!response.found);
        assert!(response.book.is_none());
        assert!(response.holdings.is_empty());
    }

    #[test]
    fn test_holding_summary_joins() {
        let holdings = vec![
            HoldingInfo {
                id: None,
                location_id: None,
                location_name: "Main".into(),
                shelf_number: "A-3".into(),
                qty: 2,
            },
            HoldingInfo {
                id: None,
                location_id: None,
                location_name: "Annex".into(),
                shelf_number: "B".into(),
                qty: 1,
            },
        ];
        assert_eq!(
            holding_summary(&holdings).unwrap(),
            "Main · A-3 · qty 2, Annex · B · qty 1"
        );
        assert_eq!(holding_summary(&[]), None);
    }

    #[test]
    fn test_status_transitions() {
        use ScanStatus::*;
        assert!(Loading.can_transition_to(FoundInCatalog));
        assert!(Loading.can_transition_to(NotInCatalog));
        assert!(NotInCatalog.can_transition_to(Saved));
        assert!(NeedsManualEntry.can_transition_to(Saved));
        assert!(Error.can_transition_to(Loading));
        assert!(!Saved.can_transition_to(Error));
        assert!(!Error.can_transition_to(Error));
        assert!(!FoundInCatalog.can_transition_to(NotInCatalog));
        assert!(!Saved.can_transition_to(Saved));
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&ScanStatus::NeedsManualEntry).unwrap();
        assert_eq!(json, "\"needs_manual_entry\"");
        assert_eq!(ScanStatus::FoundInCatalog.to_string(), "found_in_catalog");
    }

    #[test]
    fn test_engine_from_str() {
        assert_eq!("vision".parse::<OcrEngineKind>().unwrap(), OcrEngineKind::CloudVision);
        assert_eq!("ocrspace".parse::<OcrEngineKind>().unwrap(), OcrEngineKind::CloudOcr);
        assert_eq!("LOCAL".parse::<OcrEngineKind>().unwrap(), OcrEngineKind::Local);
        assert!("paper".parse::<OcrEngineKind>().is_err());
        assert_eq!(OcrEngineKind::CloudOcr.to_string(), "cloud-ocr");
    }

    #[test]
    fn test_job_config_defaults() {
        let config: OcrJobConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, OcrJobConfig::default());
        assert!(config.auto_search);
        assert_eq!(config.engine, OcrEngineKind::CloudVision);
    }

    #[test]
    fn test_row_search_query() {
        let mut row = ScanRow::new(RowId::new(1), "", ScanStatus::NeedsManualEntry);
        assert_eq!(row.search_query(), "");
        row.title = Some("Kambing Jantan".into());
        assert_eq!(row.search_query(), "Kambing Jantan");
        row.author = Some("Raditya Dika".into());
        assert_eq!(row.search_query(), "Kambing Jantan Raditya Dika");
        row.isbn = "9789797805142".into();
        assert_eq!(row.search_query(), "9789797805142");
    }
}
