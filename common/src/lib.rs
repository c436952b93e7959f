//! Book Finder Common Library
//!
//! CLIとテストで共有される型・ISBN処理・クエリ生成・セッション管理

pub mod error;
pub mod forms;
pub mod isbn;
pub mod query;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use forms::{BookForm, HoldingForm};
pub use query::{build_queries, AuthorMatcher, PatternAuthorMatcher, QueryBuilder};
pub use session::{
    CandidatePicker, Detection, LookupOutcome, SavedRecord, SearchTicket, Session,
};
pub use types::{
    Book, Candidate, CandidateSource, FocusRegion, HoldingInfo, Location, LookupResponse,
    NewBook, NewHolding, OcrEngineKind, OcrJobConfig, RowId, ScanRow, ScanStatus,
};
