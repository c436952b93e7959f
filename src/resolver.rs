//! 候補の解決（フォールバック検索）
//!
//! クエリを優先順に1件ずつ投げ、最初に1件以上ヒットしたところで止める。
//! リクエストの失敗はそのクエリの「0件」として扱い、次へ進む。
//! 全部外れたら空の候補（エラーではない）。

use crate::api::{CatalogApi, SearchOptions};
use crate::error::{BookFinderError, Result};
use book_finder_common::types::Candidate;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    /// ヒットしたクエリ（なければ None）
    pub matched_query: Option<String>,
    /// 実際に投げたクエリ数
    pub attempts: usize,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub async fn resolve_with_fallback(
    api: &dyn CatalogApi,
    queries: &[String],
    options: &SearchOptions,
) -> Resolution {
    let mut resolution = Resolution::default();

    for query in queries {
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        resolution.attempts += 1;

        match api.search(query, options).await {
            Ok(candidates) if !candidates.is_empty() => {
                tracing::debug!(query = %query, hits = candidates.len(), "fallback search matched");
                resolution.candidates = candidates;
                resolution.matched_query = Some(query.to_string());
                return resolution;
            }
            Ok(_) => tracing::debug!(query = %query, "no results, trying next query"),
            Err(e) => tracing::warn!(query = %query, error = %e, "search failed, trying next query"),
        }
    }

    resolution
}

/// 1クエリだけの検索（失敗は `Search` として返す）
pub async fn search_direct(
    api: &dyn CatalogApi,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<Candidate>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(book_finder_common::Error::EmptyQuery.into());
    }
    api.search(query, options)
        .await
        .map_err(|e| BookFinderError::Search(e.user_message()))
}
