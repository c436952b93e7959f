//! OCRテキストから検索クエリ候補を生成する
//!
//! ## 処理フロー
//! 1. NFD分解して結合文字（ダイアクリティカルマーク）を除去
//! 2. 英数字以外を空白に置換、ストップワードを除去、行ごとに空白を詰める
//! 3. 先頭行をタイトル、著者パターンに合う行を著者行とみなす
//! 4. 大文字だけの行が2行以上あれば先頭2行を連結タイトルとする
//! 5. 具体的な組み合わせ → 広いクエリの順に並べ、重複を除く

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 既定のストップワード（表紙によく出るノイズ語）
pub const DEFAULT_STOPWORDS: &[&str] = &["sebuah", "novel", "komedi", "oleh"];

/// 既定の著者パターン（既知の著者名と "by ..." 表記）
pub const DEFAULT_AUTHOR_PATTERNS: &[&str] = &[r"raditya dika", r"^by\s+\S"];

/// 著者行の判定（差し替え可能）
pub trait AuthorMatcher: Send + Sync {
    fn is_author_line(&self, line: &str) -> bool;
}

/// 正規表現リストで著者行を判定する
#[derive(Debug, Clone)]
pub struct PatternAuthorMatcher {
    patterns: Vec<Regex>,
}

impl PatternAuthorMatcher {
    /// 大文字小文字を区別しない正規表現として登録
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p.as_ref()))
                    .map_err(|e| Error::Parse(format!("author pattern {:?}: {}", p.as_ref(), e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl Default for PatternAuthorMatcher {
    fn default() -> Self {
        lazy_static::lazy_static! {
            static ref DEFAULT_PATTERNS: Vec<Regex> = DEFAULT_AUTHOR_PATTERNS
                .iter()
                .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
                .collect();
        }
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl AuthorMatcher for PatternAuthorMatcher {
    fn is_author_line(&self, line: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(line))
    }
}

/// クエリ生成器
pub struct QueryBuilder {
    stopwords: Option<Regex>,
    matcher: Box<dyn AuthorMatcher>,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            stopwords: stopword_regex(DEFAULT_STOPWORDS),
            matcher: Box::new(PatternAuthorMatcher::default()),
        }
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stopwords<S: AsRef<str>>(mut self, words: &[S]) -> Self {
        self.stopwords = stopword_regex(words);
        self
    }

    pub fn with_matcher(mut self, matcher: impl AuthorMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// 正規化済みの非空行
    pub fn normalized_lines(&self, raw: &str) -> Vec<String> {
        let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();

        stripped
            .lines()
            .map(|line| {
                let ascii: String = line
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() || c.is_whitespace() { c } else { ' ' })
                    .collect();
                let cleaned = match &self.stopwords {
                    Some(re) => re.replace_all(&ascii, " ").into_owned(),
                    None => ascii,
                };
                cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// 優先順のクエリ列を生成（重複・空文字なし）
    pub fn build(&self, raw: &str) -> Vec<String> {
        let lines = self.normalized_lines(raw);
        if lines.is_empty() {
            return Vec::new();
        }

        let normalized = lines.join(" ");
        let title = lines[0].as_str();
        let author_line = lines.iter().find(|line| self.matcher.is_author_line(line));
        let upper_lines: Vec<&String> = lines.iter().filter(|line| is_all_caps(line)).collect();
        let combined_title = if upper_lines.len() >= 2 {
            format!("{} {}", upper_lines[0], upper_lines[1])
        } else {
            String::new()
        };

        let mut queries = Vec::new();

        if let Some(author) = author_line {
            queries.push(format!("{} {}", title, author));
            queries.push(author.clone());
        }

        if !combined_title.is_empty() {
            queries.push(combined_title.clone());
            if let Some(author) = author_line {
                queries.push(format!("{} {}", combined_title, author));
            }
        }

        queries.push(title.to_string());

        let tokens: Vec<&str> = title.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.len() > 1 {
            queries.push(format!("{} {}", tokens[0], tokens[1]));
        }
        if let Some(first) = tokens.first() {
            queries.push(first.to_string());
        }

        queries.push(normalized);

        let mut seen = HashSet::new();
        queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.clone()))
            .collect()
    }
}

/// 既定設定でクエリを生成
pub fn build_queries(raw: &str) -> Vec<String> {
    QueryBuilder::default().build(raw)
}

fn stopword_regex<S: AsRef<str>>(words: &[S]) -> Option<Regex> {
    let alternation = words
        .iter()
        .map(|w| w.as_ref().trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).ok()
}

/// 大文字・数字・空白のみの行
fn is_all_caps(line: &str) -> bool {
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == ' ')
}
