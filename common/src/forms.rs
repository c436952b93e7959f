//! 書籍追加・書籍編集・所蔵追加フォームの入力検証
//!
//! 検証に失敗した場合はネットワークに出ずにメッセージを返し、フォームは開いたままにする。

use crate::error::{Error, Result};
use crate::types::{Location, NewBook, NewHolding};

/// 書籍追加フォーム
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookForm {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
}

impl BookForm {
    pub fn validate(&self) -> Result<NewBook> {
        if self.isbn.trim().is_empty() {
            return Err(Error::Validation("ISBN is required.".into()));
        }
        if self.title.trim().is_empty() || self.author.trim().is_empty() {
            return Err(Error::Validation("Title and author are required.".into()));
        }

        Ok(NewBook {
            isbn: self.isbn.trim().to_string(),
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            cover_url: self
                .cover_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    /// 本棚からの書籍編集（3項目すべて必須）
    pub fn validate_update(&self) -> Result<NewBook> {
        if self.isbn.trim().is_empty() || self.title.trim().is_empty() || self.author.trim().is_empty() {
            return Err(Error::Validation("ISBN, title, and author are required.".into()));
        }
        self.validate()
    }
}

/// 所蔵追加フォーム
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingForm {
    pub location: Option<Location>,
    pub shelf_number: String,
    pub qty: u32,
}

impl Default for HoldingForm {
    fn default() -> Self {
        Self {
            location: None,
            shelf_number: String::new(),
            qty: 1,
        }
    }
}

impl HoldingForm {
    pub fn validate(&self) -> Result<NewHolding> {
        let location = match &self.location {
            Some(location) if !self.shelf_number.trim().is_empty() => location,
            _ => return Err(Error::Validation("Location and shelf are required.".into())),
        };
        if self.qty == 0 {
            return Err(Error::Validation("Quantity must be at least 1.".into()));
        }

        Ok(NewHolding {
            location_id: location.id,
            shelf_number: self.shelf_number.trim().to_string(),
            qty: self.qty,
        })
    }

    /// 保存後に行へ表示する要約
    pub fn summary(&self) -> String {
        let name = self.location.as_ref().map(|l| l.name.as_str()).unwrap_or("");
        format!("{} · {} · qty {}", name, self.shelf_number.trim(), self.qty)
    }
}
