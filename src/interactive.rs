//! 対話式の候補選択・書籍追加・所蔵追加・本棚表示
//!
//! 候補ピッカー、書籍フォーム、所蔵フォーム、本棚の編集フォームを `dialoguer` で表示する。
//! 入力検証はフォーム側（common::forms）で行い、失敗したらメッセージを出して聞き直す。

use crate::cataloger::Cataloger;
use crate::error::{BookFinderError, Result};
use book_finder_common::forms::{BookForm, HoldingForm};
use book_finder_common::session::CandidatePicker;
use book_finder_common::types::{
    BookshelfEntry, BookshelfPage, Candidate, Location, RowId, ScanRow, ScanStatus,
};
use dialoguer::{Confirm, Input, Select};

/// 候補ピッカーでの選択
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerChoice {
    /// 候補を選ぶ
    Candidate(usize),
    /// 手入力で追加
    Manual,
    /// 閉じる
    Close,
}

/// 行に対する操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// 所蔵を追加（カタログにある書籍）
    AddHolding,
    /// 書籍を作成して所蔵を追加
    AddBook,
    /// 候補検索をやり直す
    Research,
    /// スキップ
    Skip,
}

/// 行の状態から選べる操作
pub fn actions_for(row: &ScanRow) -> Vec<RowAction> {
    match row.status {
        ScanStatus::FoundInCatalog | ScanStatus::Saved => {
            vec![RowAction::AddHolding, RowAction::Skip]
        }
        ScanStatus::NotInCatalog | ScanStatus::NeedsManualEntry => {
            vec![RowAction::AddBook, RowAction::Research, RowAction::Skip]
        }
        ScanStatus::Error if row.catalog_book_id.is_some() => {
            vec![RowAction::AddHolding, RowAction::Skip]
        }
        ScanStatus::Error => vec![RowAction::AddBook, RowAction::Research, RowAction::Skip],
        ScanStatus::Loading => vec![RowAction::Skip],
    }
}

fn action_label(action: RowAction) -> &'static str {
    match action {
        RowAction::AddHolding => "所蔵を追加",
        RowAction::AddBook => "書籍と所蔵を追加",
        RowAction::Research => "候補を再検索",
        RowAction::Skip => "スキップ",
    }
}

/// 候補1件の表示文字列
pub fn candidate_label(candidate: &Candidate) -> String {
    let mut label = format!("[{}] {}", candidate.source.label(), candidate.title);
    if !candidate.author.trim().is_empty() {
        label.push_str(&format!(" / {}", candidate.author));
    }
    if let Some(isbn) = &candidate.isbn {
        label.push_str(&format!(" ({})", isbn));
    }
    if !candidate.holdings.is_empty() {
        label.push_str(&format!(" 所蔵{}件", candidate.holdings.len()));
    }
    label
}

/// 行の一覧表示用の1行
pub fn row_line(row: &ScanRow) -> String {
    let mut line = format!("{} {} [{}]", row.id, row.isbn, row.status);
    match (&row.title, &row.author) {
        (Some(title), Some(author)) => line.push_str(&format!(" {} / {}", title, author)),
        (Some(title), None) => line.push_str(&format!(" {}", title)),
        _ => {}
    }
    if let Some(summary) = &row.holding_summary {
        line.push_str(&format!(" · {}", summary));
    }
    if let Some(message) = &row.message {
        line.push_str(&format!(" ({})", message));
    }
    line
}

/// 行の一覧を表示
pub fn print_rows(rows: &[ScanRow]) {
    if rows.is_empty() {
        println!("  (スキャン結果はありません)");
        return;
    }
    for row in rows {
        println!("  {}", row_line(row));
    }
}

/// 本棚一覧の1冊分の見出し
pub fn bookshelf_line(entry: &BookshelfEntry) -> String {
    let mut line = format!("#{} {}", entry.book_id, entry.title);
    if !entry.author.trim().is_empty() {
        line.push_str(&format!(" / {}", entry.author));
    }
    if !entry.isbn.trim().is_empty() {
        line.push_str(&format!(" ({})", entry.isbn));
    }
    line.push_str(&format!(
        " · {} shelves · qty {}",
        entry.holdings.len(),
        entry.total_qty
    ));
    if entry.cover_url.is_none() {
        line.push_str(" [表紙なし]");
    }
    line
}

/// 本棚の1ページを表示
pub fn print_bookshelf(page: &BookshelfPage) {
    if page.data.is_empty() {
        println!("  (該当する書籍はありません)");
    }
    for entry in &page.data {
        println!("  {}", bookshelf_line(entry));
        for holding in &entry.holdings {
            println!("      所蔵#{} {}", holding.id, holding.summary());
        }
    }
    println!("\n{}", page.paging.range_label());
}

/// 候補ピッカーを表示して選択を返す
pub fn pick_candidate(picker: &CandidatePicker) -> Result<PickerChoice> {
    println!("🔎 \"{}\": {}", picker.query, picker.status);

    let mut items: Vec<String> = picker.candidates.iter().map(candidate_label).collect();
    items.push("手入力で追加".to_string());
    items.push("閉じる".to_string());

    let selected = Select::new()
        .with_prompt("候補を選択")
        .items(&items[..])
        .default(0)
        .interact()?;

    let count = picker.candidates.len();
    Ok(if selected < count {
        PickerChoice::Candidate(selected)
    } else if selected == count {
        PickerChoice::Manual
    } else {
        PickerChoice::Close
    })
}

/// ピッカーの選択を反映し、選ばれた行の操作へ進む
pub async fn resolve_picker(cataloger: &Cataloger) -> Result<Option<RowId>> {
    let Some(picker) = cataloger.picker() else {
        return Ok(None);
    };

    let id = match pick_candidate(&picker)? {
        PickerChoice::Candidate(index) => cataloger.select_candidate(Some(index))?,
        PickerChoice::Manual => cataloger.select_candidate(None)?,
        PickerChoice::Close => {
            cataloger.close_picker();
            return Ok(None);
        }
    };

    review_row(cataloger, id).await?;
    Ok(Some(id))
}

/// 行1件に対する操作を選んで実行する
pub async fn review_row(cataloger: &Cataloger, id: RowId) -> Result<()> {
    let Some(row) = cataloger.row(id) else {
        return Ok(());
    };
    println!("\n{}", row_line(&row));

    let actions = actions_for(&row);
    let labels: Vec<&str> = actions.iter().map(|a| action_label(*a)).collect();
    let selected = Select::new()
        .with_prompt("操作")
        .items(&labels[..])
        .default(0)
        .interact()?;

    match actions[selected] {
        RowAction::AddHolding => {
            let form = prompt_holding_form(cataloger).await?;
            match cataloger.save_holding(id, &form).await {
                Ok(info) => println!("✔ 所蔵を追加: {}", info.summary()),
                Err(e) => println!("✗ {}", e.user_message()),
            }
        }
        RowAction::AddBook => {
            let book = prompt_book_form(&row)?;
            let holding = prompt_holding_form(cataloger).await?;
            match cataloger.save_book_and_holding(id, &book, &holding).await {
                Ok(created) => println!("✔ 書籍を追加: {} / {}", created.title, created.author),
                Err(e) => println!("✗ {}", e.user_message()),
            }
        }
        RowAction::Research => {
            cataloger.rerun_search(id).await?;
            if cataloger.picker().is_some() {
                Box::pin(resolve_picker(cataloger)).await?;
            }
        }
        RowAction::Skip => println!("  → スキップ"),
    }
    Ok(())
}

/// 操作が必要な行を順に確認する
pub async fn review_session(cataloger: &Cataloger) -> Result<()> {
    let pending: Vec<RowId> = cataloger
        .rows()
        .into_iter()
        .rev()
        .filter(|row| row.status != ScanStatus::Loading)
        .map(|row| row.id)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    if !Confirm::new()
        .with_prompt(format!("{}件を確認しますか?", pending.len()))
        .default(true)
        .interact()?
    {
        return Ok(());
    }

    for id in pending {
        review_row(cataloger, id).await?;
    }
    Ok(())
}

/// 書籍フォーム（行の値を初期値にする）
pub fn prompt_book_form(row: &ScanRow) -> Result<BookForm> {
    loop {
        let form = BookForm {
            isbn: prompt_text("ISBN", &row.isbn)?,
            title: prompt_text("タイトル", row.title.as_deref().unwrap_or(""))?,
            author: prompt_text("著者", row.author.as_deref().unwrap_or(""))?,
            cover_url: row.cover_url.clone(),
        };
        match form.validate() {
            Ok(_) => return Ok(form),
            Err(e) => println!("✗ {}", e),
        }
    }
}

/// 本棚の書籍編集フォーム（現在の値を初期値にする）
pub fn prompt_book_edit(initial: &BookForm) -> Result<BookForm> {
    loop {
        let form = BookForm {
            isbn: prompt_text("ISBN", &initial.isbn)?,
            title: prompt_text("タイトル", &initial.title)?,
            author: prompt_text("著者", &initial.author)?,
            cover_url: initial.cover_url.clone(),
        };
        match form.validate_update() {
            Ok(_) => return Ok(form),
            Err(e) => println!("✗ {}", e),
        }
    }
}

/// 所蔵フォーム（場所はAPIで検索して選ぶ）
pub async fn prompt_holding_form(cataloger: &Cataloger) -> Result<HoldingForm> {
    loop {
        let location = prompt_location(cataloger).await?;
        let shelf_number = prompt_text("棚番号", "")?;
        let qty: u32 = Input::new()
            .with_prompt("冊数")
            .default(1)
            .interact_text()?;

        let form = HoldingForm {
            location,
            shelf_number,
            qty,
        };
        match form.validate() {
            Ok(_) => return Ok(form),
            Err(e) => println!("✗ {}", e),
        }
    }
}

async fn prompt_location(cataloger: &Cataloger) -> Result<Option<Location>> {
    let query = prompt_text("場所を検索", "")?;
    let locations = match cataloger.search_locations(&query).await {
        Ok(locations) => locations,
        Err(e) => {
            println!("✗ 場所を取得できません: {}", e.user_message());
            return Ok(None);
        }
    };
    if locations.is_empty() {
        println!("  該当する場所がありません");
        return Ok(None);
    }

    let names: Vec<&str> = locations.iter().map(|l| l.name.as_str()).collect();
    let selected = Select::new()
        .with_prompt("場所")
        .items(&names[..])
        .default(0)
        .interact()?;
    Ok(locations.into_iter().nth(selected))
}

fn prompt_text(prompt: &str, initial: &str) -> Result<String> {
    let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
    if !initial.is_empty() {
        input = input.with_initial_text(initial);
    }
    input
        .interact_text()
        .map_err(|e| BookFinderError::Prompt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use book_finder_common::types::{CandidateSource, HoldingInfo};

    fn row(status: ScanStatus) -> ScanRow {
        ScanRow::new(RowId::new(3), "9780141036144", status)
    }

    #[test]
    fn test_actions_for_catalog_row() {
        assert_eq!(
            actions_for(&row(ScanStatus::FoundInCatalog)),
            vec![RowAction::AddHolding, RowAction::Skip]
        );
        assert_eq!(actions_for(&row(ScanStatus::Loading)), vec![RowAction::Skip]);
    }

    #[test]
    fn test_actions_for_error_row_depends_on_book_link() {
        let mut failed = row(ScanStatus::Error);
        assert!(actions_for(&failed).contains(&RowAction::AddBook));

        failed.catalog_book_id = Some(8);
        assert_eq!(
            actions_for(&failed),
            vec![RowAction::AddHolding, RowAction::Skip]
        );
    }

    #[test]
    fn test_candidate_label() {
        let candidate = Candidate {
            title: "1984".into(),
            author: "George Orwell".into(),
            isbn: Some("9780141036144".into()),
            source: CandidateSource::Catalog,
            cover_url: None,
            catalog_book_id: Some(3),
            holdings: vec![HoldingInfo {
                id: Some(1),
                location_id: Some(2),
                location_name: "Main".into(),
                shelf_number: "A-3".into(),
                qty: 2,
            }],
        };
        assert_eq!(
            candidate_label(&candidate),
            "[DB] 1984 / George Orwell (9780141036144) 所蔵1件"
        );
    }

    #[test]
    fn test_bookshelf_line() {
        let entry = BookshelfEntry {
            book_id: 7,
            isbn: "9789797805142".into(),
            title: "Kambing Jantan".into(),
            author: "Raditya Dika".into(),
            cover_url: None,
            total_qty: 3,
            holdings: vec![book_finder_common::types::BookshelfHolding {
                id: 1,
                location_id: 2,
                location: "Main".into(),
                shelf: "A-3".into(),
                qty: 3,
            }],
        };
        assert_eq!(
            bookshelf_line(&entry),
            "#7 Kambing Jantan / Raditya Dika (9789797805142) · 1 shelves · qty 3 [表紙なし]"
        );
    }

    #[test]
    fn test_row_line_with_message() {
        let mut failed = row(ScanStatus::Error);
        failed.message = Some("Network error".into());
        assert_eq!(row_line(&failed), "row-3 9780141036144 [error] (Network error)");
    }
}
