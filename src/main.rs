use book_finder_common::forms::HoldingForm;
use book_finder_common::isbn;
use book_finder_common::query::{PatternAuthorMatcher, QueryBuilder};
use book_finder_common::types::{BookshelfFilter, Location, NewHolding, OcrJobConfig};
use book_finder_rust::api::{CatalogApi, HttpCatalogClient, SearchOptions};
use book_finder_rust::barcode::{ScanEnd, ScanLoop, ScanLoopConfig};
use book_finder_rust::camera::FolderCamera;
use book_finder_rust::cataloger::Cataloger;
use book_finder_rust::ocr::{self, OcrCache, OcrCapture};
use book_finder_rust::{bookshelf, cli, config, error, interactive};
use clap::Parser;
use cli::{BookshelfAction, Cli, Commands, HoldingAction};
use config::Config;
use error::{BookFinderError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Isbn { values, lookup } => {
            let cataloger = if lookup { Some(build_cataloger(&config, None)?) } else { None };

            for value in values {
                let normalized = isbn::normalize(&value);
                if normalized.is_empty() {
                    println!("✗ {}: 無効なISBN", value);
                    continue;
                }
                println!("✔ {} → {}", value, normalized);

                if let Some(cataloger) = &cataloger {
                    match cataloger.api().lookup_isbn(&normalized).await {
                        Ok(response) => match response.book {
                            Some(book) if response.found => {
                                println!("  カタログ: {} / {}", book.title, book.author);
                                for holding in &response.holdings {
                                    println!("  所蔵: {}", holding.summary());
                                }
                            }
                            _ => println!("  カタログにありません"),
                        },
                        Err(e) => println!("  照会エラー: {}", e.user_message()),
                    }
                }
            }
        }

        Commands::Scan { folder, decoder, interval, no_review } => {
            println!("📷 book-finder - バーコードスキャン\n");
            let cataloger = build_cataloger(&config, None)?;

            // 1. スキャン
            println!("[1/3] スキャン中... ({})", folder.display());
            let interval = Duration::from_millis(interval.unwrap_or(config.scan_interval_ms));
            let camera = Arc::new(FolderCamera::new(folder.clone()));
            let mut scan_loop = ScanLoop::new(
                camera,
                ScanLoopConfig { interval, decoder, ..ScanLoopConfig::default() },
            );

            let detections = cataloger.clone();
            scan_loop
                .start(move |hit| {
                    if let Some(id) = detections.handle_detection(&hit.payload) {
                        println!("  + {} ({}) {}", hit.payload, hit.format, id);
                    }
                })
                .await?;

            match scan_loop.wait().await {
                Some(summary) => {
                    println!(
                        "✔ {}フレーム / 検出{}件 (デコーダ: {})\n",
                        summary.frames, summary.hits, summary.decoder
                    );
                    if let ScanEnd::Failed(message) = summary.end {
                        println!("⚠ カメラが停止しました: {}\n", message);
                    }
                }
                None => println!("✔ スキャンを停止しました\n"),
            }

            // 2. 照会
            println!("[2/3] カタログ照会中...");
            cataloger.wait_idle().await;
            interactive::print_rows(&cataloger.rows());
            println!();

            // 3. 確認
            if !no_review {
                println!("[3/3] 確認");
                interactive::review_session(&cataloger).await?;
                println!();
                interactive::print_rows(&cataloger.rows());
            }

            println!("\n✅ 完了");
        }

        Commands::Add { isbn } => {
            println!("⌨ book-finder - 手入力\n");
            let cataloger = build_cataloger(&config, None)?;

            let raw = match isbn {
                Some(isbn) => isbn,
                None => dialoguer::Input::<String>::new()
                    .with_prompt("ISBN")
                    .interact_text()?,
            };

            let Some(id) = cataloger.submit_manual_isbn(&raw)? else {
                println!("すでに追加済みです");
                return Ok(());
            };
            cataloger.wait_idle().await;
            if cataloger.picker().is_some() {
                interactive::resolve_picker(&cataloger).await?;
            } else {
                interactive::review_row(&cataloger, id).await?;
            }
            println!();
            interactive::print_rows(&cataloger.rows());
        }

        Commands::Ocr { image, engine, focus, crop_center, no_auto_search, use_cache } => {
            println!("🔤 book-finder - 表紙OCR\n");
            let cataloger = build_cataloger(&config, None)?;
            let job = OcrJobConfig {
                engine: engine.unwrap_or(config.default_engine),
                focus_region: focus,
                crop_to_center: crop_center,
                auto_search: !no_auto_search,
            };

            // 1. 認識
            println!(
                "[1/2] OCR中... ({}){}",
                job.engine,
                if use_cache { " (キャッシュ有効)" } else { "" }
            );
            let bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template("  {bar:40} {pos:>3}%") {
                bar.set_style(style);
            }
            let observer = bar.clone();
            let engine = ocr::build_engine(job.engine, &config, cataloger.api());
            let capture = OcrCapture::new(engine)
                .with_observer(Arc::new(move |p: u8| observer.set_position(u64::from(p))));

            let text = ocr::recognize_file(&capture, &image, &job, use_cache).await;
            bar.finish_and_clear();
            let text = text?;
            if text.is_empty() {
                return Err(BookFinderError::Search("No text extracted. Try again.".into()));
            }
            println!("✔ 認識テキスト:");
            for line in text.lines() {
                println!("  | {}", line);
            }
            println!();

            // 2. 検索
            if !job.auto_search {
                println!("✅ 完了（自動検索なし）");
                return Ok(());
            }
            println!("[2/2] 候補を検索中...");
            let resolution = cataloger.search_with_fallback(&text).await?;
            match &resolution.matched_query {
                Some(query) => println!(
                    "✔ {}件 (\"{}\", {}回目)\n",
                    resolution.candidates.len(),
                    query,
                    resolution.attempts
                ),
                None => println!("✔ 候補なし ({}回試行)\n", resolution.attempts),
            }
            interactive::resolve_picker(&cataloger).await?;
        }

        Commands::Search { query, external, limit } => {
            let options = SearchOptions {
                force_external: external,
                limit: Some(limit.unwrap_or(config.search_limit)),
            };
            let cataloger = build_cataloger(&config, Some(options))?;
            let query = query.join(" ");

            println!("🔎 \"{}\" を検索中...", query);
            let candidates = cataloger.search_direct(&query).await?;
            println!("✔ {}件\n", candidates.len());
            interactive::resolve_picker(&cataloger).await?;
        }

        Commands::Holding { action } => {
            let cataloger = build_cataloger(&config, None)?;
            match action {
                HoldingAction::Add { isbn } => {
                    let Some(id) = cataloger.submit_manual_isbn(&isbn)? else {
                        return Ok(());
                    };
                    cataloger.wait_idle().await;
                    interactive::review_row(&cataloger, id).await?;
                }
                HoldingAction::Update { id, location, shelf, qty } => {
                    let form = HoldingForm {
                        location: Some(Location { id: location, name: String::new() }),
                        shelf_number: shelf,
                        qty,
                    };
                    let holding: NewHolding = form.validate()?;
                    let info = cataloger.api().update_holding(id, &holding).await?;
                    println!("✔ 所蔵を更新: {}", info.summary());
                }
                HoldingAction::Delete { id } => {
                    cataloger.api().delete_holding(id).await?;
                    println!("✔ 所蔵を削除しました: {}", id);
                }
            }
        }

        Commands::Bookshelf { action } => {
            let client = HttpCatalogClient::from_config(&config)?;
            match action {
                BookshelfAction::List { title, author, isbn, location, shelf, limit, offset } => {
                    let filter = BookshelfFilter {
                        title: title.unwrap_or_default(),
                        author: author.unwrap_or_default(),
                        isbn: isbn.unwrap_or_default(),
                        location: location.unwrap_or_default(),
                        shelf: shelf.unwrap_or_default(),
                        limit,
                        offset,
                    };
                    let page = bookshelf::browse(&client, &filter).await?;
                    interactive::print_bookshelf(&page);
                    if let Some(next) = page.paging.next_offset() {
                        println!("  次のページ: --offset {}", next);
                    }
                }
                BookshelfAction::Edit { isbn } => {
                    let Some(entry) = bookshelf::find_by_isbn(&client, &isbn).await? else {
                        println!("✗ 本棚に見つかりません: {}", isbn);
                        return Ok(());
                    };
                    println!("{}", interactive::bookshelf_line(&entry));
                    let form = interactive::prompt_book_edit(&bookshelf::edit_form(&entry))?;
                    let book = bookshelf::update_book(&client, entry.book_id, &form).await?;
                    println!("✔ 書籍を更新: {} / {} ({})", book.title, book.author, book.isbn);
                }
                BookshelfAction::Cover { isbn } => {
                    let Some(entry) = bookshelf::find_by_isbn(&client, &isbn).await? else {
                        println!("✗ 本棚に見つかりません: {}", isbn);
                        return Ok(());
                    };
                    println!("🔎 表紙を検索中... ({})", entry.cover_query());
                    let book = bookshelf::fetch_cover(&client, &entry).await?;
                    println!("✔ 表紙を設定: {}", book.cover_url.unwrap_or_default());
                }
            }
        }

        Commands::Config { set_token, set_api_base, show } => {
            let mut config = config;

            if let Some(token) = set_token {
                config.set_token(token)?;
                println!("✔ APIトークンを設定しました");
            }

            if let Some(url) = set_api_base {
                config.set_api_base_url(url)?;
                println!("✔ APIのURLを設定しました");
            }

            if show {
                println!("設定:");
                println!("  API: {}", config.api_base_url());
                println!("  トークン: {}", if config.get_token().is_ok() { "設定済み" } else { "未設定" });
                println!("  OCRエンジン: {}", config.default_engine);
                println!("  検索件数: {}", config.search_limit);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  tesseract: {} (-l {})", config.tesseract_command, config.tesseract_language);
                println!("  スキャン間隔: {}ms", config.scan_interval_ms);
                println!("  ノイズ語: {}", config.stopwords.join(", "));
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = OcrCache::cache_path(&target);

            if info || !clear {
                if cache_path.exists() {
                    let cache = OcrCache::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                    for entry in cache.entries() {
                        println!("  - {} ({}, {})", entry.file_name, entry.engine, entry.cached_at.format("%Y-%m-%d %H:%M"));
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match OcrCache::clear(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

/// 設定からAPIクライアントと取りまとめを作る
fn build_cataloger(config: &Config, options: Option<SearchOptions>) -> Result<Cataloger> {
    let client = HttpCatalogClient::from_config(config)?;
    let api: Arc<dyn CatalogApi> = Arc::new(client);

    let queries = QueryBuilder::new()
        .with_stopwords(config.stopwords.as_slice())
        .with_matcher(PatternAuthorMatcher::new(&config.author_patterns)?);
    let options = options.unwrap_or(SearchOptions {
        force_external: false,
        limit: Some(config.search_limit),
    });

    Ok(Cataloger::new(api, queries).with_search_options(options))
}
