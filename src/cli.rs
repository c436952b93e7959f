use crate::barcode::DecoderChoice;
use book_finder_common::types::{FocusRegion, OcrEngineKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "book-finder")]
#[command(about = "書籍バーコード・表紙OCRによる蔵書登録ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// ISBNを検証・正規化（--lookup でカタログも照会）
    Isbn {
        /// ISBN（ハイフン・空白可）
        #[arg(required = true)]
        values: Vec<String>,

        /// カタログで照会する
        #[arg(short, long)]
        lookup: bool,
    },

    /// 撮影フレームのフォルダからバーコードを連続スキャン
    Scan {
        /// フレーム画像のフォルダ
        #[arg(required = true)]
        folder: PathBuf,

        /// デコーダ (auto/native/multi)
        #[arg(short, long, default_value = "auto")]
        decoder: DecoderChoice,

        /// フレーム間隔（ミリ秒、省略時は設定値）
        #[arg(short, long)]
        interval: Option<u64>,

        /// スキャン後の確認をしない
        #[arg(long)]
        no_review: bool,
    },

    /// ISBNを手入力で追加（省略時は対話入力）
    Add {
        /// ISBN
        isbn: Option<String>,
    },

    /// 表紙写真をOCRして候補を検索
    Ocr {
        /// 表紙画像
        #[arg(required = true)]
        image: PathBuf,

        /// OCRエンジン (local/cloud-vision/cloud-ocr、省略時は設定値)
        #[arg(short, long)]
        engine: Option<OcrEngineKind>,

        /// 注目領域 (full/title/author)
        #[arg(short, long, default_value = "full")]
        focus: FocusRegion,

        /// 中央部分だけを使う
        #[arg(long)]
        crop_center: bool,

        /// 認識後に自動検索しない
        #[arg(long)]
        no_auto_search: bool,

        /// キャッシュを使用（再認識をスキップ）
        #[arg(long)]
        use_cache: bool,
    },

    /// タイトル・著者で候補を検索
    Search {
        /// 検索語
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// 外部ソースも検索
        #[arg(short = 'x', long)]
        external: bool,

        /// 最大件数（省略時は設定値）
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// 所蔵の追加・更新・削除
    Holding {
        #[command(subcommand)]
        action: HoldingAction,
    },

    /// 本棚（登録済み書籍）の一覧・編集・表紙取得
    Bookshelf {
        #[command(subcommand)]
        action: BookshelfAction,
    },

    /// 設定を表示/編集
    Config {
        /// APIトークンを設定
        #[arg(long)]
        set_token: Option<String>,

        /// カタログAPIのURLを設定
        #[arg(long)]
        set_api_base: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// OCRキャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

#[derive(Subcommand)]
pub enum HoldingAction {
    /// ISBNで書籍を照会して所蔵を追加
    Add {
        /// ISBN
        #[arg(required = true)]
        isbn: String,
    },

    /// 所蔵を更新
    Update {
        /// 所蔵ID
        #[arg(required = true)]
        id: i64,

        /// 場所ID
        #[arg(long)]
        location: i64,

        /// 棚番号
        #[arg(long)]
        shelf: String,

        /// 冊数
        #[arg(long, default_value = "1")]
        qty: u32,
    },

    /// 所蔵を削除
    Delete {
        /// 所蔵ID
        #[arg(required = true)]
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BookshelfAction {
    /// 一覧を表示
    List {
        /// タイトル
        #[arg(long)]
        title: Option<String>,

        /// 著者
        #[arg(long)]
        author: Option<String>,

        /// ISBN
        #[arg(long)]
        isbn: Option<String>,

        /// 場所名
        #[arg(long)]
        location: Option<String>,

        /// 棚番号
        #[arg(long)]
        shelf: Option<String>,

        /// 1ページの件数
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// 開始位置
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },

    /// 書籍のISBN・タイトル・著者を編集
    Edit {
        /// 対象のISBN
        #[arg(required = true)]
        isbn: String,
    },

    /// 外部ソースから表紙を取得して設定
    Cover {
        /// 対象のISBN
        #[arg(required = true)]
        isbn: String,
    },
}
