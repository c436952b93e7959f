//! バーコード検出
//!
//! - `Ean13Detector`: EAN-13/UPC-A 専用の高速検出（フレーム中央付近の走査線のみ）
//! - `MultiFormatDecoder`: 汎用デコーダ（EAN-13/UPC-A/EAN-8、全体の走査線・両方向・90度回転）
//! - `ScanLoop`: カメラのフレームを回してヒットを通知するループ

mod ean;
mod multi;
mod scan_loop;

pub use ean::Ean13Detector;
pub use multi::MultiFormatDecoder;
pub use scan_loop::{LoopState, ScanEnd, ScanLoop, ScanLoopConfig, ScanMode, ScanSummary};

use crate::error::Result;
use image::GrayImage;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarcodeFormat {
    Ean13,
    UpcA,
    Ean8,
}

impl fmt::Display for BarcodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarcodeFormat::Ean13 => write!(f, "ean_13"),
            BarcodeFormat::UpcA => write!(f, "upc_a"),
            BarcodeFormat::Ean8 => write!(f, "ean_8"),
        }
    }
}

/// 1件の検出結果（payload は生の数字列）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarcodeHit {
    pub format: BarcodeFormat,
    pub payload: String,
}

/// フレームからバーコードを読むデコーダ
pub trait BarcodeDecoder: Send {
    fn name(&self) -> &'static str;

    /// 1フレームを解析する（何もなければ空）
    fn decode(&mut self, frame: &GrayImage) -> Result<Vec<BarcodeHit>>;

    /// 保持しているリソースを解放する（複数回呼ばれてもよい）
    fn release(&mut self) {}
}

/// デコーダの選択
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecoderChoice {
    /// ネイティブ検出があれば使い、なければ汎用デコーダ
    #[default]
    Auto,
    Native,
    Multi,
}

impl FromStr for DecoderChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DecoderChoice::Auto),
            "native" | "ean13" => Ok(DecoderChoice::Native),
            "multi" | "zxing" => Ok(DecoderChoice::Multi),
            _ => Err(format!("Unknown decoder: {}. Use auto, native, or multi", s)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_choice_from_str() {
        assert_eq!("auto".parse::<DecoderChoice>().unwrap(), DecoderChoice::Auto);
        assert_eq!("NATIVE".parse::<DecoderChoice>().unwrap(), DecoderChoice::Native);
        assert_eq!("zxing".parse::<DecoderChoice>().unwrap(), DecoderChoice::Multi);
        assert!("qr".parse::<DecoderChoice>().is_err());
    }

    #[test]
    fn test_format_display() {
        assert_eq!(BarcodeFormat::Ean13.to_string(), "ean_13");
        assert_eq!(BarcodeFormat::UpcA.to_string(), "upc_a");
    }
}
