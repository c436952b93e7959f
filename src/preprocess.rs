//! OCR前の画像処理
//!
//! 幅1600pxまで縮小 → 注目領域で切り出し → グレースケール + コントラスト → 必要なら二値化。
//! 同じ入力と設定なら常に同じ結果になる（内部状態なし）。

use crate::error::Result;
use book_finder_common::types::FocusRegion;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

pub const MAX_WIDTH: u32 = 1600;
pub const BINARIZE_THRESHOLD: u8 = 160;
pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOptions {
    pub focus: FocusRegion,
    pub crop_to_center: bool,
    /// CSS の `contrast(p%)` と同じ意味（100で変化なし）
    pub contrast_percent: u32,
    pub binarize: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            focus: FocusRegion::Full,
            crop_to_center: false,
            contrast_percent: 150,
            binarize: false,
        }
    }
}

fn fraction(length: u32, ratio: f64) -> u32 {
    (length as f64 * ratio).round() as u32
}

/// 注目領域の切り出し矩形
///
/// - 横: 中央寄せなら左5%から幅90%、そうでなければ全幅
/// - 縦: title は上5%から45%、author は45%から35%、
///   full は中央寄せなら10%から70%、そうでなければ全高
pub fn crop_rect(width: u32, height: u32, focus: FocusRegion, crop_to_center: bool) -> CropRect {
    let (x, w) = if crop_to_center {
        (fraction(width, 0.05), fraction(width, 0.9))
    } else {
        (0, width)
    };
    let (y, h) = match focus {
        FocusRegion::Title => (fraction(height, 0.05), fraction(height, 0.45)),
        FocusRegion::Author => (fraction(height, 0.45), fraction(height, 0.35)),
        FocusRegion::Full if crop_to_center => (fraction(height, 0.1), fraction(height, 0.7)),
        FocusRegion::Full => (0, height),
    };

    let x = x.min(width.saturating_sub(1));
    let y = y.min(height.saturating_sub(1));
    CropRect {
        x,
        y,
        width: w.clamp(1, (width - x).max(1)),
        height: h.clamp(1, (height - y).max(1)),
    }
}

/// 幅が上限を超えていれば縦横比を保って縮小
pub fn scale_to_max_width(image: &DynamicImage) -> DynamicImage {
    if image.width() <= MAX_WIDTH {
        return image.clone();
    }
    let scale = MAX_WIDTH as f64 / image.width() as f64;
    let height = ((image.height() as f64 * scale).round() as u32).max(1);
    image.resize_exact(MAX_WIDTH, height, FilterType::Triangle)
}

/// CSS `contrast()` と同じ式で画素値を変換
pub fn apply_contrast(gray: &mut GrayImage, percent: u32) {
    if percent == 100 {
        return;
    }
    let factor = percent as f64 / 100.0;
    for pixel in gray.pixels_mut() {
        let value = pixel.0[0] as f64 / 255.0;
        let adjusted = ((value - 0.5) * factor + 0.5).clamp(0.0, 1.0);
        pixel.0[0] = (adjusted * 255.0).round() as u8;
    }
}

/// しきい値より明るければ白、それ以外は黒
pub fn binarize(gray: &mut GrayImage, threshold: u8) {
    for pixel in gray.pixels_mut() {
        *pixel = Luma([if pixel.0[0] > threshold { 255 } else { 0 }]);
    }
}

/// OCR用に画像を整える
pub fn prepare(image: &DynamicImage, options: &PrepareOptions) -> GrayImage {
    let scaled = scale_to_max_width(image);
    let rect = crop_rect(
        scaled.width(),
        scaled.height(),
        options.focus,
        options.crop_to_center,
    );
    let mut gray = scaled
        .crop_imm(rect.x, rect.y, rect.width, rect.height)
        .to_luma8();

    apply_contrast(&mut gray, options.contrast_percent);
    if options.binarize {
        binarize(&mut gray, BINARIZE_THRESHOLD);
    }
    gray
}

/// クラウドOCRへ送る前の切り出し（それ以外の加工はしない）
pub fn crop_for_upload(image: &DynamicImage, focus: FocusRegion, crop_to_center: bool) -> DynamicImage {
    let rect = crop_rect(image.width(), image.height(), focus, crop_to_center);
    if rect.x == 0 && rect.y == 0 && rect.width == image.width() && rect.height == image.height() {
        return image.clone();
    }
    image.crop_imm(rect.x, rect.y, rect.width, rect.height)
}

/// JPEG（品質90）にエンコード
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
        encoder.encode_image(&rgb)?;
    }
    Ok(bytes)
}
