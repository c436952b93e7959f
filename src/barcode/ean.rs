//! EAN/UPC の走査線デコード
//!
//! 1行を二値化してラン長に変換し、ガード・各桁のパターンを
//! 7モジュールに正規化した幅で照合する。最後にチェックディジットを確認する。

use super::{BarcodeDecoder, BarcodeFormat, BarcodeHit};
use crate::error::Result;
use image::GrayImage;

/// L符号（左側・奇数パリティ）のモジュール幅。右側(R)も同じ幅で、G符号はこの逆順
const L_WIDTHS: [[f32; 4]; 10] = [
    [3.0, 2.0, 1.0, 1.0],
    [2.0, 2.0, 2.0, 1.0],
    [2.0, 1.0, 2.0, 2.0],
    [1.0, 4.0, 1.0, 1.0],
    [1.0, 1.0, 3.0, 2.0],
    [1.0, 2.0, 3.0, 1.0],
    [1.0, 1.0, 1.0, 4.0],
    [1.0, 3.0, 1.0, 2.0],
    [1.0, 2.0, 1.0, 3.0],
    [3.0, 1.0, 1.0, 2.0],
];

/// 先頭桁 → 左6桁のパリティ（true = G）
const FIRST_DIGIT_PARITY: [[bool; 6]; 10] = [
    [false, false, false, false, false, false],
    [false, false, true, false, true, true],
    [false, false, true, true, false, true],
    [false, false, true, true, true, false],
    [false, true, false, false, true, true],
    [false, true, true, false, false, true],
    [false, true, true, true, false, false],
    [false, true, false, true, false, true],
    [false, true, false, true, true, false],
    [false, true, true, false, true, false],
];

const EAN13_RUNS: usize = 59;
const EAN8_RUNS: usize = 43;
const MAX_DIGIT_ERROR: f32 = 1.2;
const MIN_CONTRAST: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Run {
    pub dark: bool,
    pub width: usize,
}

/// 1行をラン長に変換（コントラストが足りなければ空）
pub(crate) fn row_runs(row: &[u8]) -> Vec<Run> {
    let (Some(&min), Some(&max)) = (row.iter().min(), row.iter().max()) else {
        return Vec::new();
    };
    if max - min < MIN_CONTRAST {
        return Vec::new();
    }
    let threshold = ((min as u16 + max as u16) / 2) as u8;

    let mut runs: Vec<Run> = Vec::new();
    for &value in row {
        let dark = value < threshold;
        match runs.last_mut() {
            Some(run) if run.dark == dark => run.width += 1,
            _ => runs.push(Run { dark, width: 1 }),
        }
    }
    runs
}

/// 4本のランを7モジュールに正規化して最も近い桁を探す
fn match_digit(runs: &[Run], reversed: bool) -> Option<(usize, f32)> {
    let total: usize = runs.iter().map(|r| r.width).sum();
    if total == 0 {
        return None;
    }
    let scale = 7.0 / total as f32;

    let mut best: Option<(usize, f32)> = None;
    for (digit, pattern) in L_WIDTHS.iter().enumerate() {
        let error: f32 = (0..4)
            .map(|i| {
                let expected = if reversed { pattern[3 - i] } else { pattern[i] };
                (runs[i].width as f32 * scale - expected).abs()
            })
            .sum();
        if best.map_or(true, |(_, e)| error < e) {
            best = Some((digit, error));
        }
    }
    best.filter(|(_, error)| *error < MAX_DIGIT_ERROR)
}

fn guard_ok(runs: &[Run]) -> bool {
    let min = runs.iter().map(|r| r.width).min().unwrap_or(0);
    let max = runs.iter().map(|r| r.width).max().unwrap_or(0);
    min > 0 && max <= min * 2 + 1
}

/// GTIN チェックディジット（右から 3,1,3,1... の重み）
pub(crate) fn gtin_checksum_ok(digits: &[u8]) -> bool {
    let Some((&check, body)) = digits.split_last() else {
        return false;
    };
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| d as u32 * if i % 2 == 0 { 3 } else { 1 })
        .sum();
    (10 - sum % 10) % 10 == check as u32
}

fn decode_ean13_at(runs: &[Run]) -> Option<Vec<u8>> {
    if runs.len() < EAN13_RUNS || !guard_ok(&runs[0..3]) || !guard_ok(&runs[27..32]) {
        return None;
    }

    let mut digits = vec![0u8; 13];
    let mut parity = [false; 6];
    for i in 0..6 {
        let slice = &runs[3 + i * 4..7 + i * 4];
        let odd = match_digit(slice, false);
        let even = match_digit(slice, true);
        let (digit, is_even) = match (odd, even) {
            (Some(o), Some(e)) if e.1 < o.1 => (e.0, true),
            (Some(o), _) => (o.0, false),
            (None, Some(e)) => (e.0, true),
            (None, None) => return None,
        };
        digits[i + 1] = digit as u8;
        parity[i] = is_even;
    }
    for i in 0..6 {
        let slice = &runs[32 + i * 4..36 + i * 4];
        let (digit, _) = match_digit(slice, false)?;
        digits[i + 7] = digit as u8;
    }
    if !guard_ok(&runs[56..59]) {
        return None;
    }

    digits[0] = FIRST_DIGIT_PARITY.iter().position(|p| *p == parity)? as u8;
    gtin_checksum_ok(&digits).then_some(digits)
}

fn decode_ean8_at(runs: &[Run]) -> Option<Vec<u8>> {
    if runs.len() < EAN8_RUNS || !guard_ok(&runs[0..3]) || !guard_ok(&runs[19..24]) {
        return None;
    }

    let mut digits = Vec::with_capacity(8);
    for i in 0..4 {
        let (digit, _) = match_digit(&runs[3 + i * 4..7 + i * 4], false)?;
        digits.push(digit as u8);
    }
    for i in 0..4 {
        let (digit, _) = match_digit(&runs[24 + i * 4..28 + i * 4], false)?;
        digits.push(digit as u8);
    }
    if !guard_ok(&runs[40..43]) {
        return None;
    }

    gtin_checksum_ok(&digits).then_some(digits)
}

fn to_payload(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// ラン列（片方向）からバーコードを探す
pub(crate) fn decode_runs(runs: &[Run], allow_ean8: bool) -> Option<BarcodeHit> {
    for start in 0..runs.len() {
        if !runs[start].dark {
            continue;
        }
        // 直前に十分な余白がない位置は飛ばす
        if start > 0 && runs[start - 1].width < runs[start].width * 3 {
            continue;
        }
        let window = &runs[start..];

        if let Some(digits) = decode_ean13_at(window) {
            let payload = to_payload(&digits);
            return Some(if digits[0] == 0 {
                BarcodeHit { format: BarcodeFormat::UpcA, payload: payload[1..].to_string() }
            } else {
                BarcodeHit { format: BarcodeFormat::Ean13, payload }
            });
        }
        if allow_ean8 {
            if let Some(digits) = decode_ean8_at(window) {
                return Some(BarcodeHit { format: BarcodeFormat::Ean8, payload: to_payload(&digits) });
            }
        }
    }
    None
}

/// 指定した行を走査する（逆方向も試す）
pub(crate) fn scan_row(frame: &GrayImage, y: u32, allow_ean8: bool) -> Option<BarcodeHit> {
    let width = frame.width() as usize;
    let start = y as usize * width;
    let row = frame.as_raw().get(start..start + width)?;

    let mut runs = row_runs(row);
    if runs.len() < EAN8_RUNS {
        return None;
    }
    if let Some(hit) = decode_runs(&runs, allow_ean8) {
        return Some(hit);
    }
    runs.reverse();
    decode_runs(&runs, allow_ean8)
}

/// 中央付近の走査線を見る高速検出（EAN-13/UPC-A のみ）
#[derive(Debug, Default)]
pub struct Ean13Detector {
    released: bool,
}

/// 走査する行の位置（高さに対する比率、中央から外側へ）
const CENTER_ROWS: [f32; 5] = [0.5, 0.4, 0.6, 0.3, 0.7];

impl Ean13Detector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BarcodeDecoder for Ean13Detector {
    fn name(&self) -> &'static str {
        "native-ean13"
    }

    fn decode(&mut self, frame: &GrayImage) -> Result<Vec<BarcodeHit>> {
        if self.released || frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let height = frame.height();
        for ratio in CENTER_ROWS {
            let y = ((height as f32 * ratio) as u32).min(height - 1);
            if let Some(hit) = scan_row(frame, y, false) {
                return Ok(vec![hit]);
            }
        }
        Ok(Vec::new())
    }

    fn release(&mut self) {
        self.released = true;
    }
}
