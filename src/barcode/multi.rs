use super::ean::scan_row;
use super::{BarcodeDecoder, BarcodeHit};
use crate::error::Result;
use image::{imageops, GrayImage};

/// 汎用デコーダ（EAN-13 / UPC-A / EAN-8）
///
/// フレーム全体を等間隔の走査線で調べ、見つからなければ90度回転して再走査する。
#[derive(Debug)]
pub struct MultiFormatDecoder {
    scanlines: u32,
    try_rotated: bool,
}

impl Default for MultiFormatDecoder {
    fn default() -> Self {
        Self {
            scanlines: 24,
            try_rotated: true,
        }
    }
}

impl MultiFormatDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scanlines(mut self, scanlines: u32) -> Self {
        self.scanlines = scanlines.max(1);
        self
    }

    pub fn with_rotation(mut self, try_rotated: bool) -> Self {
        self.try_rotated = try_rotated;
        self
    }

    fn scan(&self, frame: &GrayImage) -> Vec<BarcodeHit> {
        let height = frame.height();
        if frame.width() == 0 || height == 0 {
            return Vec::new();
        }

        let step = (height / self.scanlines).max(1);
        let mut hits: Vec<BarcodeHit> = Vec::new();
        let mut y = step / 2;
        while y < height {
            if let Some(hit) = scan_row(frame, y, true) {
                if !hits.contains(&hit) {
                    hits.push(hit);
                }
            }
            y += step;
        }
        hits
    }
}

impl BarcodeDecoder for MultiFormatDecoder {
    fn name(&self) -> &'static str {
        "multi-format"
    }

    fn decode(&mut self, frame: &GrayImage) -> Result<Vec<BarcodeHit>> {
        let hits = self.scan(frame);
        if !hits.is_empty() || !self.try_rotated {
            return Ok(hits);
        }

        let rotated = imageops::rotate90(frame);
        Ok(self.scan(&rotated))
    }
}
