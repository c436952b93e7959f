//! 画像フォルダの走査と読み込み
//!
//! 撮影済みの表紙・バーコード画像を名前順に列挙し、
//! EXIFの向きを反映してデコードする。

mod exif;

pub use exif::read_orientation;

use crate::error::{BookFinderError, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub file_name: String,
    /// EXIF Orientation（1〜8、なければ None）
    pub orientation: Option<u32>,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "JPG", "JPEG", "PNG"];

pub fn scan_folder(folder: &Path) -> Result<Vec<ImageInfo>> {
    if !folder.is_dir() {
        return Err(BookFinderError::FolderNotFound(folder.display().to_string()));
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() || !is_image_path(path) {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        images.push(ImageInfo {
            path: path.to_path_buf(),
            file_name,
            orientation: read_orientation(path),
        });
    }

    // ファイル名でソート
    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    Ok(images)
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|&e| e == ext.to_string_lossy()))
        .unwrap_or(false)
}

/// 画像を読み込み、EXIFの向きを反映する
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(BookFinderError::FileNotFound(path.display().to_string()));
    }

    let image = image::open(path)
        .map_err(|e| BookFinderError::ImageLoad(format!("{}: {}", path.display(), e)))?;

    Ok(match read_orientation(path) {
        Some(orientation) => apply_orientation(image, orientation),
        None => image,
    })
}

/// EXIF Orientation 値に従って回転・反転する
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("cover.jpg")));
        assert!(is_image_path(Path::new("COVER.JPG")));
        assert!(is_image_path(Path::new("scan.jpeg")));
        assert!(is_image_path(Path::new("frame.png")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("frame.gif")));
        assert!(!is_image_path(Path::new("no_extension")));
    }

    #[test]
    fn test_scan_folder_not_found() {
        let result = scan_folder(Path::new("/nonexistent/folder"));
        assert!(matches!(result, Err(BookFinderError::FolderNotFound(_))));
    }

    #[test]
    fn test_scan_folder_sorted_and_filtered() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("c.jpg")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.path().join("a.PNG")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.path().join("b.jpeg")).unwrap().write_all(b"dummy").unwrap();
        File::create(dir.path().join("readme.txt")).unwrap().write_all(b"text").unwrap();

        let result = scan_folder(dir.path()).unwrap();
        let names: Vec<&str> = result.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.PNG", "b.jpeg", "c.jpg"]);
        assert!(result.iter().all(|i| i.orientation.is_none()));
    }

    #[test]
    fn test_load_image_missing() {
        let result = load_image(Path::new("/nonexistent/cover.jpg"));
        assert!(matches!(result, Err(BookFinderError::FileNotFound(_))));
    }

    #[test]
    fn test_load_image_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.png");
        GrayImage::from_pixel(4, 2, Luma([200])).save(&path).unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
    }

    #[test]
    fn test_apply_orientation_rotates() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 2));
        let rotated = apply_orientation(image.clone(), 6);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        let unchanged = apply_orientation(image, 1);
        assert_eq!((unchanged.width(), unchanged.height()), (4, 2));
    }
}
