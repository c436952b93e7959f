//! ISBNの正規化・チェックディジット検証
//!
//! - 大文字化して数字と `X` 以外を除去
//! - 10桁: `X` は末尾のみ許可、重み付き和 mod 11
//! - 13桁: 978/979 プレフィックス必須、重み 1/3 交互の mod 10
//!
//! 不正な入力は空文字列で表す（バーコードの連続検出ノイズを静かに捨てるため）。

use crate::error::{Error, Result};

/// ISBNを正規化する
///
/// 有効なら数字（と末尾 `X`）のみの文字列、無効なら空文字列を返す。
///
/// # Examples
/// ```
/// use book_finder_common::isbn::normalize;
///
/// assert_eq!(normalize("0-306-40615-2"), "0306406152");
/// assert_eq!(normalize("978-0-14-103614-4"), "9780141036144");
/// assert_eq!(normalize("12345"), "");
/// ```
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X')
        .collect();

    let valid = match cleaned.len() {
        10 => is_valid_isbn10(&cleaned),
        13 => is_valid_isbn13(&cleaned),
        _ => false,
    };

    if valid {
        cleaned
    } else {
        String::new()
    }
}

/// 正規化してエラー付きで返す（手入力用）
pub fn validate(raw: &str) -> Result<String> {
    let normalized = normalize(raw);
    if normalized.is_empty() {
        return Err(Error::InvalidIsbn(raw.trim().to_string()));
    }
    Ok(normalized)
}

/// ISBN-10のチェック（入力は正規化済みの10文字を想定）
pub fn is_valid_isbn10(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 10 {
        return false;
    }

    let mut sum = 0u32;
    for (i, &b) in bytes.iter().enumerate() {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'X' if i == 9 => 10,
            _ => return false,
        };
        sum += digit * (10 - i as u32);
    }

    sum % 11 == 0
}

/// ISBN-13のチェック（978/979 プレフィックス必須）
pub fn is_valid_isbn13(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    if !isbn.starts_with("978") && !isbn.starts_with("979") {
        return false;
    }

    let sum: u32 = bytes[..12]
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            let digit = (b - b'0') as u32;
            if i % 2 == 0 { digit } else { digit * 3 }
        })
        .sum();
    let check = (10 - (sum % 10)) % 10;

    check == (bytes[12] - b'0') as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_isbn13() {
        assert_eq!(normalize("9780141036144"), "9780141036144");
        assert_eq!(normalize("978-0-14-103614-4"), "9780141036144");
        assert_eq!(normalize(" 978 0141 036144 "), "9780141036144");
    }

    #[test]
    fn test_normalize_isbn10() {
        assert_eq!(normalize("0-306-40615-2"), "0306406152");
        assert_eq!(normalize("080442957X"), "080442957X");
        // 小文字 x も大文字化して受理
        assert_eq!(normalize("0-8044-2957-x"), "080442957X");
    }

    #[test]
    fn test_normalize_rejects_bad_checksum() {
        assert_eq!(normalize("9780141036145"), "");
        assert_eq!(normalize("0306406153"), "");
    }

    #[test]
    fn test_normalize_rejects_x_outside_check_digit() {
        // X を末尾以外に置くとチェックサムに関係なく拒否
        assert_eq!(normalize("X306406152"), "");
        assert_eq!(normalize("03064061X2"), "");
    }

    #[test]
    fn test_normalize_rejects_x_in_isbn13() {
        assert_eq!(normalize("978014103614X"), "");
    }

    #[test]
    fn test_normalize_rejects_wrong_prefix() {
        // チェックサムは合っているが 978/979 以外（EAN-13 の一般商品コード）
        assert_eq!(normalize("4006381333931"), "");
    }

    #[test]
    fn test_normalize_rejects_wrong_length() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("12345"), "");
        assert_eq!(normalize("036000291452"), ""); // UPC-A 12桁
    }

    #[test]
    fn test_normalize_idempotent() {
        for raw in ["0-306-40615-2", "978-0-14-103614-4", "080442957x", "9791090636071"] {
            let once = normalize(raw);
            assert!(!once.is_empty(), "should be valid: {}", raw);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_isbn10_exactly_one_check_digit_valid() {
        let base = "030640615";
        let valid: Vec<char> = "0123456789X"
            .chars()
            .filter(|c| is_valid_isbn10(&format!("{}{}", base, c)))
            .collect();
        assert_eq!(valid, vec!['2']);
    }

    #[test]
    fn test_isbn13_exactly_one_check_digit_valid() {
        let base = "978014103614";
        let valid: Vec<char> = "0123456789"
            .chars()
            .filter(|c| is_valid_isbn13(&format!("{}{}", base, c)))
            .collect();
        assert_eq!(valid, vec!['4']);
    }

    #[test]
    fn test_validate_error() {
        let err = validate("abc").unwrap_err();
        assert!(matches!(err, Error::InvalidIsbn(_)));
        assert_eq!(validate("0306406152").unwrap(), "0306406152");
    }
}
