//! Centralized filename handling for the photo tree.
//!
//! Derived files are keyed by the source image's basename (extension
//! stripped), so every component needs the same answers to two questions:
//! is this file a source image, and what is its basename? This module is the
//! single place those rules live, plus the dynamic-cache key format the
//! image endpoint and the reprocess purge share.

use crate::imaging::OutputFormat;

/// Extensions accepted as source images (case-insensitive).
pub const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Whether a file name looks like a source image.
///
/// Matches on extension only — the caller is responsible for checking the
/// entry is a regular file.
pub fn is_source_image(file_name: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => SOURCE_EXTENSIONS
            .iter()
            .any(|e| ext.eq_ignore_ascii_case(e)),
        _ => false,
    }
}

/// Basename of a file: the name with its final extension stripped.
///
/// `dawn.jpg` → `dawn`, `dawn.2024.jpg` → `dawn.2024`, `dawn` → `dawn`.
/// A leading dot is not treated as an extension separator (`.hidden` →
/// `.hidden`).
pub fn base_name(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Cache key for an on-demand derived image.
///
/// The key doubles as the file name in the dynamic cache directory, and its
/// `{base}-` prefix is what reprocessing and orphan reaping match against.
pub fn dynamic_cache_key(base: &str, width: u32, quality: u32, format: OutputFormat) -> String {
    format!("{base}-{width}-{quality}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extensions_case_insensitive() {
        assert!(is_source_image("dawn.jpg"));
        assert!(is_source_image("dawn.JPEG"));
        assert!(is_source_image("dawn.Png"));
        assert!(is_source_image("dawn.webp"));
    }

    #[test]
    fn non_source_extensions_rejected() {
        assert!(!is_source_image("dawn.gif"));
        assert!(!is_source_image("dawn.txt"));
        assert!(!is_source_image("dawn.avif"));
        assert!(!is_source_image("dawn"));
        assert!(!is_source_image(".jpg"));
    }

    #[test]
    fn base_name_strips_final_extension() {
        assert_eq!(base_name("dawn.jpg"), "dawn");
        assert_eq!(base_name("dawn.2024.jpg"), "dawn.2024");
    }

    #[test]
    fn base_name_without_extension_is_identity() {
        assert_eq!(base_name("dawn"), "dawn");
        assert_eq!(base_name(".hidden"), ".hidden");
    }

    #[test]
    fn dynamic_cache_key_format() {
        assert_eq!(
            dynamic_cache_key("dawn", 800, 85, OutputFormat::Webp),
            "dawn-800-85.webp"
        );
        assert_eq!(
            dynamic_cache_key("dawn", 1200, 60, OutputFormat::Avif),
            "dawn-1200-60.avif"
        );
        assert_eq!(
            dynamic_cache_key("dawn", 400, 85, OutputFormat::Jpeg),
            "dawn-400-85.jpeg"
        );
    }
}
