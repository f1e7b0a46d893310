//! Image metadata and gallery materialization.
//!
//! The gallery endpoint returns one JSON record per source photo: URLs for
//! every derived variant (falling back to the original asset when a variant
//! is missing), pixel dimensions, a caption assembled from EXIF camera
//! settings, the capture date, and the inline LQIP placeholder.
//!
//! Metadata extraction is strictly best-effort. Photos without EXIF (or in
//! formats rexif can't parse — PNG, WebP) get an empty caption and fall back
//! to filesystem timestamps; a photo that can't even be identified still
//! appears in the gallery with default dimensions. Broken metadata must
//! never hide an image.

use rexif::{parse_buffer_quiet, ExifData, ExifTag};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::warn;

use crate::config::{PhotoDirs, SizeClass, LQIP_QUALITY, LQIP_SIZE};
use crate::freshness;
use crate::imaging::{fit_box, ImageBackend, OutputFormat, Quality, RenderParams};
use crate::naming;

/// URL prefix the front end serves the photo tree under.
const PUBLIC_PREFIX: &str = "/assets/photos";

/// Transparent 10x10 placeholder used when even live LQIP generation fails.
const FALLBACK_LQIP: &str =
    "data:image/webp;base64,UklGRlYAAABXRUJQVlA4IEoAAADQAQCdASoKAAoAAUAmJYgCdAEO9ACA/v9P9f96f1AAAAAAfQ==";

/// One gallery entry, serialized in the wire shape the UI consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub id: usize,
    pub src: String,
    pub thumbnail: String,
    pub medium: String,
    pub optimized: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_avif: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medium_avif: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized_avif: Option<String>,
    pub width: u32,
    pub height: u32,
    pub caption: String,
    /// Capture date as unix milliseconds.
    pub date: i64,
    pub lqip: String,
}

/// Caption and capture date pulled from EXIF.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifSummary {
    pub caption: String,
    pub capture_date_ms: Option<i64>,
}

/// Read EXIF from a source file. Never fails — anything unreadable yields
/// the default summary.
pub fn read_exif(path: &Path) -> ExifSummary {
    let Ok(bytes) = fs::read(path) else {
        return ExifSummary::default();
    };
    let (result, _) = parse_buffer_quiet(&bytes);
    let exif = match result {
        Ok(exif) => exif,
        Err(_) => return ExifSummary::default(),
    };

    let camera = exif_value(&exif, ExifTag::Model);
    let mut parts = Vec::new();
    if let Some(focal) = exif_value(&exif, ExifTag::FocalLength) {
        parts.push(focal);
    }
    if let Some(aperture) = exif_value(&exif, ExifTag::FNumber) {
        parts.push(aperture);
    }
    if let Some(shutter) = exif_value(&exif, ExifTag::ExposureTime) {
        parts.push(shutter);
    }
    if let Some(iso) = exif_value(&exif, ExifTag::ISOSpeedRatings) {
        parts.push(format!("ISO {iso}"));
    }

    let capture_date_ms = exif_value(&exif, ExifTag::DateTimeOriginal)
        .or_else(|| exif_value(&exif, ExifTag::DateTime))
        .and_then(|s| parse_exif_datetime(&s));

    ExifSummary {
        caption: assemble_caption(camera, &parts),
        capture_date_ms,
    }
}

/// `"Sony A7III | 35 mm f/1.8 1/200 s ISO 100"` — camera first, settings
/// after the separator, either side optional.
fn assemble_caption(camera: Option<String>, parts: &[String]) -> String {
    let settings = parts.join(" ");
    match (camera, settings.is_empty()) {
        (Some(camera), true) => camera,
        (Some(camera), false) => format!("{camera} | {settings}"),
        (None, true) => String::new(),
        (None, false) => settings,
    }
}

/// First readable value for a tag, filtered for emptiness.
fn exif_value(exif: &ExifData, tag: ExifTag) -> Option<String> {
    exif.entries.iter().find(|entry| entry.tag == tag).and_then(|entry| {
        let value = entry.value_more_readable.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` timestamp to unix milliseconds.
fn parse_exif_datetime(value: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(value.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// File creation time (falling back to mtime) as unix milliseconds.
fn file_date_ms(path: &Path) -> i64 {
    let Ok(meta) = fs::metadata(path) else {
        return 0;
    };
    meta.created()
        .or_else(|_| meta.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn public_url(subdir: Option<&str>, file: &str) -> String {
    match subdir {
        Some(sub) => format!("{PUBLIC_PREFIX}/{sub}/{file}"),
        None => format!("{PUBLIC_PREFIX}/{file}"),
    }
}

/// LQIP for a basename: the derived file if present, else a live render,
/// else the hardcoded placeholder.
fn lqip_for(dirs: &PhotoDirs, backend: &impl ImageBackend, filename: &str, dims: (u32, u32)) -> String {
    let base = naming::base_name(filename);
    if let Ok(content) = fs::read_to_string(dirs.lqip_path(base)) {
        return content;
    }
    let (width, height) = fit_box(dims, LQIP_SIZE, LQIP_SIZE);
    match backend.render(&RenderParams {
        source: dirs.source_path(filename),
        width,
        height,
        format: OutputFormat::Webp,
        quality: Quality::new(LQIP_QUALITY),
    }) {
        Ok(bytes) => format!(
            "data:image/webp;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes)
        ),
        Err(e) => {
            warn!(file = filename, error = %e, "live LQIP generation failed");
            FALLBACK_LQIP.to_string()
        }
    }
}

/// Materialize the gallery: one record per source photo, newest first.
///
/// A missing photos root yields an empty gallery.
pub fn gallery_images(dirs: &PhotoDirs, backend: &impl ImageBackend) -> Vec<GalleryImage> {
    let files = freshness::list_photo_files(dirs);
    let mut images: Vec<GalleryImage> = files
        .iter()
        .enumerate()
        .map(|(id, file)| {
            let base = naming::base_name(file);
            let source = dirs.source_path(file);

            let dims = match backend.identify(&source) {
                Ok(d) => (d.width, d.height),
                Err(e) => {
                    warn!(file = file.as_str(), error = %e, "could not identify image");
                    (800, 600)
                }
            };

            let exif = read_exif(&source);
            let date = exif.capture_date_ms.unwrap_or_else(|| file_date_ms(&source));

            let src = public_url(None, file);
            let variant_url = |class: SizeClass, format: OutputFormat, sub: &str| {
                let path = dirs.variant_path(base, class, format);
                path.exists()
                    .then(|| public_url(Some(sub), &format!("{base}.{}", format.extension())))
            };

            GalleryImage {
                id,
                thumbnail: variant_url(SizeClass::Thumbnail, OutputFormat::Webp, "thumbnails")
                    .unwrap_or_else(|| src.clone()),
                medium: variant_url(SizeClass::Medium, OutputFormat::Webp, "medium")
                    .unwrap_or_else(|| src.clone()),
                optimized: variant_url(SizeClass::Optimized, OutputFormat::Webp, "optimized")
                    .unwrap_or_else(|| src.clone()),
                thumbnail_avif: variant_url(
                    SizeClass::Thumbnail,
                    OutputFormat::Avif,
                    "thumbnails-avif",
                ),
                medium_avif: variant_url(SizeClass::Medium, OutputFormat::Avif, "medium-avif"),
                optimized_avif: variant_url(
                    SizeClass::Optimized,
                    OutputFormat::Avif,
                    "optimized-avif",
                ),
                width: dims.0,
                height: dims.1,
                caption: exif.caption,
                date,
                lqip: lqip_for(dirs, backend, file, dims),
                src,
            }
        })
        .collect();

    images.sort_by(|a, b| b.date.cmp(&a.date));
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PhotoDirs) {
        let tmp = TempDir::new().unwrap();
        let dirs = PhotoDirs::new(tmp.path().join("photos"));
        dirs.ensure_directories().unwrap();
        (tmp, dirs)
    }

    #[test]
    fn parse_exif_datetime_standard_format() {
        let ms = parse_exif_datetime("2023:05:12 10:11:12").unwrap();
        // 2023-05-12T10:11:12Z
        assert_eq!(ms, 1_683_886_272_000);
    }

    #[test]
    fn parse_exif_datetime_rejects_garbage() {
        assert_eq!(parse_exif_datetime("not a date"), None);
        assert_eq!(parse_exif_datetime(""), None);
    }

    #[test]
    fn caption_with_camera_and_settings() {
        let caption = assemble_caption(
            Some("Sony A7III".into()),
            &["35 mm".into(), "f/1.8".into(), "1/200 s".into(), "ISO 100".into()],
        );
        assert_eq!(caption, "Sony A7III | 35 mm f/1.8 1/200 s ISO 100");
    }

    #[test]
    fn caption_settings_only() {
        let caption = assemble_caption(None, &["f/2.8".into()]);
        assert_eq!(caption, "f/2.8");
    }

    #[test]
    fn caption_camera_only() {
        assert_eq!(assemble_caption(Some("X100V".into()), &[]), "X100V");
    }

    #[test]
    fn caption_empty_when_no_exif() {
        assert_eq!(assemble_caption(None, &[]), "");
    }

    #[test]
    fn read_exif_on_non_jpeg_is_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("plain.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        assert_eq!(read_exif(&path), ExifSummary::default());
    }

    #[test]
    fn gallery_empty_when_root_missing() {
        let tmp = TempDir::new().unwrap();
        let dirs = PhotoDirs::new(tmp.path().join("nope"));
        let backend = MockBackend::with_dimensions(100, 100);
        assert!(gallery_images(&dirs, &backend).is_empty());
    }

    #[test]
    fn gallery_falls_back_to_original_urls_without_variants() {
        let (_tmp, dirs) = setup();
        fs::write(dirs.source_path("dawn.jpg"), "x").unwrap();

        let backend = MockBackend::with_dimensions(1200, 900);
        let images = gallery_images(&dirs, &backend);

        assert_eq!(images.len(), 1);
        let img = &images[0];
        assert_eq!(img.src, "/assets/photos/dawn.jpg");
        assert_eq!(img.thumbnail, "/assets/photos/dawn.jpg");
        assert_eq!(img.optimized, "/assets/photos/dawn.jpg");
        assert_eq!(img.thumbnail_avif, None);
        assert_eq!(img.width, 1200);
        assert_eq!(img.height, 900);
        // Live LQIP from the mock render is still a data URI
        assert!(img.lqip.starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn gallery_uses_variant_urls_when_derived() {
        let (_tmp, dirs) = setup();
        fs::write(dirs.source_path("dawn.jpg"), "x").unwrap();
        let backend = MockBackend::with_dimensions(1200, 900);
        crate::derive::derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let images = gallery_images(&dirs, &backend);
        let img = &images[0];
        assert_eq!(img.thumbnail, "/assets/photos/thumbnails/dawn.webp");
        assert_eq!(img.medium, "/assets/photos/medium/dawn.webp");
        assert_eq!(img.optimized, "/assets/photos/optimized/dawn.webp");
        assert_eq!(
            img.thumbnail_avif.as_deref(),
            Some("/assets/photos/thumbnails-avif/dawn.avif")
        );
        // Derived LQIP is read from disk
        assert!(img.lqip.starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn gallery_identify_failure_defaults_dimensions() {
        let (_tmp, dirs) = setup();
        fs::write(dirs.source_path("dawn.jpg"), "x").unwrap();

        // No dimensions configured: identify fails, render still works
        let backend = MockBackend::new();
        let images = gallery_images(&dirs, &backend);

        assert_eq!(images[0].width, 800);
        assert_eq!(images[0].height, 600);
    }

    #[test]
    fn gallery_serializes_camel_case() {
        let (_tmp, dirs) = setup();
        fs::write(dirs.source_path("dawn.jpg"), "x").unwrap();
        let backend = MockBackend::with_dimensions(1200, 900);
        crate::derive::derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let json = serde_json::to_value(gallery_images(&dirs, &backend)).unwrap();
        let first = &json[0];
        assert!(first.get("thumbnailAvif").is_some());
        assert!(first.get("lqip").is_some());
        assert!(first.get("thumbnail_avif").is_none());
    }

    #[test]
    fn gallery_sorts_newest_first() {
        let mut images = vec![
            GalleryImage {
                id: 0,
                src: "a".into(),
                thumbnail: String::new(),
                medium: String::new(),
                optimized: String::new(),
                thumbnail_avif: None,
                medium_avif: None,
                optimized_avif: None,
                width: 1,
                height: 1,
                caption: String::new(),
                date: 100,
                lqip: String::new(),
            },
            GalleryImage {
                id: 1,
                src: "b".into(),
                thumbnail: String::new(),
                medium: String::new(),
                optimized: String::new(),
                thumbnail_avif: None,
                medium_avif: None,
                optimized_avif: None,
                width: 1,
                height: 1,
                caption: String::new(),
                date: 200,
                lqip: String::new(),
            },
        ];
        images.sort_by(|a, b| b.date.cmp(&a.date));
        assert_eq!(images[0].src, "b");
    }
}
