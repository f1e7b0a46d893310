//! Staleness detection for the derived set.
//!
//! A source file needs processing when any of its seven outputs is missing,
//! or when the source has been modified since derivation. The modification
//! check compares the source mtime against the thumbnail WebP only — one
//! stat instead of seven. The thumbnail is a reliable proxy because all
//! variants are written by the same derivation pass; the known gap (an
//! operator hand-deleting a non-thumbnail variant of an otherwise fresh
//! file goes undetected until something else dirties it) is an accepted
//! trade for the cheaper scan.

use walkdir::WalkDir;

use crate::config::{PhotoDirs, SizeClass};
use crate::derive;
use crate::imaging::OutputFormat;
use crate::naming;

/// List source image files directly under the photos root, sorted by name.
///
/// Subdirectories (the derived tree lives there) are never descended into.
/// A missing root is an empty gallery, not an error.
pub fn list_photo_files(dirs: &PhotoDirs) -> Vec<String> {
    if !dirs.root().exists() {
        return Vec::new();
    }

    let mut files: Vec<String> = WalkDir::new(dirs.root())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| naming::is_source_image(name))
        .collect();
    files.sort();
    files
}

/// Whether the source has been modified after its thumbnail was derived.
///
/// Strictly newer counts; equal mtimes are fresh. A missing thumbnail
/// returns true (nothing to compare against), a missing source false.
pub fn is_source_newer(dirs: &PhotoDirs, filename: &str) -> bool {
    let source = dirs.source_path(filename);
    let Ok(source_meta) = std::fs::metadata(&source) else {
        return false;
    };
    let base = naming::base_name(filename);
    let thumbnail = dirs.variant_path(base, SizeClass::Thumbnail, OutputFormat::Webp);
    let Ok(thumb_meta) = std::fs::metadata(&thumbnail) else {
        return true;
    };
    match (source_meta.modified(), thumb_meta.modified()) {
        (Ok(src), Ok(thumb)) => src > thumb,
        _ => false,
    }
}

/// Source files whose derived set is incomplete or out of date.
pub fn list_stale(dirs: &PhotoDirs) -> Vec<String> {
    list_photo_files(dirs)
        .into_iter()
        .filter(|file| {
            let base = naming::base_name(file);
            let missing = derive::output_paths(dirs, base)
                .iter()
                .any(|path| !path.exists());
            missing || is_source_newer(dirs, file)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use filetime_shim::set_mtime;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    mod filetime_shim {
        use std::fs::File;
        use std::path::Path;
        use std::time::SystemTime;

        pub fn set_mtime(path: &Path, to: SystemTime) {
            let file = File::options().write(true).open(path).unwrap();
            file.set_modified(to).unwrap();
        }
    }

    fn setup() -> (TempDir, PhotoDirs) {
        let tmp = TempDir::new().unwrap();
        let dirs = PhotoDirs::new(tmp.path().join("photos"));
        dirs.ensure_directories().unwrap();
        (tmp, dirs)
    }

    fn add_source(dirs: &PhotoDirs, name: &str) {
        fs::write(dirs.source_path(name), "source").unwrap();
    }

    fn derive(dirs: &PhotoDirs, name: &str) {
        let backend = MockBackend::with_dimensions(2000, 1500);
        crate::derive::derive_all(dirs, &backend, name).unwrap();
    }

    #[test]
    fn list_photo_files_filters_and_sorts() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "zebra.jpg");
        add_source(&dirs, "alpha.PNG");
        fs::write(dirs.source_path("notes.txt"), "x").unwrap();

        assert_eq!(list_photo_files(&dirs), vec!["alpha.PNG", "zebra.jpg"]);
    }

    #[test]
    fn list_photo_files_ignores_subdirectories() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        // A derived file must never be listed as a source
        fs::write(dirs.webp_dir(SizeClass::Thumbnail).join("dawn.webp"), "t").unwrap();

        assert_eq!(list_photo_files(&dirs), vec!["dawn.jpg"]);
    }

    #[test]
    fn list_photo_files_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let dirs = PhotoDirs::new(tmp.path().join("nope"));
        assert!(list_photo_files(&dirs).is_empty());
    }

    #[test]
    fn unprocessed_file_is_stale() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");

        assert_eq!(list_stale(&dirs), vec!["dawn.jpg"]);
    }

    #[test]
    fn fully_derived_file_is_fresh() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        derive(&dirs, "dawn.jpg");

        assert!(list_stale(&dirs).is_empty());
    }

    #[test]
    fn bumped_source_mtime_is_stale() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        derive(&dirs, "dawn.jpg");

        set_mtime(
            &dirs.source_path("dawn.jpg"),
            SystemTime::now() + Duration::from_secs(60),
        );

        assert_eq!(list_stale(&dirs), vec!["dawn.jpg"]);
        assert!(is_source_newer(&dirs, "dawn.jpg"));
    }

    #[test]
    fn equal_mtimes_are_fresh() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        derive(&dirs, "dawn.jpg");

        let now = SystemTime::now();
        set_mtime(&dirs.source_path("dawn.jpg"), now);
        set_mtime(
            &dirs.variant_path("dawn", SizeClass::Thumbnail, OutputFormat::Webp),
            now,
        );

        assert!(!is_source_newer(&dirs, "dawn.jpg"));
    }

    #[test]
    fn missing_variant_is_stale() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        derive(&dirs, "dawn.jpg");

        fs::remove_file(dirs.variant_path("dawn", SizeClass::Optimized, OutputFormat::Avif))
            .unwrap();

        assert_eq!(list_stale(&dirs), vec!["dawn.jpg"]);
    }

    #[test]
    fn missing_lqip_is_stale() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        derive(&dirs, "dawn.jpg");

        fs::remove_file(dirs.lqip_path("dawn")).unwrap();

        assert_eq!(list_stale(&dirs), vec!["dawn.jpg"]);
    }

    #[test]
    fn stale_check_is_per_file() {
        let (_tmp, dirs) = setup();
        add_source(&dirs, "dawn.jpg");
        add_source(&dirs, "dusk.jpg");
        derive(&dirs, "dawn.jpg");

        assert_eq!(list_stale(&dirs), vec!["dusk.jpg"]);
    }
}
