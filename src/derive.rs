//! Derivation engine: source photo → derived variant set.
//!
//! For every source image the engine maintains seven outputs: WebP and AVIF
//! renditions at each of the three [size classes](crate::config::SizeClass),
//! plus a low-quality placeholder (LQIP) stored as a base64 data URI. Output
//! paths are deterministic, so presence is tested by file existence — there
//! is no index to keep in sync.
//!
//! ## Idempotence
//!
//! [`derive_all`] skips any output whose file already exists. A second call
//! on an unchanged source touches nothing (not even mtimes). The skip is an
//! existence check, not a content hash — cheap, and good enough because the
//! only mutation path for derived files is this engine. [`reprocess`] is the
//! one way around the skip: it deletes the variant set (and any dynamic
//! cache entries for the basename) before deriving again.
//!
//! ## Atomicity
//!
//! Encoded bytes are written to a temp file in the destination directory and
//! renamed into place, so concurrent readers never observe a partial file.
//! Two concurrent derivations of the same never-derived variant may both
//! encode and both rename; the encodes are deterministic, so last-write-wins
//! converges to identical bytes.

use base64::Engine as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::config::{PhotoDirs, SizeClass, LQIP_QUALITY, LQIP_SIZE};
use crate::imaging::{
    fit_box, fit_long_edge, BackendError, ImageBackend, OutputFormat, Quality, RenderParams,
};
use crate::naming;

#[derive(Error, Debug)]
pub enum DeriveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image processing failed for {filename}: {source}")]
    Imaging {
        filename: String,
        #[source]
        source: BackendError,
    },
}

/// What a derivation call actually did.
#[derive(Debug, Default)]
pub struct DeriveReport {
    /// Outputs written by this call.
    pub generated: Vec<PathBuf>,
    /// Outputs that already existed and were left untouched.
    pub skipped: Vec<PathBuf>,
}

/// The seven output paths for a basename, in a fixed order
/// (WebP per class, AVIF per class, LQIP last).
pub fn output_paths(dirs: &PhotoDirs, base: &str) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(7);
    for class in SizeClass::ALL {
        paths.push(dirs.variant_path(base, class, OutputFormat::Webp));
    }
    for class in SizeClass::ALL {
        paths.push(dirs.variant_path(base, class, OutputFormat::Avif));
    }
    paths.push(dirs.lqip_path(base));
    paths
}

/// Derive every missing output for a source image.
///
/// Existing outputs are skipped; if the whole set is present the source is
/// not even decoded. Fails with the filename and underlying cause when the
/// source can't be decoded — callers in batch context collect the error and
/// move on.
pub fn derive_all(
    dirs: &PhotoDirs,
    backend: &impl ImageBackend,
    filename: &str,
) -> Result<DeriveReport, DeriveError> {
    dirs.ensure_directories()?;

    let base = naming::base_name(filename);
    let source = dirs.source_path(filename);
    let mut report = DeriveReport::default();

    // Partition up front so a fully-derived file needs no decode at all.
    let mut missing: Vec<(PathBuf, SizeClass, OutputFormat)> = Vec::new();
    for class in SizeClass::ALL {
        for format in [OutputFormat::Webp, OutputFormat::Avif] {
            let path = dirs.variant_path(base, class, format);
            if path.exists() {
                report.skipped.push(path);
            } else {
                missing.push((path, class, format));
            }
        }
    }
    let lqip_path = dirs.lqip_path(base);
    let lqip_missing = !lqip_path.exists();
    if !lqip_missing {
        report.skipped.push(lqip_path.clone());
    }

    if missing.is_empty() && !lqip_missing {
        return Ok(report);
    }

    let dims = backend.identify(&source).map_err(|e| DeriveError::Imaging {
        filename: filename.to_string(),
        source: e,
    })?;
    let original = (dims.width, dims.height);

    for (path, class, format) in missing {
        let (width, height) = fit_long_edge(original, class.long_edge());
        let quality = match format {
            OutputFormat::Avif => SizeClass::AVIF_QUALITY,
            _ => class.webp_quality(),
        };
        let bytes = backend
            .render(&RenderParams {
                source: source.clone(),
                width,
                height,
                format,
                quality: Quality::new(quality),
            })
            .map_err(|e| DeriveError::Imaging {
                filename: filename.to_string(),
                source: e,
            })?;
        write_atomic(&path, &bytes)?;
        report.generated.push(path);
    }

    if lqip_missing {
        let (width, height) = fit_box(original, LQIP_SIZE, LQIP_SIZE);
        let bytes = backend
            .render(&RenderParams {
                source: source.clone(),
                width,
                height,
                format: OutputFormat::Webp,
                quality: Quality::new(LQIP_QUALITY),
            })
            .map_err(|e| DeriveError::Imaging {
                filename: filename.to_string(),
                source: e,
            })?;
        let data_uri = format!(
            "data:image/webp;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );
        write_atomic(&lqip_path, data_uri.as_bytes())?;
        report.generated.push(lqip_path);
    }

    Ok(report)
}

/// Force regeneration: delete the variant set and matching dynamic-cache
/// entries for the basename, then derive from scratch.
///
/// This is the only path that bypasses the existence skip.
pub fn reprocess(
    dirs: &PhotoDirs,
    backend: &impl ImageBackend,
    filename: &str,
) -> Result<DeriveReport, DeriveError> {
    let base = naming::base_name(filename);

    for path in output_paths(dirs, base) {
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    purge_dynamic_entries(dirs, base)?;

    derive_all(dirs, backend, filename)
}

/// Delete dynamic-cache entries whose file name starts with the basename.
fn purge_dynamic_entries(dirs: &PhotoDirs, base: &str) -> io::Result<()> {
    let cache_dir = dirs.dynamic_cache_dir();
    if !cache_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(base) {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write bytes to a sibling temp file and rename into place. The rename
/// makes the output visible all-or-nothing; a failed write never leaves a
/// partial file at the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PhotoDirs) {
        let tmp = TempDir::new().unwrap();
        let dirs = PhotoDirs::new(tmp.path().join("photos"));
        dirs.ensure_directories().unwrap();
        fs::write(dirs.source_path("dawn.jpg"), "source bytes").unwrap();
        (tmp, dirs)
    }

    #[test]
    fn derive_all_writes_full_variant_set() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(4000, 3000);

        let report = derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        assert_eq!(report.generated.len(), 7);
        assert!(report.skipped.is_empty());
        for path in output_paths(&dirs, "dawn") {
            assert!(path.exists(), "missing {}", path.display());
        }

        // 1 identify + 6 variant renders + 1 LQIP render
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 8);
        assert!(matches!(&ops[0], RecordedOp::Identify(_)));
    }

    #[test]
    fn derive_all_lqip_is_base64_data_uri() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(2000, 1000);

        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let lqip = fs::read_to_string(dirs.lqip_path("dawn")).unwrap();
        assert!(lqip.starts_with("data:image/webp;base64,"));
        // LQIP render fits inside 20x20
        let ops = backend.get_operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            RecordedOp::Render {
                width: 20,
                height: 10,
                quality: 20,
                ..
            }
        )));
    }

    #[test]
    fn derive_all_second_call_touches_nothing() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(4000, 3000);
        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let mtimes_before: Vec<_> = output_paths(&dirs, "dawn")
            .iter()
            .map(|p| fs::metadata(p).unwrap().modified().unwrap())
            .collect();

        let second = MockBackend::with_dimensions(4000, 3000);
        let report = derive_all(&dirs, &second, "dawn.jpg").unwrap();

        assert!(report.generated.is_empty());
        assert_eq!(report.skipped.len(), 7);
        // Fully derived: not even an identify
        assert!(second.get_operations().is_empty());

        let mtimes_after: Vec<_> = output_paths(&dirs, "dawn")
            .iter()
            .map(|p| fs::metadata(p).unwrap().modified().unwrap())
            .collect();
        assert_eq!(mtimes_before, mtimes_after);
    }

    #[test]
    fn derive_all_fills_only_missing_outputs() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(4000, 3000);
        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let victim = dirs.variant_path("dawn", SizeClass::Medium, OutputFormat::Avif);
        fs::remove_file(&victim).unwrap();

        let second = MockBackend::with_dimensions(4000, 3000);
        let report = derive_all(&dirs, &second, "dawn.jpg").unwrap();

        assert_eq!(report.generated, vec![victim]);
        assert_eq!(report.skipped.len(), 6);
    }

    #[test]
    fn derive_all_never_upscales() {
        let (_tmp, dirs) = setup();
        // Source smaller than medium and optimized targets
        let backend = MockBackend::with_dimensions(600, 400);

        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        for op in backend.get_operations() {
            if let RecordedOp::Render { width, height, .. } = op {
                assert!(width <= 600, "width {width} exceeds source");
                assert!(height <= 400, "height {height} exceeds source");
            }
        }
    }

    #[test]
    fn derive_all_variant_quality_table() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(4000, 3000);

        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let renders: Vec<_> = backend
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Render {
                    width,
                    format,
                    quality,
                    ..
                } => Some((width, format, quality)),
                _ => None,
            })
            .collect();

        assert!(renders.contains(&(400, OutputFormat::Webp, 80)));
        assert!(renders.contains(&(800, OutputFormat::Webp, 85)));
        assert!(renders.contains(&(1920, OutputFormat::Webp, 85)));
        for width in [400, 800, 1920] {
            assert!(renders.contains(&(width, OutputFormat::Avif, 60)));
        }
    }

    #[test]
    fn derive_all_corrupt_source_reports_filename() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::failing();

        let err = derive_all(&dirs, &backend, "dawn.jpg").unwrap_err();
        match err {
            DeriveError::Imaging { filename, .. } => assert_eq!(filename, "dawn.jpg"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reprocess_regenerates_everything() {
        let (_tmp, dirs) = setup();
        let backend = MockBackend::with_dimensions(4000, 3000);
        derive_all(&dirs, &backend, "dawn.jpg").unwrap();

        let second = MockBackend::with_dimensions(4000, 3000);
        let report = reprocess(&dirs, &second, "dawn.jpg").unwrap();

        assert_eq!(report.generated.len(), 7);
        assert!(report.skipped.is_empty());
        // Deletion forced a full re-render despite existing outputs
        assert_eq!(second.get_operations().len(), 8);
    }

    #[test]
    fn reprocess_purges_matching_dynamic_entries() {
        let (_tmp, dirs) = setup();
        fs::write(dirs.dynamic_cache_path("dawn-800-85.webp"), "cached").unwrap();
        fs::write(dirs.dynamic_cache_path("dawn-1200-60.avif"), "cached").unwrap();
        fs::write(dirs.dynamic_cache_path("dusk-800-85.webp"), "cached").unwrap();

        let backend = MockBackend::with_dimensions(4000, 3000);
        reprocess(&dirs, &backend, "dawn.jpg").unwrap();

        assert!(!dirs.dynamic_cache_path("dawn-800-85.webp").exists());
        assert!(!dirs.dynamic_cache_path("dawn-1200-60.avif").exists());
        assert!(dirs.dynamic_cache_path("dusk-800-85.webp").exists());
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("out.webp");
        write_atomic(&target, b"payload").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"payload");
        let stray: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(stray.is_empty());
    }

    #[test]
    fn write_atomic_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("out.webp");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }
}
