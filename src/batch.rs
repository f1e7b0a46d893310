//! Batch processing of stale source files.
//!
//! The coordinator walks the stale list sequentially — one encode at a time
//! keeps peak memory and CPU flat on the small hosts a personal site runs
//! on, and the work is disk-bound enough that fan-out buys little. A failure
//! on one file is recorded and the loop moves on; one corrupt upload never
//! blocks the rest of the backlog.

use crate::config::PhotoDirs;
use crate::derive::{self, DeriveError};
use crate::freshness;
use crate::imaging::ImageBackend;

/// Outcome of a batch run: which files derived cleanly, which failed and why.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub errors: Vec<BatchError>,
}

#[derive(Debug)]
pub struct BatchError {
    pub file: String,
    pub error: DeriveError,
}

/// Derive every stale file, reporting progress and collecting failures.
///
/// The progress callback receives `(current, total, filename)` with a
/// 1-based index, before each attempt. It is observability only — it cannot
/// influence the run.
pub fn process_all(
    dirs: &PhotoDirs,
    backend: &impl ImageBackend,
    mut progress: impl FnMut(usize, usize, &str),
) -> BatchReport {
    let files = freshness::list_stale(dirs);
    let total = files.len();
    let mut report = BatchReport::default();

    for (index, file) in files.iter().enumerate() {
        progress(index + 1, total, file);
        match derive::derive_all(dirs, backend, file) {
            Ok(_) => report.processed.push(file.clone()),
            Err(error) => report.errors.push(BatchError {
                file: file.clone(),
                error,
            }),
        }
    }

    report
}
