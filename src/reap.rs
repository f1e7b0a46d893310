//! Orphan cleanup: derived files whose source image is gone.
//!
//! Sources are deleted out-of-band (an operator removes a photo from the
//! directory); the derived tree only learns about it here. The reaper scans
//! every variant directory and the dynamic cache, deleting files whose
//! basename no longer has a matching source. It only ever deletes — sources
//! are never created, modified, or removed by this module.
//!
//! Running concurrently with derivation of a *different* basename is safe;
//! racing a derivation of the *same* basename is undefined and self-healing
//! (the next request or batch re-derives), which is why callers serialize
//! per-basename rather than this module taking locks.

use std::collections::HashSet;
use std::fs;
use std::io;

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::PhotoDirs;
use crate::freshness;
use crate::naming;

/// Delete every derived file whose basename has no surviving source.
///
/// Returns the deleted paths relative to the photos root (e.g.
/// `thumbnails/old.webp`, `cache/dynamic/old-800-85.webp`). Unreadable or
/// undeletable entries are logged and skipped rather than failing the sweep.
pub fn reap_orphans(dirs: &PhotoDirs) -> io::Result<Vec<String>> {
    dirs.ensure_directories()?;

    let live: HashSet<String> = freshness::list_photo_files(dirs)
        .iter()
        .map(|f| naming::base_name(f).to_string())
        .collect();

    let mut deleted = Vec::new();

    for (label, dir) in dirs.variant_dirs() {
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if live.contains(naming::base_name(name)) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => deleted.push(format!("{label}/{name}")),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to delete orphan"),
            }
        }
    }

    // Dynamic cache entries are keyed `{base}-{width}-{quality}.{ext}`; an
    // entry survives if any live base is a `{base}-` prefix of it, so a
    // source named `a` cannot shadow entries of a source named `a-1`.
    for entry in WalkDir::new(dirs.dynamic_cache_dir())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if live.iter().any(|base| {
            name.len() > base.len() && name.starts_with(base) && name.as_bytes()[base.len()] == b'-'
        }) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => deleted.push(format!("cache/dynamic/{name}")),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to delete orphan"),
        }
    }

    if !deleted.is_empty() {
        info!(count = deleted.len(), "orphaned derived files cleaned up");
    }
    Ok(deleted)
}
