//! Filesystem watcher: keep the derived set current as photos come and go.
//!
//! Uploads land in the photos root out-of-band (rsync, SFTP, a CMS mount),
//! so the watcher reacts to raw filesystem events: a new file is derived, a
//! changed file is reprocessed, a removed file triggers the orphan reaper.
//!
//! Events for one file arrive in bursts while it is being written, so each
//! path is debounced — processing starts only after the configured quiet
//! window — and then held until its size stops changing between polls. A
//! half-uploaded photo is never decoded.

use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::batch;
use crate::config::PhotoDirs;
use crate::derive;
use crate::imaging::ImageBackend;
use crate::naming;
use crate::reap;

/// Poll interval while waiting for a growing file to settle.
const STABILITY_INTERVAL: Duration = Duration::from_millis(200);

/// Give up waiting for a file to settle after this many polls.
const STABILITY_MAX_CHECKS: u32 = 25;

/// Receive loop wakeup interval when nothing is pending.
const IDLE_POLL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// Collapse an event burst for one path into a single intent.
///
/// Removal always wins over older intents; a file seen being created keeps
/// counting as an add no matter how many writes follow (a fresh upload needs
/// one derivation, not a delete-and-rederive).
fn merge(existing: ChangeKind, incoming: ChangeKind) -> ChangeKind {
    match (existing, incoming) {
        (_, ChangeKind::Removed) => ChangeKind::Removed,
        (ChangeKind::Removed, k) => k,
        (ChangeKind::Added, _) => ChangeKind::Added,
        (ChangeKind::Changed, _) => ChangeKind::Changed,
    }
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Added),
        EventKind::Modify(_) => Some(ChangeKind::Changed),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

/// Whether an event path is a source image directly under the root.
/// Events from the derived subdirectories never qualify.
fn is_watched_source(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(naming::is_source_image)
}

/// Wait until the file's size is unchanged across two polls.
///
/// Returns false when the file disappears or never settles within the
/// allowed number of polls.
fn wait_for_stable_size(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let mut last = meta.len();
    for _ in 0..STABILITY_MAX_CHECKS {
        std::thread::sleep(STABILITY_INTERVAL);
        let Ok(meta) = fs::metadata(path) else {
            return false;
        };
        if meta.len() == last {
            return true;
        }
        last = meta.len();
    }
    false
}

struct Pending {
    kind: ChangeKind,
    due: Instant,
}

/// Watch the photos root until the event stream closes.
///
/// Drains the stale backlog once on startup, then processes events as they
/// settle. Per-file failures are logged and the watch continues.
pub fn watch(
    dirs: &PhotoDirs,
    backend: &impl ImageBackend,
    debounce: Duration,
) -> Result<(), WatchError> {
    dirs.ensure_directories()?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(dirs.root(), RecursiveMode::NonRecursive)?;
    info!(root = %dirs.root().display(), "watching for changes");

    // Catch up on anything that changed while we weren't running
    let report = batch::process_all(dirs, backend, |current, total, file| {
        info!(current, total, file, "processing backlog");
    });
    if !report.processed.is_empty() || !report.errors.is_empty() {
        info!(
            processed = report.processed.len(),
            errors = report.errors.len(),
            "backlog drained"
        );
    }

    let mut pending: HashMap<PathBuf, Pending> = HashMap::new();
    loop {
        let timeout = pending
            .values()
            .map(|p| p.due.saturating_duration_since(Instant::now()))
            .min()
            .unwrap_or(IDLE_POLL);

        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                if let Some(kind) = classify(&event.kind) {
                    for path in event.paths {
                        if !is_watched_source(dirs.root(), &path) {
                            continue;
                        }
                        let due = Instant::now() + debounce;
                        pending
                            .entry(path)
                            .and_modify(|p| {
                                p.kind = merge(p.kind, kind);
                                p.due = due;
                            })
                            .or_insert(Pending { kind, due });
                    }
                }
            }
            Ok(Err(e)) => warn!(error = %e, "watch event error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in due {
            let Some(entry) = pending.remove(&path) else {
                continue;
            };
            handle_change(dirs, backend, &path, entry.kind);
        }
    }
}

fn handle_change(dirs: &PhotoDirs, backend: &impl ImageBackend, path: &Path, kind: ChangeKind) {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };

    match kind {
        ChangeKind::Removed => {
            match reap::reap_orphans(dirs) {
                Ok(deleted) => info!(file = filename, count = deleted.len(), "reaped orphans"),
                Err(e) => warn!(file = filename, error = %e, "orphan cleanup failed"),
            }
            return;
        }
        ChangeKind::Added | ChangeKind::Changed => {}
    }

    // The file may still be mid-upload, or may have vanished since the event
    if !wait_for_stable_size(path) {
        warn!(file = filename, "file never settled, skipping");
        return;
    }

    let result = match kind {
        ChangeKind::Added => derive::derive_all(dirs, backend, filename),
        ChangeKind::Changed => derive::reprocess(dirs, backend, filename),
        ChangeKind::Removed => unreachable!(),
    };
    match result {
        Ok(report) => info!(
            file = filename,
            generated = report.generated.len(),
            "processed"
        ),
        Err(e) => warn!(file = filename, error = %e, "processing failed"),
    }
}
