//! # Darkroom
//!
//! The backend of a photography portfolio site: a filesystem-backed cache of
//! derived images (responsive sizes in WebP/AVIF/JPEG plus blur-up
//! placeholders) and the HTTP service that serves them with content
//! negotiation. Your photos directory is the only source of truth — no
//! database, no manifest, no upload flow. Drop files in, and the derived
//! tree follows.
//!
//! # Architecture
//!
//! Every derived artifact lives at a path computed purely from
//! (basename, size class, format), so presence-on-disk *is* the cache index:
//!
//! ```text
//! photos/*.jpg ──► freshness (what's missing/outdated?)
//!                    │
//!                    ▼
//!                  batch ──► derive (resize + encode, atomic writes)
//!                    ▲                    │
//!      watch ────────┘                    ▼
//!   (fs events)              thumbnails/ medium/ optimized/ (+avif, lqip)
//!                                         │
//!                                         ▼
//!                  server ◄── /api/image  (negotiate, clamp, serve or
//!                                          live-derive into cache/dynamic)
//! ```
//!
//! The reaper closes the loop: derived files whose source is gone get
//! deleted, triggered by a removal event or an explicit cleanup request.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Directory layout ([`config::PhotoDirs`]), size classes, `darkroom.toml` |
//! | [`naming`] | Basename and source-extension rules, dynamic cache keys |
//! | [`imaging`] | Decode/resize/encode behind a backend trait; pure dimension math |
//! | [`derive`] | Derivation engine: variant grid + LQIP, skip-if-exists, reprocess |
//! | [`freshness`] | Staleness detection (missing outputs, thumbnail mtime probe) |
//! | [`reap`] | Orphan cleanup across the derived tree and dynamic cache |
//! | [`batch`] | Sequential batch over stale files with progress + partial failures |
//! | [`metadata`] | EXIF caption/date extraction, gallery JSON materialization |
//! | [`server`] | axum HTTP surface: `/api/image`, `/api/photos`, `/api/photos/optimize` |
//! | [`watch`] | Debounced filesystem watcher driving derive/reprocess/reap |
//!
//! # Design Decisions
//!
//! ## Existence is freshness
//!
//! A derived file is regenerated only if its path is missing, or if the
//! source's mtime is newer than the thumbnail's (one representative stat
//! per file). No content hashing, no index to corrupt; `reprocess` and the
//! watcher cover deliberate edits. The trade-offs are documented in
//! DESIGN.md.
//!
//! ## No locks
//!
//! Every encode is a pure function of (source bytes, dimensions, format,
//! quality). Two requests racing to derive the same variant both write the
//! same bytes; temp-file-then-rename keeps readers from ever seeing a
//! partial file. That makes last-write-wins correct and locking pure cost.
//!
//! ## Sequential batch
//!
//! The batch coordinator encodes one image at a time. Image encoding is
//! memory-hungry and the batch runs next to a live web server on a small
//! host — bounded peak usage beats wall-clock time here.

pub mod batch;
pub mod config;
pub mod derive;
pub mod freshness;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod reap;
pub mod server;
pub mod watch;
