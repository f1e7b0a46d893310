//! Configuration and on-disk layout.
//!
//! Two concerns live here:
//!
//! - [`PhotoDirs`]: the immutable directory layout of the photo tree. It is
//!   constructed once at startup from the photos root and passed explicitly to
//!   every component — there is no global path state. All derived paths are a
//!   pure function of (root, basename, size class, format).
//! - [`AppConfig`]: the optional `darkroom.toml` file (server bind address,
//!   watcher debounce). All fields have defaults; unknown keys are rejected
//!   to catch typos early.
//!
//! ## Directory layout
//!
//! ```text
//! photos/                         # source images (*.jpg *.jpeg *.png *.webp)
//! ├── thumbnails/{base}.webp      # 400px  q80
//! ├── medium/{base}.webp          # 800px  q85
//! ├── optimized/{base}.webp       # 1920px q85
//! ├── thumbnails-avif/{base}.avif # 400px  q60
//! ├── medium-avif/{base}.avif     # 800px  q60
//! ├── optimized-avif/{base}.avif  # 1920px q60
//! ├── lqip/{base}.txt             # ≤20x20 webp q20, base64 data URI
//! └── cache/dynamic/              # on-demand {base}-{width}-{quality}.{ext}
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::imaging::OutputFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// The three pre-derived size classes. Each constrains the long edge of the
/// source image; sources smaller than the target are never upscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Thumbnail,
    Medium,
    Optimized,
}

impl SizeClass {
    pub const ALL: [SizeClass; 3] = [SizeClass::Thumbnail, SizeClass::Medium, SizeClass::Optimized];

    /// Maximum long-edge size in pixels.
    pub fn long_edge(self) -> u32 {
        match self {
            SizeClass::Thumbnail => 400,
            SizeClass::Medium => 800,
            SizeClass::Optimized => 1920,
        }
    }

    /// WebP encoding quality for this class.
    pub fn webp_quality(self) -> u32 {
        match self {
            SizeClass::Thumbnail => 80,
            SizeClass::Medium => 85,
            SizeClass::Optimized => 85,
        }
    }

    /// AVIF quality is uniform across classes — the format holds up better
    /// at low quality, and a single value keeps encode times predictable.
    pub const AVIF_QUALITY: u32 = 60;

    /// Map an exact pixel width back to its size class, if one exists.
    /// Used by the image endpoint to find pre-derived files.
    pub fn from_width(width: u32) -> Option<SizeClass> {
        SizeClass::ALL.iter().copied().find(|c| c.long_edge() == width)
    }
}

/// Maximum LQIP edge in pixels.
pub const LQIP_SIZE: u32 = 20;

/// LQIP WebP quality.
pub const LQIP_QUALITY: u32 = 20;

/// Immutable directory layout under a photos root.
///
/// Cheap to clone; every component receives one of these instead of
/// computing paths from shared constants.
#[derive(Debug, Clone)]
pub struct PhotoDirs {
    root: PathBuf,
    thumbnails: PathBuf,
    medium: PathBuf,
    optimized: PathBuf,
    thumbnails_avif: PathBuf,
    medium_avif: PathBuf,
    optimized_avif: PathBuf,
    lqip: PathBuf,
    dynamic_cache: PathBuf,
}

impl PhotoDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            thumbnails: root.join("thumbnails"),
            medium: root.join("medium"),
            optimized: root.join("optimized"),
            thumbnails_avif: root.join("thumbnails-avif"),
            medium_avif: root.join("medium-avif"),
            optimized_avif: root.join("optimized-avif"),
            lqip: root.join("lqip"),
            dynamic_cache: root.join("cache").join("dynamic"),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding WebP variants of the given class.
    pub fn webp_dir(&self, class: SizeClass) -> &Path {
        match class {
            SizeClass::Thumbnail => &self.thumbnails,
            SizeClass::Medium => &self.medium,
            SizeClass::Optimized => &self.optimized,
        }
    }

    /// Directory holding AVIF variants of the given class.
    pub fn avif_dir(&self, class: SizeClass) -> &Path {
        match class {
            SizeClass::Thumbnail => &self.thumbnails_avif,
            SizeClass::Medium => &self.medium_avif,
            SizeClass::Optimized => &self.optimized_avif,
        }
    }

    pub fn lqip_dir(&self) -> &Path {
        &self.lqip
    }

    pub fn dynamic_cache_dir(&self) -> &Path {
        &self.dynamic_cache
    }

    /// Path of a pre-derived variant in the fixed grid. Only WebP and AVIF
    /// are pre-derived; JPEG exists solely as dynamic cache entries.
    pub fn variant_path(&self, base: &str, class: SizeClass, format: OutputFormat) -> PathBuf {
        match format {
            OutputFormat::Avif => self.avif_dir(class).join(format!("{base}.avif")),
            _ => self.webp_dir(class).join(format!("{base}.webp")),
        }
    }

    pub fn lqip_path(&self, base: &str) -> PathBuf {
        self.lqip.join(format!("{base}.txt"))
    }

    pub fn source_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    pub fn dynamic_cache_path(&self, key: &str) -> PathBuf {
        self.dynamic_cache.join(key)
    }

    /// Every directory holding per-basename derived files, with the relative
    /// label used in cleanup reports. The dynamic cache is not listed here —
    /// its entries are keyed, not named by bare basename.
    pub fn variant_dirs(&self) -> [(&'static str, &Path); 7] {
        [
            ("thumbnails", &self.thumbnails),
            ("medium", &self.medium),
            ("optimized", &self.optimized),
            ("thumbnails-avif", &self.thumbnails_avif),
            ("medium-avif", &self.medium_avif),
            ("optimized-avif", &self.optimized_avif),
            ("lqip", &self.lqip),
        ]
    }

    /// Create the root and every derived directory. Idempotent; safe to call
    /// from any entry point.
    pub fn ensure_directories(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        for (_, dir) in self.variant_dirs() {
            fs::create_dir_all(dir)?;
        }
        fs::create_dir_all(&self.dynamic_cache)?;
        Ok(())
    }
}

/// Application configuration loaded from `darkroom.toml`.
///
/// All fields have defaults; config files are sparse and only override what
/// they name. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Photos root directory (overridable with `--root`).
    pub photos_root: String,
    pub server: ServerConfig,
    pub watch: WatchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            photos_root: "photos".to_string(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address for the HTTP server.
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Milliseconds a file must sit quiet before the watcher processes it.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.photos_root.is_empty() {
            return Err(ConfigError::Validation("photos_root must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
