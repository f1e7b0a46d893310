//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the modules that decide which images to create (the
//! derivation engine, the image endpoint) and the [`backend`](super::backend)
//! that does the actual pixel work. The separation allows swapping backends
//! (e.g. a recording mock in tests) without changing caller logic.

use std::path::PathBuf;

/// Output encodings the backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Webp,
    Avif,
    Jpeg,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    /// MIME type for HTTP responses.
    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Avif => "image/avif",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// Default lossy encoding quality when a request doesn't specify one.
    pub fn default_quality(self) -> u32 {
        match self {
            OutputFormat::Webp => 85,
            OutputFormat::Avif => 60,
            OutputFormat::Jpeg => 85,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Full specification of a render: decode the source, resize to exactly
/// (width, height), encode. Callers compute the target dimensions (see
/// [`calculations`](super::calculations)) so the backend never has to decide
/// about aspect ratios or upscaling.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub quality: Quality,
}
