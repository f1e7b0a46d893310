//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (dimensions without a full decode) and render (decode,
//! resize, encode to bytes). Callers own all path and dimension decisions;
//! the backend only moves pixels. Rendering returns encoded bytes rather than
//! writing files so callers can choose between atomic on-disk persistence and
//! direct HTTP responses.
//!
//! The production implementation is
//! [`PixelBackend`](super::pixel_backend::PixelBackend), statically linked.

use super::params::RenderParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Sync` so a single backend instance can be shared across request handlers
/// and the batch loop.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions without decoding the full image.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode, resize to exactly the requested dimensions, and encode.
    fn render(&self, params: &RenderParams) -> Result<Vec<u8>, BackendError>;
}
