//! Image processing: decode, resize, encode.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Resize** | Lanczos3 via the `image` crate |
//! | **Encode → WebP** | `webp` (libwebp, lossy) |
//! | **Encode → AVIF** | rav1e via `image::codecs::avif` |
//! | **Encode → JPEG** | `image::codecs::jpeg` |
//!
//! The module is split into:
//! - **Calculations**: pure functions for dimension math (unit testable)
//! - **Parameters**: data structures describing render operations
//! - **Backend**: [`ImageBackend`] trait + [`PixelBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod pixel_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_box, fit_long_edge, fit_width, snap_width};
pub use params::{OutputFormat, Quality, RenderParams};
pub use pixel_backend::PixelBackend;
