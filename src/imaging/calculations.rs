//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//! None of them ever return dimensions larger than the original — upscaling
//! a photo only adds bytes, never detail.

/// Fit dimensions within a maximum long edge, preserving aspect ratio.
///
/// If the original's long edge is already at or below `max_edge`, the
/// original dimensions are returned unchanged (never upscale).
///
/// # Examples
/// ```
/// # use darkroom::imaging::fit_long_edge;
/// assert_eq!(fit_long_edge((2000, 1500), 800), (800, 600));
/// assert_eq!(fit_long_edge((1500, 2000), 800), (600, 800));
/// assert_eq!(fit_long_edge((640, 480), 800), (640, 480));
/// ```
pub fn fit_long_edge(original: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = original;
    let longer = w.max(h);
    if longer <= max_edge {
        return original;
    }
    let ratio = max_edge as f64 / longer as f64;
    if w >= h {
        (max_edge, scale(h, ratio))
    } else {
        (scale(w, ratio), max_edge)
    }
}

/// Fit dimensions within a maximum width, preserving aspect ratio.
///
/// The on-demand endpoint negotiates on width, so its live derivations are
/// width-constrained rather than long-edge-constrained. Never upscales.
pub fn fit_width(original: (u32, u32), max_width: u32) -> (u32, u32) {
    let (w, h) = original;
    if w <= max_width {
        return original;
    }
    let ratio = max_width as f64 / w as f64;
    (max_width, scale(h, ratio))
}

/// Fit dimensions inside a bounding box, preserving aspect ratio.
/// Used for the placeholder render. Never upscales.
pub fn fit_box(original: (u32, u32), max_w: u32, max_h: u32) -> (u32, u32) {
    let (w, h) = original;
    if w <= max_w && h <= max_h {
        return original;
    }
    let ratio = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    (scale(w, ratio), scale(h, ratio))
}

fn scale(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 * ratio).round() as u32).max(1)
}

/// Snap a requested width to the nearest breakpoint by minimum absolute
/// distance. Ties keep the earlier breakpoint (strict `<` comparator over
/// encounter order), so `600` against `[400, 800]` resolves to `400`.
///
/// An empty breakpoint list returns the request unchanged.
pub fn snap_width(requested: u32, breakpoints: &[u32]) -> u32 {
    let Some(&first) = breakpoints.first() else {
        return requested;
    };
    breakpoints.iter().copied().fold(first, |prev, curr| {
        let d_curr = (curr as i64 - requested as i64).abs();
        let d_prev = (prev as i64 - requested as i64).abs();
        if d_curr < d_prev { curr } else { prev }
    })
}
