//! Pure calculation functions for target geometry.
//!
//! All functions here are pure and testable without any I/O or images:
//! unit conversion turns a configured length into pixels, and
//! [`resolve_geometry`] turns a [`ResizeSize`] into final output dimensions
//! plus, for fill mode, the source crop rectangle.

use crate::config::{FitMode, ResizeSize, ResizeUnit};

const CM_PER_INCH: f64 = 2.54;

/// Convert a configured length to absolute pixels along one axis.
///
/// # Arguments
/// * `value` - Length in `unit`
/// * `unit` - Unit of `value`
/// * `source_pixels` - Source size along the same axis (for percentages)
/// * `dpi` - Source resolution along the same axis (for physical units)
///
/// # Examples
/// ```
/// # use imgresize::imaging::{ResizeUnit, to_pixels};
/// assert_eq!(to_pixels(50.0, ResizeUnit::Percent, 800, 96.0), 400.0);
/// assert_eq!(to_pixels(2.0, ResizeUnit::Inch, 800, 300.0), 600.0);
/// ```
pub fn to_pixels(value: f64, unit: ResizeUnit, source_pixels: u32, dpi: f64) -> f64 {
    match unit {
        ResizeUnit::Pixel => value,
        ResizeUnit::Percent => value / 100.0 * source_pixels as f64,
        ResizeUnit::Inch => value * dpi,
        ResizeUnit::Centimeter => value * dpi / CM_PER_INCH,
    }
}

/// Crop rectangle in source pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resolved output geometry for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    /// Applied to the source before scaling (fill mode only).
    pub crop: Option<CropRect>,
}

impl Geometry {
    /// Geometry that leaves a `width` x `height` source untouched.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            crop: None,
        }
    }

    pub fn is_identity_for(&self, width: u32, height: u32) -> bool {
        self.crop.is_none() && self.width == width && self.height == height
    }
}

fn scale_dimension(source: u32, scale: f64) -> u32 {
    ((source as f64 * scale).round() as u32).max(1)
}

/// Resolve the output geometry for a source of `source` pixels at `dpi`.
///
/// - Width/height of `0` are "auto" and follow the other axis.
/// - `Fit` scales uniformly by the smaller axis scale.
/// - `Fill` scales uniformly by the larger axis scale and center-crops so the
///   output is exactly the requested box (no crop when an axis is auto).
/// - `Stretch` scales each axis independently.
/// - With `shrink_only`, any upscale keeps the source dimensions.
pub fn resolve_geometry(source: (u32, u32), dpi: (f64, f64), size: &ResizeSize) -> Geometry {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return Geometry::identity(src_w, src_h);
    }

    let target_w = to_pixels(size.width, size.unit, src_w, dpi.0);
    let target_h = to_pixels(size.height, size.unit, src_h, dpi.1);
    let scale_x = (target_w > 0.0).then(|| target_w / src_w as f64);
    let scale_y = (target_h > 0.0).then(|| target_h / src_h as f64);

    let (scale_x, scale_y) = match (size.fit, scale_x, scale_y) {
        (_, None, None) => return Geometry::identity(src_w, src_h),
        (FitMode::Fit, Some(sx), Some(sy)) => (sx.min(sy), sx.min(sy)),
        (FitMode::Fill, Some(sx), Some(sy)) => (sx.max(sy), sx.max(sy)),
        (FitMode::Stretch, Some(sx), Some(sy)) => (sx, sy),
        // A single constrained axis drives both
        (_, Some(s), None) | (_, None, Some(s)) => (s, s),
    };

    if size.shrink_only && (scale_x > 1.0 || scale_y > 1.0) {
        return Geometry::identity(src_w, src_h);
    }

    let fill_box = size.fit == FitMode::Fill && target_w > 0.0 && target_h > 0.0;
    if !fill_box {
        return Geometry {
            width: scale_dimension(src_w, scale_x),
            height: scale_dimension(src_h, scale_y),
            crop: None,
        };
    }

    // Fill: output is the box; crop the source region that maps onto it.
    let out_w = (target_w.round() as u32).max(1);
    let out_h = (target_h.round() as u32).max(1);
    let crop_w = ((out_w as f64 / scale_x).round() as u32).clamp(1, src_w);
    let crop_h = ((out_h as f64 / scale_y).round() as u32).clamp(1, src_h);
    let crop = (crop_w < src_w || crop_h < src_h).then(|| CropRect {
        x: (src_w - crop_w) / 2,
        y: (src_h - crop_h) / 2,
        width: crop_w,
        height: crop_h,
    });

    Geometry {
        width: out_w,
        height: out_h,
        crop,
    }
}
