//! Per-frame pixel transformation.

use super::calculations::Geometry;
use image::DynamicImage;
use image::imageops::FilterType;

/// Scale (and for fill mode, crop) one frame to `geometry`.
///
/// Identity geometry returns an unscaled copy so the output is pixel-identical
/// to the source.
pub fn transform_frame(frame: &DynamicImage, geometry: &Geometry, filter: FilterType) -> DynamicImage {
    if geometry.is_identity_for(frame.width(), frame.height()) {
        return frame.clone();
    }
    let cropped;
    let source = match geometry.crop {
        Some(rect) => {
            cropped = frame.crop_imm(rect.x, rect.y, rect.width, rect.height);
            &cropped
        }
        None => frame,
    };
    if source.width() == geometry.width && source.height() == geometry.height {
        return source.clone();
    }
    source.resize_exact(geometry.width, geometry.height, filter)
}
