//! EXIF orientation handling.
//!
//! The orientation tag says how stored pixels must be rotated/flipped for
//! display. By default ([`OrientationPolicy::Ignore`]) frames are resized as
//! stored and the tag travels with the copied EXIF, so viewers keep applying it.
//! With [`OrientationPolicy::Apply`] the pixels are normalized up front and the
//! copied tag is reset to [`Orientation::Normal`].

use crate::config::OrientationPolicy;
use image::DynamicImage;

/// EXIF orientation values 1-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Normal,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    /// Mirrored horizontally, then rotated 270° CW.
    Transpose,
    Rotate90,
    /// Mirrored horizontally, then rotated 90° CW.
    Transverse,
    Rotate270,
}

impl Orientation {
    /// Map an EXIF orientation value; out-of-range values read as normal.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    pub fn exif_value(self) -> u16 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// True when applying the orientation exchanges width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Rotate/flip `img` into display orientation.
    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => img,
            Self::FlipHorizontal => img.fliph(),
            Self::Rotate180 => img.rotate180(),
            Self::FlipVertical => img.flipv(),
            Self::Transpose => img.rotate90().fliph(),
            Self::Rotate90 => img.rotate90(),
            Self::Transverse => img.rotate270().fliph(),
            Self::Rotate270 => img.rotate270(),
        }
    }
}

/// Whether pixel data must be normalized before resizing.
pub fn needs_normalization(orientation: Orientation, policy: OrientationPolicy) -> bool {
    policy == OrientationPolicy::Apply && orientation != Orientation::Normal
}

/// Apply the policy to one frame's pixels.
pub fn normalize(
    img: DynamicImage,
    orientation: Orientation,
    policy: OrientationPolicy,
) -> DynamicImage {
    if needs_normalization(orientation, policy) {
        orientation.apply(img)
    } else {
        img
    }
}

/// Overwrite the orientation entry in IFD0 of a TIFF-structured EXIF payload
/// with 1 (normal). Payloads without the entry, or malformed ones, are left alone.
pub fn reset_exif_orientation(tiff: &mut [u8]) {
    if tiff.len() < 8 {
        return;
    }
    let le = match &tiff[0..2] {
        b"II" => true,
        b"MM" => false,
        _ => return,
    };
    let read_u16 = |b: &[u8]| {
        if le {
            u16::from_le_bytes([b[0], b[1]])
        } else {
            u16::from_be_bytes([b[0], b[1]])
        }
    };
    let ifd = {
        let b = &tiff[4..8];
        if le {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        }
    } as usize;
    if ifd + 2 > tiff.len() {
        return;
    }
    let entries = read_u16(&tiff[ifd..ifd + 2]) as usize;
    let mut pos = ifd + 2;
    for _ in 0..entries {
        if pos + 12 > tiff.len() {
            return;
        }
        if read_u16(&tiff[pos..pos + 2]) == 0x0112 {
            let value = pos + 8;
            let one = if le { 1u16.to_le_bytes() } else { 1u16.to_be_bytes() };
            tiff[value..value + 2].copy_from_slice(&one);
            return;
        }
        pos += 12;
    }
}
