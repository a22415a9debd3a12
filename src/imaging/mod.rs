//! Image processing pipeline pieces.
//!
//! | Stage | Module |
//! |---|---|
//! | **Units + geometry** | [`calculations`]: `to_pixels`, `resolve_geometry` |
//! | **Orientation** | [`orientation`]: EXIF orientation policy |
//! | **Pixels** | [`transform`]: crop + rescale one frame |
//! | **Metadata** | [`metadata`]: extract and copy EXIF/XMP/IPTC/ICC/text |
//! | **Codecs** | [`backend`]: [`ImageBackend`] trait + [`RustBackend`] |
//!
//! The math is pure and unit tested without images; everything touching
//! encoded bytes goes through the backend so it can be swapped in tests.

pub mod backend;
mod calculations;
pub mod metadata;
pub mod orientation;
mod params;
pub mod rust_backend;
mod transform;

pub use crate::config::ResizeUnit;
pub use backend::{BackendError, Capabilities, DecodedFrame, DecodedImage, ImageBackend};
pub use calculations::{CropRect, Geometry, resolve_geometry, to_pixels};
pub use metadata::{MetadataBag, MetadataSchema, MetadataWarning, Resolution};
pub use orientation::{Orientation, normalize};
pub use params::{EncodeOptions, Quality};
pub use rust_backend::RustBackend;
pub use transform::transform_frame;
