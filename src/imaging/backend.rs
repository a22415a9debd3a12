//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam to the codec layer: decode a whole
//! container into frames, report what a format can be written with, and encode
//! frames back. Metadata copying happens on the encoded bytes afterwards (see
//! [`metadata::copy_into`](super::metadata::copy_into)).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image` crate.

use super::metadata::{MetadataBag, MetadataSchema, Resolution};
use super::params::EncodeOptions;
use image::{Delay, DynamicImage, ImageFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decoding failed: {0}")]
    Decode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub pixels: DynamicImage,
    pub resolution: Resolution,
    /// Display time for animated containers.
    pub delay: Option<Delay>,
    pub metadata: MetadataBag,
}

/// A decoded container: its format and every frame in order.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: ImageFormat,
    pub frames: Vec<DecodedFrame>,
}

impl DecodedImage {
    /// Pixel dimensions of the first frame.
    pub fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|f| (f.pixels.width(), f.pixels.height()))
            .unwrap_or((0, 0))
    }
}

/// What a backend can do with a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// An encoder is available.
    pub writable: bool,
    /// The encoder can hold more than one frame.
    pub multi_frame: bool,
    /// Metadata schemas the container can carry.
    pub metadata: &'static [MetadataSchema],
}

impl Capabilities {
    /// Writable and able to hold `frames` frames.
    pub fn can_write(&self, frames: usize) -> bool {
        self.writable && (frames <= 1 || self.multi_frame)
    }
}

/// Codec layer used by the resize operation.
///
/// `Sync` so sizes can be rendered in parallel with rayon.
pub trait ImageBackend: Sync {
    /// Decode every frame of an encoded image.
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, BackendError>;

    /// Capabilities for writing `format`.
    fn capabilities(&self, format: ImageFormat) -> Capabilities;

    /// Encode `frames` (at least one) as `format`.
    fn encode(
        &self,
        frames: &[DecodedFrame],
        format: ImageFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use std::sync::Mutex;

    /// Wraps [`RustBackend`], optionally declaring formats read-only or failing
    /// encodes of a given width, and records every encode.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct TestBackend {
        inner: RustBackend,
        pub read_only: Vec<ImageFormat>,
        pub fail_width: Option<u32>,
        pub encodes: Mutex<Vec<(ImageFormat, u32, u32, usize)>>,
    }

    impl TestBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn read_only(formats: &[ImageFormat]) -> Self {
            Self {
                read_only: formats.to_vec(),
                ..Self::default()
            }
        }

        pub fn failing_width(width: u32) -> Self {
            Self {
                fail_width: Some(width),
                ..Self::default()
            }
        }

        pub fn recorded(&self) -> Vec<(ImageFormat, u32, u32, usize)> {
            self.encodes.lock().unwrap().clone()
        }
    }

    impl ImageBackend for TestBackend {
        fn decode(&self, data: &[u8]) -> Result<DecodedImage, BackendError> {
            self.inner.decode(data)
        }

        fn capabilities(&self, format: ImageFormat) -> Capabilities {
            let caps = self.inner.capabilities(format);
            if self.read_only.contains(&format) {
                Capabilities {
                    writable: false,
                    ..caps
                }
            } else {
                caps
            }
        }

        fn encode(
            &self,
            frames: &[DecodedFrame],
            format: ImageFormat,
            options: &EncodeOptions,
        ) -> Result<Vec<u8>, BackendError> {
            let (w, h) = (frames[0].pixels.width(), frames[0].pixels.height());
            self.encodes
                .lock()
                .unwrap()
                .push((format, w, h, frames.len()));
            if self.fail_width == Some(w) {
                return Err(BackendError::ProcessingFailed(format!(
                    "refusing to encode width {w}"
                )));
            }
            self.inner.encode(frames, format, options)
        }
    }

    #[test]
    fn can_write_respects_frame_count() {
        let single = Capabilities {
            writable: true,
            multi_frame: false,
            metadata: &[],
        };
        assert!(single.can_write(1));
        assert!(!single.can_write(3));

        let read_only = Capabilities {
            writable: false,
            multi_frame: true,
            metadata: &[],
        };
        assert!(!read_only.can_write(1));
    }

    #[test]
    fn test_backend_marks_formats_read_only() {
        let backend = TestBackend::read_only(&[ImageFormat::Jpeg]);
        assert!(!backend.capabilities(ImageFormat::Jpeg).writable);
        assert!(backend.capabilities(ImageFormat::Png).writable);
    }

    #[test]
    fn decoded_image_dimensions_come_from_first_frame() {
        let image = DecodedImage {
            format: ImageFormat::Png,
            frames: vec![DecodedFrame {
                pixels: DynamicImage::new_rgb8(12, 7),
                resolution: Resolution::default(),
                delay: None,
                metadata: MetadataBag::new(),
            }],
        };
        assert_eq!(image.dimensions(), (12, 7));

        let empty = DecodedImage {
            format: ImageFormat::Png,
            frames: Vec::new(),
        };
        assert_eq!(empty.dimensions(), (0, 0));
    }
}
