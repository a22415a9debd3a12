//! # imgresize
//!
//! Resize an image to one or more named target sizes, writing uniquely named
//! copies next to each other or replacing the original in place.
//!
//! ```text
//! Photo.jpg  ──→  Photo (Small).jpg    854x480
//!            ──→  Photo (Large).jpg    1920x1080
//!            ──→  Photo (Small) (1).jpg   if "Photo (Small).jpg" already exists
//! ```
//!
//! Every frame of a multi-frame image is transformed, per-frame metadata
//! (EXIF, XMP, IPTC, ICC, text) is carried over when the output codec can hold
//! it, and sources whose codec cannot be written back fall back to a writable
//! one.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`operation`] | [`ResizeOperation`](operation::ResizeOperation): one source, every active size |
//! | [`config`] | [`Settings`](config::Settings) snapshot, TOML loading and validation |
//! | [`naming`] | Output name template and `(N)` uniquification |
//! | [`imaging`] | Geometry, orientation, frame transform, metadata, codec backend |
//! | [`output`] | CLI output formatting |
//!
//! # Example
//!
//! ```no_run
//! use imgresize::config::{ResizeSize, Settings};
//! use imgresize::operation::ResizeOperation;
//! use std::path::PathBuf;
//!
//! let settings = Settings::with_sizes(vec![ResizeSize::new("Small", 854.0, 480.0)]);
//! let report = ResizeOperation::new("Photo.jpg", Some(PathBuf::from("out")), &settings)
//!     .execute()?;
//! for output in report.outputs() {
//!     println!("{}", output.path.display());
//! }
//! # Ok::<(), imgresize::operation::ResizeError>(())
//! ```

pub mod config;
pub mod imaging;
pub mod naming;
pub mod operation;
pub mod output;

#[cfg(test)]
pub(crate) mod test_helpers;
