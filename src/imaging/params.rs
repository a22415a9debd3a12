//! Parameter types for encoding.
//!
//! These structs describe *what* to write, not *how*. They sit between the
//! [`operation`](crate::operation) (which decides sizes and formats) and the
//! [`backend`](super::backend) (which does the codec work), so a backend can be
//! swapped in tests without touching the orchestration.

use super::metadata::Resolution;

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

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Options shared by every frame of one encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeOptions {
    pub quality: Quality,
    /// Written into containers that record physical resolution.
    pub resolution: Resolution,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            resolution: Resolution::default(),
        }
    }
}
