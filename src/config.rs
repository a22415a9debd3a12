//! Resize settings.
//!
//! A [`Settings`] value is the read-only snapshot a [`ResizeOperation`] works
//! from: the list of named target sizes, which of them are active for this run,
//! and the global flags (replace, keep date modified, naming template, codec
//! fallback). The caller owns it; the core only borrows it.
//!
//! ## Config File
//!
//! The CLI loads settings from a TOML file. Every key is optional and unknown
//! keys are rejected to catch typos early:
//!
//! ```toml
//! selected_sizes = [0]            # Indices into `sizes` resized in one run
//! keep_date_modified = false      # Copy the source's last-write time to outputs
//! replace = false                 # Overwrite the original instead of writing copies
//! file_name_format = "{name} ({size})"
//! fallback_format = "jpeg"        # Used when the source codec cannot be written
//! jpeg_quality = 90               # 1-100
//! orientation = "ignore"          # "ignore" | "apply" (EXIF orientation)
//! filter = "lanczos3"             # Resampling filter
//!
//! [[sizes]]
//! name = "Small"
//! width = 854
//! height = 480
//! unit = "pixel"                  # "pixel" | "percent" | "inch" | "centimeter"
//! fit = "fit"                     # "fit" | "fill" | "stretch"
//! shrink_only = false
//! ```
//!
//! A `width` or `height` of `0` means "auto": that axis follows the aspect ratio.
//!
//! [`ResizeOperation`]: crate::operation::ResizeOperation

use image::ImageFormat;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Unit a [`ResizeSize`] width/height is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeUnit {
    #[default]
    Pixel,
    Percent,
    Inch,
    Centimeter,
}

/// How the source aspect ratio is reconciled with the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale uniformly so the whole image fits inside the box.
    #[default]
    Fit,
    /// Scale uniformly to cover the box, then center-crop to it.
    Fill,
    /// Scale each axis independently.
    Stretch,
}

/// A named target size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeSize {
    /// Label used in output file names.
    pub name: String,
    /// Target width in `unit`; `0` means auto.
    pub width: f64,
    /// Target height in `unit`; `0` means auto.
    pub height: f64,
    pub unit: ResizeUnit,
    pub fit: FitMode,
    /// Never upscale: sources already within the box are kept at their size.
    pub shrink_only: bool,
}

impl ResizeSize {
    /// A pixel-unit, fit-mode size.
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: ResizeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn shrink_only(mut self, shrink_only: bool) -> Self {
        self.shrink_only = shrink_only;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("size names must not be empty".into()));
        }
        if !(self.width >= 0.0 && self.height >= 0.0)
            || !self.width.is_finite()
            || !self.height.is_finite()
        {
            return Err(ConfigError::Validation(format!(
                "size '{}' must have non-negative width and height",
                self.name
            )));
        }
        if self.width == 0.0 && self.height == 0.0 {
            return Err(ConfigError::Validation(format!(
                "size '{}' needs at least one of width or height",
                self.name
            )));
        }
        Ok(())
    }
}

impl Default for ResizeSize {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 0.0,
            height: 0.0,
            unit: ResizeUnit::Pixel,
            fit: FitMode::Fit,
            shrink_only: false,
        }
    }
}

/// Writable codecs that can be configured as the fallback for read-only sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    #[serde(rename = "webp")]
    WebP,
}

impl OutputFormat {
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Gif => ImageFormat::Gif,
            Self::Bmp => ImageFormat::Bmp,
            Self::Tiff => ImageFormat::Tiff,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// `fallback_format` as a format name or `"none"`; a missing key keeps the default.
mod fallback_serde {
    use super::OutputFormat;
    use serde::de::IntoDeserializer;
    use serde::de::value::StrDeserializer;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<OutputFormat>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(format) => format.serialize(serializer),
            None => serializer.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OutputFormat>, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name == "none" {
            return Ok(None);
        }
        let format: StrDeserializer<'_, D::Error> = name.as_str().into_deserializer();
        OutputFormat::deserialize(format).map(Some)
    }
}

/// Whether EXIF orientation is applied to pixel data before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Resize the pixels as stored; the orientation tag is copied untouched.
    #[default]
    Ignore,
    /// Rotate/flip first and reset the copied orientation tag to normal.
    Apply,
}

/// Resampling filter used by the frame transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl Interpolation {
    pub fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Settings snapshot for one resize run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sizes: Vec<ResizeSize>,
    /// Indices into `sizes` that are active for this run.
    pub selected_sizes: Vec<usize>,
    pub keep_date_modified: bool,
    /// Overwrite the source file; the destination directory is ignored.
    pub replace: bool,
    /// Output name template; see [`crate::naming::render_file_name`].
    pub file_name_format: String,
    /// Codec used when the source codec cannot be re-encoded. `None` disables it
    /// (`"none"` in TOML).
    #[serde(with = "fallback_serde")]
    pub fallback_format: Option<OutputFormat>,
    pub jpeg_quality: u32,
    pub orientation: OrientationPolicy,
    pub filter: Interpolation,
}

pub const DEFAULT_FILE_NAME_FORMAT: &str = "{name} ({size})";

impl Default for Settings {
    fn default() -> Self {
        Self {
            sizes: vec![
                ResizeSize::new("Small", 854.0, 480.0),
                ResizeSize::new("Medium", 1366.0, 768.0),
                ResizeSize::new("Large", 1920.0, 1080.0),
                ResizeSize::new("Phone", 320.0, 568.0),
            ],
            selected_sizes: vec![0],
            keep_date_modified: false,
            replace: false,
            file_name_format: DEFAULT_FILE_NAME_FORMAT.to_string(),
            fallback_format: Some(OutputFormat::Jpeg),
            jpeg_quality: 90,
            orientation: OrientationPolicy::Ignore,
            filter: Interpolation::Lanczos3,
        }
    }
}

impl Settings {
    /// Settings with exactly the given sizes, all of them selected.
    pub fn with_sizes(sizes: Vec<ResizeSize>) -> Self {
        let selected_sizes = (0..sizes.len()).collect();
        Self {
            sizes,
            selected_sizes,
            ..Self::default()
        }
    }

    /// Select sizes by name. Unknown names are a validation error.
    pub fn select_by_name<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), ConfigError> {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let index = self
                .sizes
                .iter()
                .position(|s| s.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| ConfigError::Validation(format!("unknown size '{name}'")))?;
            selected.push(index);
        }
        self.selected_sizes = selected;
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selected_sizes = (0..self.sizes.len()).collect();
    }

    /// The active sizes in selection order.
    pub fn active_sizes(&self) -> impl Iterator<Item = &ResizeSize> + '_ {
        self.selected_sizes
            .iter()
            .filter_map(|&index| self.sizes.get(index))
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selected_sizes.is_empty() {
            return Err(ConfigError::Validation(
                "selected_sizes must not be empty".into(),
            ));
        }
        if let Some(&index) = self.selected_sizes.iter().find(|&&i| i >= self.sizes.len()) {
            return Err(ConfigError::Validation(format!(
                "selected size index {index} is out of range ({} sizes configured)",
                self.sizes.len()
            )));
        }
        for size in self.active_sizes() {
            size.validate()?;
        }
        if self.replace && self.selected_sizes.len() > 1 {
            return Err(ConfigError::Validation(
                "replace can only be used with a single selected size".into(),
            ));
        }
        if !self.file_name_format.contains("{name}") && !self.file_name_format.contains("{size}")
        {
            return Err(ConfigError::Validation(
                "file_name_format must contain {name} or {size}".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Validation("jpeg_quality must be 1-100".into()));
        }
        Ok(())
    }

    /// [`validate`](Self::validate), plus every configured size, selected or not.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.sizes.iter().try_for_each(ResizeSize::validate)
    }
}

/// Load settings from a TOML file on top of the stock defaults, then validate
/// every size in it.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    settings.validate_all()?;
    Ok(settings)
}

/// Returns a fully-commented stock settings file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgresize settings
# ==================
#
# All keys are optional. Unknown keys are rejected.

# Indices into [[sizes]] resized in one run.
selected_sizes = [0]

# Give every output the source file's last-write time.
keep_date_modified = false

# Overwrite the source instead of writing "{name} ({size})" copies.
# Only one size may be selected in this mode.
replace = false

# Output file name, without extension. Tokens:
#   {name}           source file name without extension
#   {size}           size name
#   {width}/{height} requested width/height as configured
#   {actual_width}/{actual_height} output pixel dimensions
file_name_format = "{name} ({size})"

# Codec used when the source format cannot be written back.
# One of: jpeg, png, gif, bmp, tiff, webp, or "none" to disable.
fallback_format = "jpeg"

# JPEG encoding quality, 1-100.
jpeg_quality = 90

# EXIF orientation: "ignore" resizes pixels as stored, "apply" rotates first.
orientation = "ignore"

# Resampling filter: nearest, triangle, catmull_rom, gaussian, lanczos3.
filter = "lanczos3"

# Sizes. unit: pixel | percent | inch | centimeter. fit: fit | fill | stretch.
# A width or height of 0 lets that axis follow the aspect ratio.

[[sizes]]
name = "Small"
width = 854
height = 480
unit = "pixel"
fit = "fit"
shrink_only = false

[[sizes]]
name = "Medium"
width = 1366
height = 768

[[sizes]]
name = "Large"
width = 1920
height = 1080

[[sizes]]
name = "Phone"
width = 320
height = 568
"##
}
