//! The resize operation: one source file, every active size.
//!
//! ```text
//! read source ─→ decode (all frames) ─→ pick output codec ─→ orient
//!        │
//!        ├─ size 1 ─→ geometry → transform frames → encode → copy metadata ┐
//!        ├─ size 2 ─→ ...                                      (rayon)     ├─→ write in size order
//!        └─ size n ─→ ...                                                  ┘
//! ```
//!
//! Sizes are rendered in parallel from the shared decoded image. Writes happen
//! one at a time in selection order: each output goes to a temp file in the
//! target directory and is persisted with a rename, so a failed size never
//! leaves a partial file and names are resolved deterministically.
//!
//! Errors before any size work (settings, reading, decoding, destination
//! directory, codec selection) fail the whole operation. After that, each size
//! succeeds or fails on its own and the outcome is collected in a
//! [`ResizeReport`].

use crate::config::{ConfigError, ResizeSize, Settings};
use crate::imaging::metadata::MetadataWarning;
use crate::imaging::orientation::{self, Orientation};
use crate::imaging::{
    BackendError, DecodedFrame, DecodedImage, EncodeOptions, ImageBackend, MetadataBag, Quality,
    Resolution, RustBackend, metadata, resolve_geometry, transform_frame,
};
use crate::naming::{self, NameContext};
use image::ImageFormat;
use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How often a name is re-resolved when another writer takes it first.
const PERSIST_ATTEMPTS: usize = 16;

#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("Cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl From<BackendError> for ResizeError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Io(e) => Self::Io(e),
            BackendError::Decode(msg) | BackendError::ProcessingFailed(msg) => Self::Encode(msg),
        }
    }
}

impl From<ConfigError> for ResizeError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Validation(msg) => Self::InvalidSettings(msg),
            other => Self::InvalidSettings(other.to_string()),
        }
    }
}

/// One written output.
#[derive(Debug, Clone)]
pub struct SizeOutput {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub frames: usize,
    /// Metadata entries the output codec could not carry.
    pub warnings: Vec<MetadataWarning>,
}

/// Outcome for one active size.
#[derive(Debug)]
pub struct SizeReport {
    pub size: String,
    pub result: Result<SizeOutput, ResizeError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    PartiallyFailed,
    Failed,
}

#[derive(Debug)]
pub struct ResizeReport {
    pub source: PathBuf,
    pub sizes: Vec<SizeReport>,
}

impl ResizeReport {
    pub fn status(&self) -> OperationStatus {
        let failed = self.sizes.iter().filter(|s| s.result.is_err()).count();
        match failed {
            0 => OperationStatus::Succeeded,
            n if n == self.sizes.len() => OperationStatus::Failed,
            _ => OperationStatus::PartiallyFailed,
        }
    }

    pub fn outputs(&self) -> impl Iterator<Item = &SizeOutput> {
        self.sizes.iter().filter_map(|s| s.result.as_ref().ok())
    }
}

/// Encoded bytes for one size, not yet on disk.
struct Rendered {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    frames: usize,
    warnings: Vec<MetadataWarning>,
}

/// Where and how outputs are written.
enum Target {
    /// Next to the given directory, uniquely named.
    Directory(PathBuf),
    /// Over the source file.
    Replace,
}

/// Resize one source image to every active size in a [`Settings`] snapshot.
///
/// Construct with [`ResizeOperation::new`], then call [`execute`](Self::execute)
/// exactly once.
pub struct ResizeOperation<'a> {
    source: PathBuf,
    destination: Option<PathBuf>,
    settings: &'a Settings,
    backend: &'a dyn ImageBackend,
}

impl<'a> ResizeOperation<'a> {
    /// `destination` is ignored in replace mode and required otherwise.
    pub fn new(
        source: impl Into<PathBuf>,
        destination: Option<PathBuf>,
        settings: &'a Settings,
    ) -> Self {
        Self {
            source: source.into(),
            destination,
            settings,
            backend: &RustBackend,
        }
    }

    /// Use a different codec backend.
    pub fn with_backend(mut self, backend: &'a dyn ImageBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn execute(self) -> Result<ResizeReport, ResizeError> {
        let settings = self.settings;
        settings.validate()?;
        let target = self.target()?;

        let data = fs::read(&self.source).map_err(|e| self.decode_error(e.to_string()))?;
        let mut decoded = self
            .backend
            .decode(&data)
            .map_err(|e| self.decode_error(e.to_string()))?;
        drop(data);
        let (width, height) = decoded.dimensions();
        debug!(
            source = %self.source.display(),
            format = ?decoded.format,
            frames = decoded.frames.len(),
            width,
            height,
            "decoded"
        );

        let modified = if settings.keep_date_modified {
            Some(fs::metadata(&self.source)?.modified()?)
        } else {
            None
        };

        if let Target::Directory(dir) = &target {
            fs::create_dir_all(dir)?;
        }

        let format = select_format(
            self.backend,
            decoded.format,
            decoded.frames.len(),
            settings.fallback_format.map(|f| f.image_format()),
        )?;
        if format != decoded.format {
            info!(from = ?decoded.format, to = ?format, "source codec is not writable, using fallback");
        }

        apply_orientation(&mut decoded, settings);
        let sizes: Vec<&ResizeSize> = settings.active_sizes().collect();

        let rendered: Vec<Result<Rendered, ResizeError>> = sizes
            .par_iter()
            .map(|size| self.render(&decoded, size, format))
            .collect();

        let extension = naming::output_extension(&self.source, decoded.format, format);
        let stem = naming::source_stem(&self.source);
        let reports = sizes
            .iter()
            .zip(rendered)
            .map(|(size, rendered)| {
                let result = rendered.and_then(|r| {
                    self.write(&target, &stem, &extension, size, format, r, modified)
                });
                match &result {
                    Ok(output) => info!(size = %size.name, path = %output.path.display(), "wrote"),
                    Err(e) => warn!(size = %size.name, error = %e, "size failed"),
                }
                SizeReport {
                    size: size.name.clone(),
                    result,
                }
            })
            .collect();

        Ok(ResizeReport {
            source: self.source,
            sizes: reports,
        })
    }

    fn decode_error(&self, reason: String) -> ResizeError {
        ResizeError::Decode {
            path: self.source.clone(),
            reason,
        }
    }

    fn target(&self) -> Result<Target, ResizeError> {
        if self.settings.replace {
            return Ok(Target::Replace);
        }
        self.destination
            .clone()
            .map(Target::Directory)
            .ok_or_else(|| {
                ResizeError::InvalidSettings(
                    "a destination directory is required unless replacing".into(),
                )
            })
    }

    fn render(
        &self,
        decoded: &DecodedImage,
        size: &ResizeSize,
        format: ImageFormat,
    ) -> Result<Rendered, ResizeError> {
        let first = &decoded.frames[0];
        let resolution = first.resolution;
        let geometry = resolve_geometry(
            (first.pixels.width(), first.pixels.height()),
            (resolution.x, resolution.y),
            size,
        );
        debug!(size = %size.name, ?geometry, "resolved geometry");

        let filter = self.settings.filter.filter_type();
        let frames: Vec<DecodedFrame> = decoded
            .frames
            .iter()
            .map(|frame| DecodedFrame {
                pixels: transform_frame(&frame.pixels, &geometry, filter),
                resolution: frame.resolution,
                delay: frame.delay,
                metadata: frame.metadata.clone(),
            })
            .collect();

        let options = EncodeOptions {
            quality: Quality::new(self.settings.jpeg_quality),
            resolution,
        };
        let encoded = self.backend.encode(&frames, format, &options)?;

        let bags: Vec<MetadataBag> = frames.into_iter().map(|f| f.metadata).collect();
        let supported = self.backend.capabilities(format).metadata;
        let (bytes, warnings) = metadata::copy_into(encoded, format, supported, &bags)?;
        for warning in &warnings {
            warn!(size = %size.name, "{warning}");
        }

        Ok(Rendered {
            bytes,
            width: geometry.width,
            height: geometry.height,
            frames: bags.len(),
            warnings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        target: &Target,
        stem: &str,
        extension: &str,
        size: &ResizeSize,
        format: ImageFormat,
        rendered: Rendered,
        modified: Option<SystemTime>,
    ) -> Result<SizeOutput, ResizeError> {
        let path = match target {
            Target::Directory(dir) => {
                let name = naming::render_file_name(
                    &self.settings.file_name_format,
                    &NameContext {
                        stem,
                        size,
                        actual_width: rendered.width,
                        actual_height: rendered.height,
                    },
                );
                persist_unique(dir, &name, extension, &rendered.bytes, modified)?
            }
            Target::Replace => self.replace_source(stem, extension, &rendered.bytes, modified)?,
        };
        Ok(SizeOutput {
            path,
            format,
            width: rendered.width,
            height: rendered.height,
            frames: rendered.frames,
            warnings: rendered.warnings,
        })
    }

    /// Overwrite the source, or write a sibling and remove the source when
    /// the extension changes.
    fn replace_source(
        &self,
        stem: &str,
        extension: &str,
        bytes: &[u8],
        modified: Option<SystemTime>,
    ) -> Result<PathBuf, ResizeError> {
        let dir = parent_dir(&self.source);
        let same_extension = self
            .source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == extension);
        if same_extension {
            let tmp = write_temp(dir, bytes, modified)?;
            tmp.persist(&self.source).map_err(|e| e.error)?;
            return Ok(self.source.clone());
        }
        let path = persist_unique(dir, stem, extension, bytes, modified)?;
        fs::remove_file(&self.source)?;
        debug!(removed = %self.source.display(), "removed original after codec change");
        Ok(path)
    }
}

/// Pick the output codec for a source with `frames` frames.
///
/// Source codec first, then the fallback, then GIF for animations.
pub fn select_format(
    backend: &dyn ImageBackend,
    source: ImageFormat,
    frames: usize,
    fallback: Option<ImageFormat>,
) -> Result<ImageFormat, ResizeError> {
    let animated_fallback = (frames > 1).then_some(ImageFormat::Gif);
    [Some(source), fallback, animated_fallback]
        .into_iter()
        .flatten()
        .find(|&format| backend.capabilities(format).can_write(frames))
        .ok_or_else(|| {
            ResizeError::UnsupportedFormat(format!(
                "no writable codec for {source:?} with {frames} frame(s)"
            ))
        })
}

/// Normalize pixels when the policy asks for it, resetting the copied tag.
fn apply_orientation(decoded: &mut DecodedImage, settings: &Settings) {
    let orientation: Orientation = decoded.frames[0].metadata.orientation();
    if !orientation::needs_normalization(orientation, settings.orientation) {
        return;
    }
    debug!(?orientation, "applying EXIF orientation to pixels");
    for frame in &mut decoded.frames {
        let pixels = std::mem::replace(&mut frame.pixels, image::DynamicImage::new_rgb8(1, 1));
        frame.pixels = orientation::normalize(pixels, orientation, settings.orientation);
        if orientation.swaps_dimensions() {
            frame.resolution = Resolution {
                x: frame.resolution.y,
                y: frame.resolution.x,
            };
        }
        frame.metadata = frame.metadata.with_normal_orientation();
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn write_temp(
    dir: &Path,
    bytes: &[u8],
    modified: Option<SystemTime>,
) -> Result<NamedTempFile, ResizeError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    if let Some(time) = modified {
        tmp.as_file().set_modified(time)?;
    }
    Ok(tmp)
}

/// Persist `bytes` under the first free name, never replacing an existing file.
fn persist_unique(
    dir: &Path,
    stem: &str,
    extension: &str,
    bytes: &[u8],
    modified: Option<SystemTime>,
) -> Result<PathBuf, ResizeError> {
    let mut tmp = write_temp(dir, bytes, modified)?;
    for _ in 0..PERSIST_ATTEMPTS {
        let path = naming::uniquify(dir, stem, extension, |p| p.exists());
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "name taken concurrently, retrying");
                tmp = e.file;
            }
            Err(e) => return Err(e.error.into()),
        }
    }
    Err(ResizeError::Io(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for '{stem}' in {}", dir.display()),
    )))
}
