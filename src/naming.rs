//! Output filename resolution.
//!
//! Names are built from the `file_name_format` template, then made unique in
//! the destination directory:
//!
//! | Token | Value |
//! |---|---|
//! | `{name}` | Source file stem |
//! | `{size}` | Size name |
//! | `{width}`, `{height}` | Requested values as configured (`0` for auto) |
//! | `{actual_width}`, `{actual_height}` | Output pixel dimensions |
//!
//! With the default template `"{name} ({size})"` a source `Test.jpg` resized to
//! `Small` becomes `Test (Small).jpg`; if that exists, `Test (Small) (1).jpg`,
//! then `(2)` and so on.

use crate::config::ResizeSize;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Values substituted into the naming template.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub stem: &'a str,
    pub size: &'a ResizeSize,
    pub actual_width: u32,
    pub actual_height: u32,
}

/// Render the template into a file stem (no extension), with characters that
/// are invalid in file names replaced by `_`.
pub fn render_file_name(format: &str, ctx: &NameContext<'_>) -> String {
    let rendered = format
        .replace("{name}", ctx.stem)
        .replace("{size}", &ctx.size.name)
        .replace("{actual_width}", &ctx.actual_width.to_string())
        .replace("{actual_height}", &ctx.actual_height.to_string())
        .replace("{width}", &ctx.size.width.to_string())
        .replace("{height}", &ctx.size.height.to_string());
    sanitize(&rendered)
}

/// Replace path separators, reserved characters and control characters with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn with_extension(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    if extension.is_empty() {
        dir.join(stem)
    } else {
        dir.join(format!("{stem}.{extension}"))
    }
}

/// First free path among `stem.ext`, `stem (1).ext`, `stem (2).ext`, ...
///
/// `exists` is injected so resolution can be tested without a filesystem.
pub fn uniquify(
    dir: &Path,
    stem: &str,
    extension: &str,
    exists: impl Fn(&Path) -> bool,
) -> PathBuf {
    let candidate = with_extension(dir, stem, extension);
    if !exists(&candidate) {
        return candidate;
    }
    (1u32..)
        .map(|n| with_extension(dir, &format!("{stem} ({n})"), extension))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

/// Extension for an output written as `output` from a source decoded as `source`.
///
/// Keeps the source's own spelling (`.jpeg`, `.JPG`) when the format is kept,
/// otherwise the output format's primary extension.
pub fn output_extension(source_path: &Path, source: ImageFormat, output: ImageFormat) -> String {
    let primary = output
        .extensions_str()
        .first()
        .copied()
        .unwrap_or_default()
        .to_string();
    if source != output {
        return primary;
    }
    source_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string)
        .unwrap_or(primary)
}

/// Source file stem, or `"image"` for paths without one.
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}
