//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.
//!
//! ## Resize
//!
//! ```text
//! Test.jpg
//!     001 Small → Test (Small).jpg (854x480, Jpeg)
//!         warning: frame 0: IPTC skipped (Png cannot store it)
//!     002 Large: failed: Encoding failed: ...
//! 1 written, 1 failed
//! ```
//!
//! ## Sizes
//!
//! ```text
//! 000 * Small 854x480 pixel, fit
//! 001   Medium 1366x768 pixel, fit
//! 002   Print 10x0 centimeter, fill, shrink only
//! ```
//!
//! `*` marks selected sizes.

use crate::config::{FitMode, ResizeSize, ResizeUnit, Settings};
use crate::operation::{OperationStatus, ResizeReport};
use serde_json::{Value, json};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn unit_name(unit: ResizeUnit) -> &'static str {
    match unit {
        ResizeUnit::Pixel => "pixel",
        ResizeUnit::Percent => "percent",
        ResizeUnit::Inch => "inch",
        ResizeUnit::Centimeter => "centimeter",
    }
}

fn fit_name(fit: FitMode) -> &'static str {
    match fit {
        FitMode::Fit => "fit",
        FitMode::Fill => "fill",
        FitMode::Stretch => "stretch",
    }
}

fn status_name(status: OperationStatus) -> &'static str {
    match status {
        OperationStatus::Succeeded => "succeeded",
        OperationStatus::PartiallyFailed => "partially_failed",
        OperationStatus::Failed => "failed",
    }
}

// ============================================================================
// Resize
// ============================================================================

pub fn format_report(report: &ResizeReport) -> Vec<String> {
    let mut lines = vec![file_name(&report.source)];
    let mut written = 0;
    for (i, size) in report.sizes.iter().enumerate() {
        let header = format!("{}{} {}", indent(1), format_index(i + 1), size.size);
        match &size.result {
            Ok(output) => {
                written += 1;
                lines.push(format!(
                    "{header} → {} ({}x{}, {:?})",
                    file_name(&output.path),
                    output.width,
                    output.height,
                    output.format
                ));
                for warning in &output.warnings {
                    lines.push(format!("{}warning: {warning}", indent(2)));
                }
            }
            Err(e) => lines.push(format!("{header}: failed: {e}")),
        }
    }
    let failed = report.sizes.len() - written;
    lines.push(if failed == 0 {
        format!("{written} written")
    } else {
        format!("{written} written, {failed} failed")
    });
    lines
}

pub fn print_report(report: &ResizeReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

/// Machine-readable summary of a report.
pub fn report_json(report: &ResizeReport) -> Value {
    let sizes: Vec<Value> = report
        .sizes
        .iter()
        .map(|size| match &size.result {
            Ok(output) => json!({
                "size": size.size,
                "path": output.path.display().to_string(),
                "format": format!("{:?}", output.format),
                "width": output.width,
                "height": output.height,
                "frames": output.frames,
                "warnings": output.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            }),
            Err(e) => json!({
                "size": size.size,
                "error": e.to_string(),
            }),
        })
        .collect();
    json!({
        "source": report.source.display().to_string(),
        "status": status_name(report.status()),
        "sizes": sizes,
    })
}

// ============================================================================
// Sizes
// ============================================================================

fn size_line(index: usize, size: &ResizeSize, selected: bool) -> String {
    let marker = if selected { "*" } else { " " };
    let mut line = format!(
        "{} {marker} {} {}x{} {}, {}",
        format_index(index),
        size.name,
        size.width,
        size.height,
        unit_name(size.unit),
        fit_name(size.fit)
    );
    if size.shrink_only {
        line.push_str(", shrink only");
    }
    line
}

pub fn format_sizes(settings: &Settings) -> Vec<String> {
    settings
        .sizes
        .iter()
        .enumerate()
        .map(|(i, size)| size_line(i, size, settings.selected_sizes.contains(&i)))
        .collect()
}

pub fn print_sizes(settings: &Settings) {
    for line in format_sizes(settings) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
