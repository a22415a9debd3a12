//! Frame metadata: extraction, inspection and copying.
//!
//! A [`MetadataBag`] holds every non-pixel payload found on a frame as raw
//! bytes, keyed by [`MetadataSchema`]. Payloads are normalized to the schema
//! rather than the container (EXIF is the bare TIFF structure, XMP the packet,
//! ICC the profile), so a JPEG EXIF block can be written into a PNG `eXIf` chunk
//! and vice versa. Copying is byte-for-byte: multi-value fields such as the EXIF
//! Artist list survive whole.
//!
//! | Schema | JPEG | PNG | WebP |
//! |---|---|---|---|
//! | EXIF | APP1 `Exif\0\0` | `eXIf` | `EXIF` |
//! | XMP | APP1 `http://ns.adobe.com/xap/1.0/\0` | `iTXt XML:com.adobe.xmp` | - |
//! | IPTC | APP13 `Photoshop 3.0` | - | - |
//! | ICC | APP2 `ICC_PROFILE` | `iCCP` | `ICCP` |
//! | Comment | COM | `tEXt Comment` | - |
//! | Text | - | `tEXt` / `zTXt` / `iTXt` | - |
//!
//! Container access goes through `img-parts`; EXIF fields are parsed with
//! `kamadak-exif`.

use super::backend::BackendError;
use super::orientation::{Orientation, reset_exif_orientation};
use image::ImageFormat;
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};
use img_parts::riff::{RiffChunk, RiffContent};
use img_parts::webp::{CHUNK_ALPH, CHUNK_EXIF, CHUNK_ICCP, CHUNK_VP8L, CHUNK_VP8X, WebP};
use img_parts::{Bytes, ImageEXIF, ImageICC};
use std::fmt;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const XMP_PREFIX: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const IPTC_PREFIX: &[u8] = b"Photoshop 3.0\0";
const ICC_PREFIX: &[u8] = b"ICC_PROFILE\0";
const JFIF_PREFIX: &[u8] = b"JFIF\0";
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

mod markers {
    pub const APP0: u8 = 0xE0;
    pub const APP1: u8 = 0xE1;
    pub const APP2: u8 = 0xE2;
    pub const APP13: u8 = 0xED;
    pub const APP15: u8 = 0xEF;
    pub const COM: u8 = 0xFE;
}

/// Largest payload a single JPEG marker segment can hold (length field minus itself).
const JPEG_SEGMENT_MAX: usize = 65533;
/// ICC chunks also carry the prefix plus sequence/count bytes.
const JPEG_ICC_CHUNK_MAX: usize = JPEG_SEGMENT_MAX - 14;

/// Default resolution when neither the container nor EXIF says otherwise.
pub const DEFAULT_DPI: f64 = 96.0;

/// Kind of metadata payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataSchema {
    Exif,
    Xmp,
    Iptc,
    Icc,
    Comment,
    /// PNG textual chunk, stored with its chunk type.
    Text,
}

impl fmt::Display for MetadataSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exif => "EXIF",
            Self::Xmp => "XMP",
            Self::Iptc => "IPTC",
            Self::Icc => "ICC profile",
            Self::Comment => "comment",
            Self::Text => "text chunk",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub schema: MetadataSchema,
    /// PNG chunk type for [`MetadataSchema::Text`] entries.
    pub chunk_type: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl MetadataEntry {
    pub fn new(schema: MetadataSchema, payload: Vec<u8>) -> Self {
        Self {
            schema,
            chunk_type: None,
            payload,
        }
    }

    fn text(chunk_type: [u8; 4], payload: Vec<u8>) -> Self {
        Self {
            schema: MetadataSchema::Text,
            chunk_type: Some(chunk_type),
            payload,
        }
    }
}

/// Non-fatal: an entry the destination codec cannot represent was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataWarning {
    pub frame: usize,
    pub schema: MetadataSchema,
    pub reason: String,
}

impl fmt::Display for MetadataWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}: {} skipped ({})", self.frame, self.schema, self.reason)
    }
}

/// Horizontal and vertical resolution in dots per inch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            x: DEFAULT_DPI,
            y: DEFAULT_DPI,
        }
    }
}

/// All metadata attached to one frame. `Clone` is a deep copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBag {
    entries: Vec<MetadataEntry>,
}

impl MetadataBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: MetadataEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First payload of the given schema.
    pub fn get(&self, schema: MetadataSchema) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.schema == schema)
            .map(|e| e.payload.as_slice())
    }

    fn parsed_exif(&self) -> Option<exif::Exif> {
        let tiff = self.get(MetadataSchema::Exif)?;
        exif::Reader::new().read_raw(tiff.to_vec()).ok()
    }

    /// Authors from the EXIF Artist tag; `;` separates multiple authors.
    pub fn authors(&self) -> Vec<String> {
        let Some(parsed) = self.parsed_exif() else {
            return Vec::new();
        };
        let Some(field) = parsed.get_field(exif::Tag::Artist, exif::In::PRIMARY) else {
            return Vec::new();
        };
        match &field.value {
            exif::Value::Ascii(values) => values
                .iter()
                .flat_map(|v| {
                    String::from_utf8_lossy(v)
                        .split(';')
                        .map(|s| s.trim().to_string())
                        .collect::<Vec<_>>()
                })
                .filter(|s| !s.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.parsed_exif()
            .and_then(|parsed| {
                parsed
                    .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                    .and_then(|f| f.value.get_uint(0))
            })
            .map(Orientation::from_exif)
            .unwrap_or_default()
    }

    /// Resolution from EXIF XResolution/YResolution, if present.
    pub fn exif_resolution(&self) -> Option<Resolution> {
        let parsed = self.parsed_exif()?;
        let rational = |tag| match &parsed.get_field(tag, exif::In::PRIMARY)?.value {
            exif::Value::Rational(v) if !v.is_empty() && v[0].denom != 0 => Some(v[0].to_f64()),
            _ => None,
        };
        let x = rational(exif::Tag::XResolution)?;
        let y = rational(exif::Tag::YResolution).unwrap_or(x);
        let unit = parsed
            .get_field(exif::Tag::ResolutionUnit, exif::In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .unwrap_or(2);
        let per_inch = match unit {
            3 => 2.54,
            _ => 1.0,
        };
        (x > 0.0 && y > 0.0).then_some(Resolution {
            x: x * per_inch,
            y: y * per_inch,
        })
    }

    /// Copy with the EXIF orientation tag reset to normal.
    pub fn with_normal_orientation(&self) -> Self {
        let mut copy = self.clone();
        for entry in &mut copy.entries {
            if entry.schema == MetadataSchema::Exif {
                reset_exif_orientation(&mut entry.payload);
            }
        }
        copy
    }
}

/// Metadata and resolution read from an encoded container.
#[derive(Debug, Clone, Default)]
pub struct ContainerMetadata {
    pub bag: MetadataBag,
    /// Resolution declared by the container itself (JFIF density, PNG pHYs).
    pub resolution: Option<Resolution>,
}

impl ContainerMetadata {
    /// Container resolution, then EXIF resolution, then [`DEFAULT_DPI`].
    pub fn effective_resolution(&self) -> Resolution {
        self.resolution
            .or_else(|| self.bag.exif_resolution())
            .unwrap_or_default()
    }
}

/// Extract metadata from an encoded image. Unknown containers yield nothing.
pub fn extract(format: ImageFormat, data: &[u8]) -> ContainerMetadata {
    let bytes = Bytes::copy_from_slice(data);
    match format {
        ImageFormat::Jpeg => Jpeg::from_bytes(bytes)
            .map(|jpeg| extract_jpeg(&jpeg))
            .unwrap_or_default(),
        ImageFormat::Png => Png::from_bytes(bytes)
            .map(|png| extract_png(&png))
            .unwrap_or_default(),
        ImageFormat::WebP => WebP::from_bytes(bytes)
            .map(|webp| extract_webp(&webp))
            .unwrap_or_default(),
        _ => ContainerMetadata::default(),
    }
}

fn extract_jpeg(jpeg: &Jpeg) -> ContainerMetadata {
    let mut meta = ContainerMetadata::default();
    for segment in jpeg.segments() {
        let contents = segment.contents();
        match segment.marker() {
            markers::APP0 if contents.starts_with(JFIF_PREFIX) => {
                meta.resolution = jfif_resolution(contents);
            }
            markers::APP1 if contents.starts_with(EXIF_PREFIX) => meta.bag.push(
                MetadataEntry::new(MetadataSchema::Exif, contents[EXIF_PREFIX.len()..].to_vec()),
            ),
            markers::APP1 if contents.starts_with(XMP_PREFIX) => meta.bag.push(
                MetadataEntry::new(MetadataSchema::Xmp, contents[XMP_PREFIX.len()..].to_vec()),
            ),
            markers::APP13 if contents.starts_with(IPTC_PREFIX) => meta
                .bag
                .push(MetadataEntry::new(MetadataSchema::Iptc, contents.to_vec())),
            markers::COM => meta
                .bag
                .push(MetadataEntry::new(MetadataSchema::Comment, contents.to_vec())),
            _ => {}
        }
    }
    if let Some(icc) = jpeg.icc_profile() {
        meta.bag
            .push(MetadataEntry::new(MetadataSchema::Icc, icc.to_vec()));
    }
    meta
}

/// JFIF APP0: "JFIF\0", version (2), units (1), x density (2), y density (2).
fn jfif_resolution(contents: &[u8]) -> Option<Resolution> {
    if contents.len() < 12 {
        return None;
    }
    let x = u16::from_be_bytes([contents[8], contents[9]]) as f64;
    let y = u16::from_be_bytes([contents[10], contents[11]]) as f64;
    let per_inch = match contents[7] {
        1 => 1.0,
        2 => 2.54,
        // Aspect ratio only
        _ => return None,
    };
    (x > 0.0 && y > 0.0).then_some(Resolution {
        x: x * per_inch,
        y: y * per_inch,
    })
}

fn extract_png(png: &Png) -> ContainerMetadata {
    let mut meta = ContainerMetadata::default();
    for chunk in png.chunks() {
        let contents = chunk.contents();
        match &chunk.kind() {
            b"pHYs" => meta.resolution = phys_resolution(contents),
            b"eXIf" => meta
                .bag
                .push(MetadataEntry::new(MetadataSchema::Exif, contents.to_vec())),
            b"iTXt" => match uncompressed_xmp(contents) {
                Some(packet) => meta
                    .bag
                    .push(MetadataEntry::new(MetadataSchema::Xmp, packet.to_vec())),
                None => meta
                    .bag
                    .push(MetadataEntry::text(*b"iTXt", contents.to_vec())),
            },
            kind @ (b"tEXt" | b"zTXt") => meta
                .bag
                .push(MetadataEntry::text(*kind, contents.to_vec())),
            _ => {}
        }
    }
    if let Some(icc) = png.icc_profile() {
        meta.bag
            .push(MetadataEntry::new(MetadataSchema::Icc, icc.to_vec()));
    }
    meta
}

/// PNG pHYs: x pixels per unit (4), y pixels per unit (4), unit (1; 1 = meter).
fn phys_resolution(contents: &[u8]) -> Option<Resolution> {
    if contents.len() < 9 || contents[8] != 1 {
        return None;
    }
    let x = u32::from_be_bytes([contents[0], contents[1], contents[2], contents[3]]) as f64;
    let y = u32::from_be_bytes([contents[4], contents[5], contents[6], contents[7]]) as f64;
    (x > 0.0 && y > 0.0).then_some(Resolution {
        x: x * 0.0254,
        y: y * 0.0254,
    })
}

/// The XMP packet of an uncompressed `iTXt XML:com.adobe.xmp` chunk.
///
/// iTXt layout: keyword, NUL, compression flag, method, language tag, NUL,
/// translated keyword, NUL, text.
fn uncompressed_xmp(contents: &[u8]) -> Option<&[u8]> {
    let rest = contents.strip_prefix(XMP_KEYWORD)?.strip_prefix(b"\0")?;
    let (&flag, rest) = rest.split_first()?;
    if flag != 0 {
        return None;
    }
    let (_method, rest) = rest.split_first()?;
    let lang_end = rest.iter().position(|&b| b == 0)?;
    let rest = &rest[lang_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0)?;
    Some(&rest[translated_end + 1..])
}

fn extract_webp(webp: &WebP) -> ContainerMetadata {
    let mut meta = ContainerMetadata::default();
    if let Some(exif) = webp.exif() {
        let exif = exif.strip_prefix(EXIF_PREFIX).unwrap_or(&exif[..]).to_vec();
        meta.bag.push(MetadataEntry::new(MetadataSchema::Exif, exif));
    }
    if let Some(icc) = webp.icc_profile() {
        meta.bag
            .push(MetadataEntry::new(MetadataSchema::Icc, icc.to_vec()));
    }
    meta
}

/// Copy each frame's metadata into an encoded image.
///
/// `frames[i]` is the metadata of output frame `i`. Entries whose schema is not
/// in `supported`, or that do not fit the container, are skipped and reported as
/// warnings; the image itself is never rejected because of metadata.
pub fn copy_into(
    encoded: Vec<u8>,
    format: ImageFormat,
    supported: &[MetadataSchema],
    frames: &[MetadataBag],
) -> Result<(Vec<u8>, Vec<MetadataWarning>), BackendError> {
    let mut warnings = Vec::new();
    let mut accepted = Vec::new();

    for (frame, bag) in frames.iter().enumerate() {
        for entry in bag.entries() {
            if !supported.contains(&entry.schema) {
                warnings.push(MetadataWarning {
                    frame,
                    schema: entry.schema,
                    reason: format!("{format:?} cannot store it"),
                });
            } else if frame > 0 {
                warnings.push(MetadataWarning {
                    frame,
                    schema: entry.schema,
                    reason: format!("{format:?} stores metadata for the first frame only"),
                });
            } else {
                accepted.push(entry);
            }
        }
    }

    if accepted.is_empty() {
        return Ok((encoded, warnings));
    }

    let output = match format {
        ImageFormat::Jpeg => embed_jpeg(encoded, &accepted, &mut warnings)?,
        ImageFormat::Png => embed_png(encoded, &accepted)?,
        ImageFormat::WebP => embed_webp(encoded, &accepted)?,
        _ => encoded,
    };
    Ok((output, warnings))
}

fn prefixed(prefix: &[u8], payload: &[u8]) -> Bytes {
    let mut contents = Vec::with_capacity(prefix.len() + payload.len());
    contents.extend_from_slice(prefix);
    contents.extend_from_slice(payload);
    Bytes::from(contents)
}

fn embed_jpeg(
    encoded: Vec<u8>,
    entries: &[&MetadataEntry],
    warnings: &mut Vec<MetadataWarning>,
) -> Result<Vec<u8>, BackendError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded))
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse JPEG: {e}")))?;

    let mut segments = Vec::new();
    for entry in entries {
        let segment = match entry.schema {
            MetadataSchema::Exif => (markers::APP1, prefixed(EXIF_PREFIX, &entry.payload)),
            MetadataSchema::Xmp => (markers::APP1, prefixed(XMP_PREFIX, &entry.payload)),
            MetadataSchema::Iptc => (markers::APP13, Bytes::from(entry.payload.clone())),
            MetadataSchema::Comment => (markers::COM, Bytes::from(entry.payload.clone())),
            MetadataSchema::Icc => {
                match icc_segments(&entry.payload) {
                    Some(icc) => segments.extend(icc),
                    None => warnings.push(MetadataWarning {
                        frame: 0,
                        schema: entry.schema,
                        reason: format!(
                            "{} bytes needs more than {} APP2 segments",
                            entry.payload.len(),
                            u8::MAX
                        ),
                    }),
                }
                continue;
            }
            MetadataSchema::Text => continue,
        };
        if segment.1.len() > JPEG_SEGMENT_MAX {
            warnings.push(MetadataWarning {
                frame: 0,
                schema: entry.schema,
                reason: format!("{} bytes exceeds one JPEG segment", segment.1.len()),
            });
            continue;
        }
        segments.push(JpegSegment::new_with_contents(segment.0, segment.1));
    }

    // After the encoder's own APPn segments (JFIF), before the tables
    let insert_at = jpeg
        .segments()
        .iter()
        .take_while(|s| (markers::APP0..=markers::APP15).contains(&s.marker()))
        .count();
    jpeg.segments_mut().splice(insert_at..insert_at, segments);

    let mut output = Vec::new();
    jpeg.encoder().write_to(&mut output)?;
    Ok(output)
}

/// Split an ICC profile over as many APP2 segments as needed.
///
/// `None` when the profile needs more segments than the one-byte count allows.
fn icc_segments(profile: &[u8]) -> Option<Vec<JpegSegment>> {
    let chunks: Vec<&[u8]> = profile.chunks(JPEG_ICC_CHUNK_MAX).collect();
    let count = u8::try_from(chunks.len()).ok()?;
    let segments = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut contents = Vec::with_capacity(ICC_PREFIX.len() + 2 + chunk.len());
            contents.extend_from_slice(ICC_PREFIX);
            contents.push(i as u8 + 1);
            contents.push(count);
            contents.extend_from_slice(chunk);
            JpegSegment::new_with_contents(markers::APP2, Bytes::from(contents))
        })
        .collect();
    Some(segments)
}

fn embed_png(encoded: Vec<u8>, entries: &[&MetadataEntry]) -> Result<Vec<u8>, BackendError> {
    let mut png = Png::from_bytes(Bytes::from(encoded))
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse PNG: {e}")))?;

    let mut text_chunks = Vec::new();
    for entry in entries {
        match entry.schema {
            MetadataSchema::Exif => png.set_exif(Some(Bytes::from(entry.payload.clone()))),
            MetadataSchema::Icc => png.set_icc_profile(Some(Bytes::from(entry.payload.clone()))),
            MetadataSchema::Xmp => {
                let mut contents = Vec::with_capacity(XMP_KEYWORD.len() + 5 + entry.payload.len());
                contents.extend_from_slice(XMP_KEYWORD);
                // NUL, uncompressed, method 0, empty language, empty translation
                contents.extend_from_slice(&[0, 0, 0, 0, 0]);
                contents.extend_from_slice(&entry.payload);
                text_chunks.push(PngChunk::new(*b"iTXt", Bytes::from(contents)));
            }
            MetadataSchema::Comment => {
                text_chunks.push(PngChunk::new(*b"tEXt", prefixed(b"Comment\0", &entry.payload)));
            }
            MetadataSchema::Text => {
                let kind = entry.chunk_type.unwrap_or(*b"tEXt");
                text_chunks.push(PngChunk::new(kind, Bytes::from(entry.payload.clone())));
            }
            MetadataSchema::Iptc => {}
        }
    }

    let chunks = png.chunks_mut();
    let insert_at = chunks
        .iter()
        .position(|c| &c.kind() == b"IEND")
        .unwrap_or(chunks.len());
    chunks.splice(insert_at..insert_at, text_chunks);

    let mut output = Vec::new();
    png.encoder().write_to(&mut output)?;
    Ok(output)
}

mod vp8x_flags {
    pub const ICC: u8 = 0b0010_0000;
    pub const ALPHA: u8 = 0b0001_0000;
    pub const EXIF: u8 = 0b0000_1000;
}

fn embed_webp(encoded: Vec<u8>, entries: &[&MetadataEntry]) -> Result<Vec<u8>, BackendError> {
    let mut webp = WebP::from_bytes(Bytes::from(encoded))
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse WebP: {e}")))?;
    let (width, height) = webp
        .dimensions()
        .ok_or_else(|| BackendError::ProcessingFailed("WebP has no canvas size".into()))?;
    let alpha = webp_has_alpha(&webp);

    // EXIF first, so the ICCP chunk lands between VP8X and the bitstream
    let payload = |schema: MetadataSchema| {
        entries
            .iter()
            .find(|e| e.schema == schema)
            .map(|e| Bytes::from(e.payload.clone()))
    };
    if let Some(exif) = payload(MetadataSchema::Exif) {
        webp.set_exif(Some(exif));
    }
    if let Some(icc) = payload(MetadataSchema::Icc) {
        webp.set_icc_profile(Some(icc));
    }

    let mut flags = 0u8;
    if webp.has_chunk(CHUNK_ICCP) {
        flags |= vp8x_flags::ICC;
    }
    if alpha {
        flags |= vp8x_flags::ALPHA;
    }
    if webp.has_chunk(CHUNK_EXIF) {
        flags |= vp8x_flags::EXIF;
    }
    let mut header = Vec::with_capacity(10);
    header.extend_from_slice(&[flags, 0, 0, 0]);
    header.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
    header.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
    let vp8x = RiffChunk::new(CHUNK_VP8X, RiffContent::Data(Bytes::from(header)));

    let chunks = webp.chunks_mut();
    chunks.retain(|c| c.id() != CHUNK_VP8X);
    chunks.insert(0, vp8x);

    let mut output = Vec::new();
    webp.encoder().write_to(&mut output)?;
    Ok(output)
}

/// Alpha as declared by an existing VP8X header, an ALPH chunk or the VP8L
/// bitstream header.
fn webp_has_alpha(webp: &WebP) -> bool {
    let data = |id: [u8; 4]| webp.chunk_by_id(id).and_then(|c| c.content().data().cloned());
    if let Some(vp8x) = data(CHUNK_VP8X) {
        return vp8x.first().is_some_and(|f| f & vp8x_flags::ALPHA != 0);
    }
    if webp.has_chunk(CHUNK_ALPH) {
        return true;
    }
    // VP8L: signature byte, then 14-bit width, 14-bit height, alpha bit
    data(CHUNK_VP8L)
        .and_then(|vp8l| vp8l.get(4).copied())
        .is_some_and(|b| b & 0x10 != 0)
}

/// Add or replace the PNG pHYs chunk so physical resolution survives re-encoding.
pub fn set_png_resolution(encoded: Vec<u8>, resolution: Resolution) -> Result<Vec<u8>, BackendError> {
    let mut png = Png::from_bytes(Bytes::from(encoded))
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to parse PNG: {e}")))?;
    let to_ppm = |dpi: f64| (dpi / 0.0254).round() as u32;
    let mut contents = Vec::with_capacity(9);
    contents.extend_from_slice(&to_ppm(resolution.x).to_be_bytes());
    contents.extend_from_slice(&to_ppm(resolution.y).to_be_bytes());
    contents.push(1);

    let chunks = png.chunks_mut();
    chunks.retain(|c| &c.kind() != b"pHYs");
    // pHYs must precede the first IDAT
    let insert_at = chunks
        .iter()
        .position(|c| &c.kind() == b"IDAT")
        .unwrap_or(chunks.len());
    chunks.insert(insert_at, PngChunk::new(*b"pHYs", Bytes::from(contents)));

    let mut output = Vec::new();
    png.encoder().write_to(&mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{exif_payload, jpeg_bytes, png_bytes, webp_bytes};
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    const JPEG_SCHEMAS: &[MetadataSchema] = &[
        MetadataSchema::Exif,
        MetadataSchema::Xmp,
        MetadataSchema::Iptc,
        MetadataSchema::Icc,
        MetadataSchema::Comment,
    ];
    const PNG_SCHEMAS: &[MetadataSchema] = &[
        MetadataSchema::Exif,
        MetadataSchema::Xmp,
        MetadataSchema::Icc,
        MetadataSchema::Comment,
        MetadataSchema::Text,
    ];
    const WEBP_SCHEMAS: &[MetadataSchema] = &[MetadataSchema::Exif, MetadataSchema::Icc];

    fn sample_bag() -> MetadataBag {
        let mut bag = MetadataBag::new();
        bag.push(MetadataEntry::new(
            MetadataSchema::Exif,
            exif_payload(Some("Brice Lambson; Jane Doe"), Some(6)),
        ));
        bag.push(MetadataEntry::new(
            MetadataSchema::Xmp,
            b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>".to_vec(),
        ));
        bag.push(MetadataEntry::new(MetadataSchema::Comment, b"hello".to_vec()));
        bag
    }

    #[test]
    fn authors_split_on_semicolons() {
        let bag = sample_bag();
        assert_eq!(bag.authors(), vec!["Brice Lambson", "Jane Doe"]);
    }

    #[test]
    fn authors_empty_without_exif() {
        assert!(MetadataBag::new().authors().is_empty());
    }

    #[test]
    fn orientation_read_from_exif() {
        assert_eq!(sample_bag().orientation(), Orientation::Rotate90);
        assert_eq!(MetadataBag::new().orientation(), Orientation::Normal);
    }

    #[test]
    fn normal_orientation_copy_leaves_original_untouched() {
        let bag = sample_bag();
        let normalized = bag.with_normal_orientation();
        assert_eq!(normalized.orientation(), Orientation::Normal);
        assert_eq!(bag.orientation(), Orientation::Rotate90);
        assert_eq!(normalized.authors(), bag.authors());
    }

    #[test]
    fn cloned_bags_are_independent() {
        let original = sample_bag();
        let mut copy = original.clone();
        copy.push(MetadataEntry::new(MetadataSchema::Comment, b"extra".to_vec()));
        assert_eq!(original.len(), 3);
        assert_eq!(copy.len(), 4);
    }

    #[test]
    fn jpeg_round_trip_keeps_every_entry() {
        let bag = sample_bag();
        let (output, warnings) =
            copy_into(jpeg_bytes(16, 16), ImageFormat::Jpeg, JPEG_SCHEMAS, &[bag.clone()]).unwrap();
        assert!(warnings.is_empty());

        let extracted = extract(ImageFormat::Jpeg, &output).bag;
        assert_eq!(extracted.get(MetadataSchema::Exif), bag.get(MetadataSchema::Exif));
        assert_eq!(extracted.get(MetadataSchema::Xmp), bag.get(MetadataSchema::Xmp));
        assert_eq!(
            extracted.get(MetadataSchema::Comment),
            Some(b"hello".as_slice())
        );
        assert_eq!(extracted.authors(), vec!["Brice Lambson", "Jane Doe"]);
    }

    #[test]
    fn jpeg_icc_profile_spans_segments() {
        let profile: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let mut bag = MetadataBag::new();
        bag.push(MetadataEntry::new(MetadataSchema::Icc, profile.clone()));
        let (output, _) =
            copy_into(jpeg_bytes(8, 8), ImageFormat::Jpeg, JPEG_SCHEMAS, &[bag]).unwrap();
        let extracted = extract(ImageFormat::Jpeg, &output).bag;
        assert_eq!(extracted.get(MetadataSchema::Icc), Some(profile.as_slice()));
    }

    #[test]
    fn icc_profile_beyond_255_segments_is_a_warning() {
        let profile = vec![7u8; JPEG_ICC_CHUNK_MAX * 255 + 1];
        let mut bag = MetadataBag::new();
        bag.push(MetadataEntry::new(MetadataSchema::Icc, profile));
        bag.push(MetadataEntry::new(MetadataSchema::Comment, b"kept".to_vec()));
        let (output, warnings) =
            copy_into(jpeg_bytes(8, 8), ImageFormat::Jpeg, JPEG_SCHEMAS, &[bag]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].schema, MetadataSchema::Icc);
        let extracted = extract(ImageFormat::Jpeg, &output).bag;
        assert_eq!(extracted.get(MetadataSchema::Icc), None);
        assert_eq!(extracted.get(MetadataSchema::Comment), Some(b"kept".as_slice()));
    }

    #[test]
    fn oversized_jpeg_segment_is_a_warning() {
        let mut bag = MetadataBag::new();
        bag.push(MetadataEntry::new(MetadataSchema::Comment, vec![b'x'; 70_000]));
        let (output, warnings) =
            copy_into(jpeg_bytes(8, 8), ImageFormat::Jpeg, JPEG_SCHEMAS, &[bag]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].schema, MetadataSchema::Comment);
        assert!(extract(ImageFormat::Jpeg, &output).bag.is_empty());
    }

    #[test]
    fn png_round_trip_converts_jpeg_schemas() {
        let bag = sample_bag();
        let (output, warnings) =
            copy_into(png_bytes(8, 8), ImageFormat::Png, PNG_SCHEMAS, &[bag.clone()]).unwrap();
        assert!(warnings.is_empty());

        let extracted = extract(ImageFormat::Png, &output).bag;
        assert_eq!(extracted.get(MetadataSchema::Exif), bag.get(MetadataSchema::Exif));
        assert_eq!(extracted.get(MetadataSchema::Xmp), bag.get(MetadataSchema::Xmp));
        // The comment comes back as a tEXt chunk
        let text = extracted.get(MetadataSchema::Text).unwrap();
        assert_eq!(text, b"Comment\0hello");
    }

    #[test]
    fn webp_round_trip_keeps_exif_and_icc() {
        let mut bag = sample_bag();
        let profile: Vec<u8> = (0..600u32).map(|i| (i % 199) as u8).collect();
        bag.push(MetadataEntry::new(MetadataSchema::Icc, profile.clone()));
        let (output, warnings) =
            copy_into(webp_bytes(8, 8), ImageFormat::WebP, WEBP_SCHEMAS, &[bag.clone()]).unwrap();
        // XMP and the comment have no WebP home here
        assert_eq!(warnings.len(), 2);

        let webp = WebP::from_bytes(Bytes::from(output.clone())).unwrap();
        let ids: Vec<[u8; 4]> = webp.chunks().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![CHUNK_VP8X, CHUNK_ICCP, CHUNK_VP8L, CHUNK_EXIF]);
        let flags = webp.chunk_by_id(CHUNK_VP8X).unwrap().content().data().unwrap()[0];
        assert_eq!(flags, vp8x_flags::ICC | vp8x_flags::EXIF);

        let extracted = extract(ImageFormat::WebP, &output).bag;
        assert_eq!(extracted.get(MetadataSchema::Exif), bag.get(MetadataSchema::Exif));
        assert_eq!(extracted.get(MetadataSchema::Icc), Some(profile.as_slice()));
        assert_eq!(extracted.authors(), vec!["Brice Lambson", "Jane Doe"]);

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn webp_exif_keeps_alpha() {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 40])))
            .write_to(&mut cursor, ImageFormat::WebP)
            .unwrap();
        let mut bag = MetadataBag::new();
        bag.push(MetadataEntry::new(MetadataSchema::Exif, exif_payload(None, None)));
        let (output, _) =
            copy_into(cursor.into_inner(), ImageFormat::WebP, WEBP_SCHEMAS, &[bag]).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0)[3], 40);
        assert!(extract(ImageFormat::WebP, &output).bag.get(MetadataSchema::Exif).is_some());
    }

    #[test]
    fn unsupported_schemas_are_skipped_with_warnings() {
        let mut bag = sample_bag();
        bag.push(MetadataEntry::new(MetadataSchema::Iptc, b"Photoshop 3.0\0".to_vec()));
        let (output, warnings) =
            copy_into(png_bytes(8, 8), ImageFormat::Png, PNG_SCHEMAS, &[bag]).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].schema, MetadataSchema::Iptc);
        assert!(warnings[0].to_string().contains("IPTC"));
        assert!(extract(ImageFormat::Png, &output).bag.get(MetadataSchema::Exif).is_some());
    }

    #[test]
    fn codecs_without_metadata_warn_for_every_entry() {
        let (output, warnings) =
            copy_into(vec![1, 2, 3], ImageFormat::Gif, &[], &[sample_bag(), sample_bag()]).unwrap();
        assert_eq!(output, vec![1, 2, 3]);
        assert_eq!(warnings.len(), 6);
        assert_eq!(warnings[3].frame, 1);
    }

    #[test]
    fn jfif_density_in_dots_per_cm() {
        let mut app0 = b"JFIF\0\x01\x02".to_vec();
        app0.push(2);
        app0.extend_from_slice(&100u16.to_be_bytes());
        app0.extend_from_slice(&50u16.to_be_bytes());
        let res = jfif_resolution(&app0).unwrap();
        assert!((res.x - 254.0).abs() < 1e-9);
        assert!((res.y - 127.0).abs() < 1e-9);
    }

    #[test]
    fn jfif_aspect_only_has_no_resolution() {
        let mut app0 = b"JFIF\0\x01\x02\x00".to_vec();
        app0.extend_from_slice(&[0, 1, 0, 1]);
        assert_eq!(jfif_resolution(&app0), None);
    }

    #[test]
    fn png_resolution_round_trip() {
        let output = set_png_resolution(png_bytes(4, 4), Resolution { x: 300.0, y: 150.0 }).unwrap();
        let res = extract(ImageFormat::Png, &output).resolution.unwrap();
        assert!((res.x - 300.0).abs() < 0.05);
        assert!((res.y - 150.0).abs() < 0.05);
    }

    #[test]
    fn effective_resolution_defaults_to_96() {
        let meta = ContainerMetadata::default();
        assert_eq!(meta.effective_resolution(), Resolution { x: 96.0, y: 96.0 });
    }

    #[test]
    fn compressed_xmp_is_kept_as_text() {
        let mut itxt = XMP_KEYWORD.to_vec();
        itxt.extend_from_slice(&[0, 1, 0, 0, 0]);
        itxt.extend_from_slice(b"compressed-bytes");
        assert_eq!(uncompressed_xmp(&itxt), None);

        let mut plain = XMP_KEYWORD.to_vec();
        plain.extend_from_slice(&[0, 0, 0, b'e', b'n', 0, 0]);
        plain.extend_from_slice(b"<packet/>");
        assert_eq!(uncompressed_xmp(&plain), Some(b"<packet/>".as_slice()));
    }
}
