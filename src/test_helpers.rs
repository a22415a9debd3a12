//! Shared test utilities: in-memory fixture images.
//!
//! Every fixture is generated, so tests never depend on files checked into the
//! repository. Only external crates are used here: the integration tests
//! include this file as a module too.
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let source = write_fixture(tmp.path(), "Test.jpg", &jpeg_with_exif(128, 96, Some("Brice Lambson"), None));
//! ```

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::codecs::gif::{GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::{Delay, DynamicImage, Frame, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::Bytes;
use tiff::encoder::{TiffEncoder, colortype};
use std::io::Cursor;
use std::path::{Path, PathBuf};

// =========================================================================
// Pixels
// =========================================================================

/// Smooth gradient so encoders have something non-trivial to work with.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

// =========================================================================
// Encoded fixtures
// =========================================================================

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&gradient(width, height))
        .unwrap();
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(gradient(width, height))
        .write_to(&mut cursor, ImageFormat::Png)
        .unwrap();
    cursor.into_inner()
}

/// TIFF-structured EXIF block (no `Exif\0\0` prefix) with 72 dpi resolution,
/// plus an optional Artist and Orientation.
pub fn exif_payload(artist: Option<&str>, orientation: Option<u16>) -> Vec<u8> {
    let resolution = |tag| Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(vec![Rational { num: 72, denom: 1 }]),
    };
    let mut fields = vec![
        resolution(Tag::XResolution),
        resolution(Tag::YResolution),
        Field {
            tag: Tag::ResolutionUnit,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![2]),
        },
    ];
    if let Some(artist) = artist {
        fields.push(Field {
            tag: Tag::Artist,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![artist.as_bytes().to_vec()]),
        });
    }
    if let Some(orientation) = orientation {
        fields.push(Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![orientation]),
        });
    }

    let mut writer = Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    let mut cursor = Cursor::new(Vec::new());
    writer.write(&mut cursor, false).unwrap();
    cursor.into_inner()
}

/// A JPEG carrying an EXIF block built by [`exif_payload`].
pub fn jpeg_with_exif(
    width: u32,
    height: u32,
    artist: Option<&str>,
    orientation: Option<u16>,
) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_bytes(width, height))).unwrap();
    let mut app1 = b"Exif\0\0".to_vec();
    app1.extend_from_slice(&exif_payload(artist, orientation));
    // Right after the encoder's JFIF APP0
    jpeg.segments_mut()
        .insert(1, JpegSegment::new_with_contents(0xE1, Bytes::from(app1)));
    let mut buf = Vec::new();
    jpeg.encoder().write_to(&mut buf).unwrap();
    buf
}

/// Lossless WebP of [`gradient`].
pub fn webp_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(gradient(width, height))
        .write_to(&mut cursor, ImageFormat::WebP)
        .unwrap();
    cursor.into_inner()
}

/// Multi-page RGB TIFF, one [`gradient`] per page.
pub fn tiff_pages(width: u32, height: u32, pages: usize) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).unwrap();
        for _ in 0..pages {
            encoder
                .write_image::<colortype::RGB8>(width, height, gradient(width, height).as_raw())
                .unwrap();
        }
    }
    cursor.into_inner()
}

/// Number of pages (IFDs) in a TIFF.
pub fn tiff_page_count(data: &[u8]) -> usize {
    let mut decoder = tiff::decoder::Decoder::new(Cursor::new(data)).unwrap();
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages += 1;
    }
    pages
}

/// Looping GIF whose frames alternate between two solid colors.
pub fn animated_gif_bytes(width: u32, height: u32, frames: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = (0..frames).map(|i| {
            let color = if i % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            };
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, color),
                0,
                0,
                Delay::from_numer_denom_ms(50, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }
    buf
}

// =========================================================================
// Filesystem
// =========================================================================

/// Write `bytes` to `dir/name` and return the path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
