//! Pure Rust codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::ImageReader::with_guessed_format` |
//! | Decode (single frame) | `image` decoders (JPEG, PNG, TIFF, WebP, GIF, BMP) |
//! | Decode (animation) | `image::AnimationDecoder` for GIF, APNG and animated WebP |
//! | Decode (pages) | `tiff::decoder::Decoder`, one IFD per frame |
//! | Metadata + resolution | `img-parts` containers, `kamadak-exif` fields |
//! | Encode (single frame) | `JpegEncoder` with pixel density, `DynamicImage::write_to` otherwise |
//! | Encode (animation) | `GifEncoder::encode_frames` |
//! | Encode (pages) | `tiff::encoder::TiffEncoder`, one `write_image` per frame |
//!
//! Writability is whatever `ImageFormat::writing_enabled()` reports for the
//! compiled-in features; GIF and TIFF can be written with more than one frame.

use super::backend::{BackendError, Capabilities, DecodedFrame, DecodedImage, ImageBackend};
use super::metadata::{self, MetadataBag, MetadataSchema};
use super::params::EncodeOptions;
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::{JpegEncoder, PixelDensity, PixelDensityUnit};
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{
    AnimationDecoder, Delay, DynamicImage, ImageBuffer, ImageError, ImageFormat, ImageReader,
};
use std::io::Cursor;
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::{ColorType as TiffColor, TiffError};

const JPEG_METADATA: &[MetadataSchema] = &[
    MetadataSchema::Exif,
    MetadataSchema::Xmp,
    MetadataSchema::Iptc,
    MetadataSchema::Icc,
    MetadataSchema::Comment,
];

const PNG_METADATA: &[MetadataSchema] = &[
    MetadataSchema::Exif,
    MetadataSchema::Xmp,
    MetadataSchema::Icc,
    MetadataSchema::Comment,
    MetadataSchema::Text,
];

const WEBP_METADATA: &[MetadataSchema] = &[MetadataSchema::Exif, MetadataSchema::Icc];

/// Frame delay used when an animated output frame has none (10 fps).
const DEFAULT_DELAY_MS: u32 = 100;

/// Backend over the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(e: ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

fn encode_error(format: ImageFormat) -> impl Fn(ImageError) -> BackendError {
    move |e| BackendError::ProcessingFailed(format!("{format:?} encode failed: {e}"))
}

/// Collect every frame of an animation as (pixels, delay).
fn animation_frames<'a>(
    decoder: impl AnimationDecoder<'a>,
) -> Result<Vec<(DynamicImage, Option<Delay>)>, BackendError> {
    let frames = decoder.into_frames().collect_frames().map_err(decode_error)?;
    Ok(frames
        .into_iter()
        .map(|frame| {
            let delay = frame.delay();
            (DynamicImage::ImageRgba8(frame.into_buffer()), Some(delay))
        })
        .collect())
}

fn single_frame(
    data: &[u8],
    format: ImageFormat,
) -> Result<Vec<(DynamicImage, Option<Delay>)>, BackendError> {
    let img = ImageReader::with_format(Cursor::new(data), format)
        .decode()
        .map_err(decode_error)?;
    Ok(vec![(img, None)])
}

fn tiff_decode_error(e: TiffError) -> BackendError {
    BackendError::Decode(format!("TIFF: {e}"))
}

fn tiff_encode_error(e: TiffError) -> BackendError {
    BackendError::ProcessingFailed(format!("Tiff encode failed: {e}"))
}

/// Every page of a TIFF. A single page goes through `image` so every layout
/// it understands stays readable.
fn tiff_frames(data: &[u8]) -> Result<Vec<(DynamicImage, Option<Delay>)>, BackendError> {
    let mut decoder = TiffDecoder::new(Cursor::new(data)).map_err(tiff_decode_error)?;
    if !decoder.more_images() {
        return single_frame(data, ImageFormat::Tiff);
    }
    let mut frames = vec![(tiff_page(&mut decoder)?, None)];
    while decoder.more_images() {
        decoder.next_image().map_err(tiff_decode_error)?;
        frames.push((tiff_page(&mut decoder)?, None));
    }
    Ok(frames)
}

fn tiff_page(decoder: &mut TiffDecoder<Cursor<&[u8]>>) -> Result<DynamicImage, BackendError> {
    let (width, height) = decoder.dimensions().map_err(tiff_decode_error)?;
    let color = decoder.colortype().map_err(tiff_decode_error)?;
    let pixels = decoder.read_image().map_err(tiff_decode_error)?;
    let image = match (color, pixels) {
        (TiffColor::Gray(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
        }
        (TiffColor::GrayA(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
        }
        (TiffColor::RGB(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
        }
        (TiffColor::RGBA(8), DecodingResult::U8(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        }
        (TiffColor::Gray(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma16)
        }
        (TiffColor::GrayA(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA16)
        }
        (TiffColor::RGB(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb16)
        }
        (TiffColor::RGBA(16), DecodingResult::U16(buf)) => {
            ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba16)
        }
        (color, _) => {
            return Err(BackendError::Decode(format!(
                "unsupported TIFF page layout {color:?}"
            )));
        }
    };
    image.ok_or_else(|| BackendError::Decode("TIFF page is shorter than its dimensions".into()))
}

fn decode_pixels(
    data: &[u8],
    format: ImageFormat,
) -> Result<Vec<(DynamicImage, Option<Delay>)>, BackendError> {
    match format {
        ImageFormat::Gif => {
            animation_frames(GifDecoder::new(Cursor::new(data)).map_err(decode_error)?)
        }
        ImageFormat::Png => {
            let decoder = PngDecoder::new(Cursor::new(data)).map_err(decode_error)?;
            if decoder.is_apng().map_err(decode_error)? {
                animation_frames(decoder.apng().map_err(decode_error)?)
            } else {
                single_frame(data, format)
            }
        }
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(Cursor::new(data)).map_err(decode_error)?;
            if decoder.has_animation() {
                animation_frames(decoder)
            } else {
                single_frame(data, format)
            }
        }
        ImageFormat::Tiff => tiff_frames(data),
        _ => single_frame(data, format),
    }
}

/// Drop to 8 bits per channel for encoders that only take 8-bit input.
fn to_8bit(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => img.clone(),
        _ if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

fn encode_jpeg(img: &DynamicImage, options: &EncodeOptions) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, options.quality.value() as u8);
    encoder.set_pixel_density(PixelDensity {
        density: (
            options.resolution.x.round().clamp(1.0, u16::MAX as f64) as u16,
            options.resolution.y.round().clamp(1.0, u16::MAX as f64) as u16,
        ),
        unit: PixelDensityUnit::Inches,
    });
    // JPEG has no alpha channel
    let result = if img.color().has_color() {
        encoder.encode_image(&img.to_rgb8())
    } else {
        encoder.encode_image(&img.to_luma8())
    };
    result.map_err(encode_error(ImageFormat::Jpeg))?;
    Ok(buf)
}

fn encode_gif(frames: &[DecodedFrame]) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(encode_error(ImageFormat::Gif))?;
        let frames = frames.iter().map(|frame| {
            let delay = frame
                .delay
                .unwrap_or_else(|| Delay::from_numer_denom_ms(DEFAULT_DELAY_MS, 1));
            image::Frame::from_parts(frame.pixels.to_rgba8(), 0, 0, delay)
        });
        encoder
            .encode_frames(frames)
            .map_err(encode_error(ImageFormat::Gif))?;
        // Dropping the encoder writes the GIF trailer
    }
    Ok(buf)
}

fn encode_tiff(frames: &[DecodedFrame]) -> Result<Vec<u8>, BackendError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).map_err(tiff_encode_error)?;
        for frame in frames {
            let (w, h) = (frame.pixels.width(), frame.pixels.height());
            let written = match &frame.pixels {
                DynamicImage::ImageLuma8(buf) => {
                    encoder.write_image::<colortype::Gray8>(w, h, buf.as_raw())
                }
                DynamicImage::ImageLuma16(buf) => {
                    encoder.write_image::<colortype::Gray16>(w, h, buf.as_raw())
                }
                DynamicImage::ImageRgb16(buf) => {
                    encoder.write_image::<colortype::RGB16>(w, h, buf.as_raw())
                }
                DynamicImage::ImageRgba16(buf) => {
                    encoder.write_image::<colortype::RGBA16>(w, h, buf.as_raw())
                }
                img if img.color().has_alpha() => {
                    encoder.write_image::<colortype::RGBA8>(w, h, img.to_rgba8().as_raw())
                }
                img => encoder.write_image::<colortype::RGB8>(w, h, img.to_rgb8().as_raw()),
            };
            written.map_err(tiff_encode_error)?;
        }
    }
    Ok(cursor.into_inner())
}

fn encode_generic(
    img: &DynamicImage,
    format: ImageFormat,
    options: &EncodeOptions,
) -> Result<Vec<u8>, BackendError> {
    let mut cursor = Cursor::new(Vec::new());
    let img = match format {
        ImageFormat::Png => img.clone(),
        _ => to_8bit(img),
    };
    img.write_to(&mut cursor, format)
        .map_err(encode_error(format))?;
    let buf = cursor.into_inner();
    if format == ImageFormat::Png {
        return metadata::set_png_resolution(buf, options.resolution);
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, data: &[u8]) -> Result<DecodedImage, BackendError> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        let format = reader
            .format()
            .ok_or_else(|| BackendError::Decode("unrecognized image format".into()))?;
        if !format.reading_enabled() {
            return Err(BackendError::Decode(format!("no decoder for {format:?}")));
        }

        let container = metadata::extract(format, data);
        let resolution = container.effective_resolution();
        let frames = decode_pixels(data, format)?
            .into_iter()
            .enumerate()
            .map(|(index, (pixels, delay))| DecodedFrame {
                pixels,
                resolution,
                delay,
                // Container-level metadata belongs to the first frame
                metadata: if index == 0 {
                    container.bag.clone()
                } else {
                    MetadataBag::new()
                },
            })
            .collect::<Vec<_>>();

        if frames.is_empty() {
            return Err(BackendError::Decode("image has no frames".into()));
        }
        Ok(DecodedImage { format, frames })
    }

    fn capabilities(&self, format: ImageFormat) -> Capabilities {
        let writable = format.writing_enabled();
        Capabilities {
            writable,
            multi_frame: writable && matches!(format, ImageFormat::Gif | ImageFormat::Tiff),
            metadata: match format {
                ImageFormat::Jpeg => JPEG_METADATA,
                ImageFormat::Png => PNG_METADATA,
                ImageFormat::WebP => WEBP_METADATA,
                _ => &[],
            },
        }
    }

    fn encode(
        &self,
        frames: &[DecodedFrame],
        format: ImageFormat,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let Some(first) = frames.first() else {
            return Err(BackendError::ProcessingFailed("no frames to encode".into()));
        };
        if frames.len() > 1 && !self.capabilities(format).multi_frame {
            return Err(BackendError::ProcessingFailed(format!(
                "{format:?} cannot hold {} frames",
                frames.len()
            )));
        }
        match format {
            ImageFormat::Jpeg => encode_jpeg(&first.pixels, options),
            ImageFormat::Gif => encode_gif(frames),
            ImageFormat::Tiff => encode_tiff(frames),
            _ => encode_generic(&first.pixels, format, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::metadata::Resolution;
    use crate::test_helpers::{
        animated_gif_bytes, exif_payload, jpeg_bytes, jpeg_with_exif, png_bytes, tiff_page_count,
        tiff_pages,
    };

    fn read_resolution(format: ImageFormat, data: &[u8]) -> Resolution {
        metadata::extract(format, data).effective_resolution()
    }

    #[test]
    fn decode_jpeg_single_frame_with_metadata() {
        let data = jpeg_with_exif(40, 30, Some("Brice Lambson"), None);
        let decoded = RustBackend::new().decode(&data).unwrap();
        assert_eq!(decoded.format, ImageFormat::Jpeg);
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.dimensions(), (40, 30));
        assert_eq!(decoded.frames[0].metadata.authors(), vec!["Brice Lambson"]);
        assert!(decoded.frames[0].delay.is_none());
    }

    #[test]
    fn decode_animated_gif_keeps_every_frame() {
        let data = animated_gif_bytes(20, 10, 3);
        let decoded = RustBackend::new().decode(&data).unwrap();
        assert_eq!(decoded.format, ImageFormat::Gif);
        assert_eq!(decoded.frames.len(), 3);
        for frame in &decoded.frames {
            assert_eq!((frame.pixels.width(), frame.pixels.height()), (20, 10));
            assert!(frame.delay.is_some());
        }
    }

    #[test]
    fn decode_garbage_is_a_decode_error() {
        let result = RustBackend::new().decode(b"definitely not an image");
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn common_formats_are_writable() {
        let backend = RustBackend::new();
        for format in [
            ImageFormat::Jpeg,
            ImageFormat::Png,
            ImageFormat::Gif,
            ImageFormat::Bmp,
            ImageFormat::Tiff,
        ] {
            assert!(backend.capabilities(format).writable, "{format:?}");
        }
        assert!(backend.capabilities(ImageFormat::Gif).multi_frame);
        assert!(backend.capabilities(ImageFormat::Tiff).multi_frame);
        assert!(!backend.capabilities(ImageFormat::Png).multi_frame);
        assert!(backend.capabilities(ImageFormat::Bmp).metadata.is_empty());
        assert_eq!(
            backend.capabilities(ImageFormat::WebP).metadata,
            &[MetadataSchema::Exif, MetadataSchema::Icc]
        );
    }

    #[test]
    fn encode_jpeg_records_resolution() {
        let backend = RustBackend::new();
        let mut decoded = backend.decode(&png_bytes(10, 10)).unwrap();
        decoded.frames[0].resolution = Resolution { x: 300.0, y: 300.0 };
        let options = EncodeOptions {
            resolution: Resolution { x: 300.0, y: 300.0 },
            ..EncodeOptions::default()
        };
        let out = backend.encode(&decoded.frames, ImageFormat::Jpeg, &options).unwrap();
        let res = read_resolution(ImageFormat::Jpeg, &out);
        assert_eq!(res, Resolution { x: 300.0, y: 300.0 });
    }

    #[test]
    fn encode_png_records_resolution() {
        let backend = RustBackend::new();
        let decoded = backend.decode(&jpeg_bytes(10, 10)).unwrap();
        let options = EncodeOptions {
            resolution: Resolution { x: 72.0, y: 72.0 },
            ..EncodeOptions::default()
        };
        let out = backend.encode(&decoded.frames, ImageFormat::Png, &options).unwrap();
        let res = read_resolution(ImageFormat::Png, &out);
        assert!((res.x - 72.0).abs() < 0.05);
    }

    #[test]
    fn encode_gif_round_trips_frame_count() {
        let backend = RustBackend::new();
        let decoded = backend.decode(&animated_gif_bytes(8, 8, 4)).unwrap();
        let out = backend
            .encode(&decoded.frames, ImageFormat::Gif, &EncodeOptions::default())
            .unwrap();
        assert_eq!(backend.decode(&out).unwrap().frames.len(), 4);
    }

    #[test]
    fn decode_tiff_keeps_every_page() {
        let decoded = RustBackend::new().decode(&tiff_pages(24, 12, 3)).unwrap();
        assert_eq!(decoded.format, ImageFormat::Tiff);
        assert_eq!(decoded.frames.len(), 3);
        for frame in &decoded.frames {
            assert_eq!((frame.pixels.width(), frame.pixels.height()), (24, 12));
        }
    }

    #[test]
    fn encode_tiff_writes_one_page_per_frame() {
        let backend = RustBackend::new();
        let decoded = backend.decode(&tiff_pages(10, 8, 2)).unwrap();
        let out = backend
            .encode(&decoded.frames, ImageFormat::Tiff, &EncodeOptions::default())
            .unwrap();
        assert_eq!(tiff_page_count(&out), 2);
        assert_eq!(backend.decode(&out).unwrap().dimensions(), (10, 8));
    }

    #[test]
    fn single_page_tiff_decodes_through_image() {
        let decoded = RustBackend::new().decode(&tiff_pages(5, 4, 1)).unwrap();
        assert_eq!(decoded.frames.len(), 1);
        assert_eq!(decoded.dimensions(), (5, 4));
    }

    #[test]
    fn encode_refuses_multiple_frames_for_single_frame_codec() {
        let backend = RustBackend::new();
        let decoded = backend.decode(&animated_gif_bytes(8, 8, 2)).unwrap();
        let result = backend.encode(&decoded.frames, ImageFormat::Png, &EncodeOptions::default());
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn encode_rgba_as_jpeg_drops_alpha() {
        let backend = RustBackend::new();
        let frame = DecodedFrame {
            pixels: DynamicImage::new_rgba8(6, 4),
            resolution: Resolution::default(),
            delay: None,
            metadata: MetadataBag::new(),
        };
        let out = backend
            .encode(&[frame], ImageFormat::Jpeg, &EncodeOptions::default())
            .unwrap();
        assert_eq!(backend.decode(&out).unwrap().dimensions(), (6, 4));
    }

    #[test]
    fn exif_resolution_used_when_container_has_none() {
        // PNG without pHYs but with EXIF resolution falls back to EXIF
        let mut bag = MetadataBag::new();
        bag.push(metadata::MetadataEntry::new(
            MetadataSchema::Exif,
            exif_payload(None, None),
        ));
        let (png, _) = metadata::copy_into(
            png_bytes(4, 4),
            ImageFormat::Png,
            PNG_METADATA,
            &[bag],
        )
        .unwrap();
        // exif_payload always records 72 dpi
        let res = read_resolution(ImageFormat::Png, &png);
        assert_eq!(res, Resolution { x: 72.0, y: 72.0 });
    }
}
