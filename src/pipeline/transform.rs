//! Decode, resize to a fixed width, re-encode as JPEG.

use crate::pipeline::filter::THUMBNAIL_WIDTH;
use image::{
    DynamicImage, GenericImageView, ImageError, ImageReader, ImageResult,
    codecs::jpeg::JpegEncoder,
    error::{LimitError, LimitErrorKind},
    imageops::FilterType,
};
use std::io::Cursor;

pub const JPEG_QUALITY: u8 = 80;
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Largest side a baseline JPEG can carry.
pub const MAX_JPEG_DIMENSION: u32 = u16::MAX as u32;

/// Height that keeps the source aspect ratio at `THUMBNAIL_WIDTH`.
pub fn scaled_height(width: u32, height: u32) -> u32 {
    let scaled = (height as f64 * THUMBNAIL_WIDTH as f64 / width as f64).round();
    (scaled as u32).max(1)
}

/// Render the thumbnail for an encoded source image.
///
/// The format is sniffed from the bytes, not taken from the content type.
/// Images narrower than the target are upscaled. The decoder's default
/// allocation limits bound the decode; a target height JPEG cannot encode is
/// rejected before the resize allocates anything.
pub fn render_thumbnail(source: &[u8]) -> ImageResult<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(source))
        .with_guessed_format()?
        .decode()?;

    let (width, height) = img.dimensions();
    let target_height = scaled_height(width, height);
    tracing::debug!(
        width,
        height,
        target_width = THUMBNAIL_WIDTH,
        target_height,
        "resizing image"
    );
    if target_height > MAX_JPEG_DIMENSION {
        return Err(ImageError::Limits(LimitError::from_kind(
            LimitErrorKind::DimensionError,
        )));
    }

    let resized = img.resize_exact(THUMBNAIL_WIDTH, target_height, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok(out)
}
