//! Image transcode pipeline: probe, decode, downscale and re-encode as JPEG.

use std::io::Cursor;

use bytes::Bytes;
use image::{GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};
use imagesize::ImageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to inspect image: {0}")]
    Probe(String),
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Shrink the source image to fit within `max_width` x `max_height` and
/// re-encode it as JPEG at the given quality. Images already within bounds
/// are re-encoded without resizing; upscaling never happens.
pub fn bounded_jpeg(
    bytes: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> Result<Bytes, TranscodeError> {
    // Header probe rejects non-image payloads before the expensive decode.
    probe(bytes)?;

    let decoded = image::load_from_memory(bytes).map_err(TranscodeError::Decode)?;
    let (width, height) = decoded.dimensions();

    let resized = match target_dimensions(width, height, max_width, max_height) {
        Some((target_width, target_height)) => {
            decoded.resize_exact(target_width, target_height, FilterType::Triangle)
        }
        None => decoded,
    };

    // JPEG carries no alpha channel, so flatten before encoding.
    let rgb = resized.to_rgb8();
    let mut output = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut output, quality);
    rgb.write_with_encoder(encoder)
        .map_err(TranscodeError::Encode)?;

    Ok(Bytes::from(output.into_inner()))
}

fn probe(bytes: &[u8]) -> Result<(), TranscodeError> {
    match imagesize::blob_size(bytes) {
        Ok(_) => Ok(()),
        Err(ImageError::NotSupported) => {
            Err(TranscodeError::Probe("unsupported format".to_string()))
        }
        Err(ImageError::CorruptedImage) => {
            Err(TranscodeError::Probe("corrupted image".to_string()))
        }
        Err(ImageError::IoError(err)) => Err(TranscodeError::Probe(err.to_string())),
    }
}

/// Compute the dimensions an image should shrink to, preserving aspect ratio.
/// Returns `None` when the image already fits within the bounds.
pub fn target_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return None;
    }

    let width_ratio = f64::from(max_width) / f64::from(width);
    let height_ratio = f64::from(max_height) / f64::from(height);
    let ratio = width_ratio.min(height_ratio);

    let target_width = (f64::from(width) * ratio).round().max(1.0) as u32;
    let target_height = (f64::from(height) * ratio).round().max(1.0) as u32;
    Some((target_width, target_height))
}
