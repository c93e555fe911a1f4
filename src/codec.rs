use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{Result, SegError};

/// Decodes uploaded bytes into an `(H, W, 3)` RGB array.
///
/// Alpha is dropped and grayscale is expanded, so every decodable image ends
/// up with three channels.
pub fn decode_image(bytes: &[u8]) -> Result<Array3<u8>> {
    let rgb = image::load_from_memory(bytes)
        .map_err(|source| SegError::Decode { source })?
        .into_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(SegError::Decode {
            source: image::ImageError::Limits(image::error::LimitError::from_kind(
                image::error::LimitErrorKind::DimensionError,
            )),
        });
    }

    // (C, H, W) view -> (H, W, C) owned array
    let array = rgb
        .as_ndarray3()
        .permuted_axes([1, 2, 0])
        .as_standard_layout()
        .into_owned();
    Ok(array)
}

/// Gray level step between classes that spreads `num_classes` evenly over
/// 8 bits: 85 for three classes.
pub fn default_mask_scale(num_classes: usize) -> u8 {
    let classes = num_classes.max(1);
    u8::try_from(255 / classes).unwrap_or(u8::MAX).max(1)
}

/// Encodes a class mask as 8-bit grayscale PNG, each class index multiplied by
/// `scale`.
pub fn encode_mask_png(mask: ArrayView2<u8>, scale: u8) -> Result<Vec<u8>> {
    let (height, width) = mask.dim();
    let pixels: Vec<u8> = mask
        .iter()
        .map(|&class| class.saturating_mul(scale))
        .collect();

    let image = GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        SegError::processing("mask encoding", "mask buffer does not match its dimensions")
    })?;

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|source| SegError::Encode { source })?;

    Ok(buffer.into_inner())
}
