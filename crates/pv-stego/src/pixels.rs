//! Owned RGBA8 bitmaps and conversion to/from encoded images
//!
//! Any format the `image` crate can decode is accepted as input and
//! normalized to RGBA8. Output is always PNG: lossy formats would destroy
//! the least significant bits that carry the payload.

use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use pv_core::{PvError, PvResult};
use tracing::debug;

/// Samples per pixel in a [`PixelBuffer`]
pub const CHANNELS: usize = 4;

/// Color samples per pixel usable for embedding (R, G, B)
pub const COLOR_CHANNELS: usize = 3;

/// A decoded bitmap: `width * height` pixels, 4 samples each (R, G, B, A),
/// rows top to bottom, pixels left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA8 samples. The sample count must be `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, samples: Vec<u8>) -> PvResult<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if samples.len() != expected {
            return Err(PvError::Image(format!(
                "{width}x{height} RGBA bitmap needs {expected} samples, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Color samples in embedding order: raster order, R then G then B, alpha skipped.
    pub fn color_slots(&self) -> impl Iterator<Item = &u8> {
        self.samples
            .chunks_exact(CHANNELS)
            .flat_map(|px| px[..COLOR_CHANNELS].iter())
    }

    /// Mutable color samples in embedding order.
    pub fn color_slots_mut(&mut self) -> impl Iterator<Item = &mut u8> {
        self.samples
            .chunks_exact_mut(CHANNELS)
            .flat_map(|px| px[..COLOR_CHANNELS].iter_mut())
    }
}

impl From<DynamicImage> for PixelBuffer {
    fn from(image: DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            samples: rgba.into_raw(),
        }
    }
}

/// Decode an encoded image (PNG, BMP, JPEG, ...) into an RGBA8 bitmap.
pub fn decode_image(bytes: &[u8]) -> PvResult<PixelBuffer> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PvError::Image(format!("decoding image: {e}")))?;
    if image.color().channel_count() < COLOR_CHANNELS as u8 {
        debug!(color = ?image.color(), "expanding image to RGBA");
    }
    Ok(PixelBuffer::from(image))
}

/// Encode a bitmap as PNG straight from its samples. Sample values are
/// preserved exactly.
pub fn encode_png(pixels: &PixelBuffer) -> PvResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            pixels.samples(),
            pixels.width(),
            pixels.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| PvError::Image(format!("encoding PNG: {e}")))?;
    Ok(out)
}

/// Read and decode an image file.
pub fn open_image(path: &Path) -> PvResult<PixelBuffer> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}
