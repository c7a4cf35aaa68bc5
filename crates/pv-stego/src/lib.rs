//! pv-stego: LSB steganography for raster images
//!
//! Hides a byte buffer in the least significant bit of the red, green and
//! blue samples of an RGBA8 bitmap (alpha is never touched).
//!
//! Frame: `[32-bit big-endian length][payload]`, MSB first per byte, one bit
//! per color sample, pixels in raster order. The frame is a single
//! continuous bitstream: it is not realigned at pixel or channel boundaries.
//!
//! - `bits`: forward-only bit cursor over a sequence of sample slots
//! - `pixels`: owned RGBA8 bitmap, decode from / encode to image files
//! - `lsb`: capacity arithmetic, embed, extract

pub mod bits;
pub mod lsb;
pub mod pixels;

pub use lsb::{capacity, embed, extract, HEADER_BITS};
pub use pixels::{decode_image, encode_png, open_image, PixelBuffer};
