//! LSB embedding and extraction
//!
//! Capacity of a `w x h` bitmap: `floor((w * h * 3 - 32) / 8)` bytes, the
//! 32 bits being the length header.

use pv_core::{PvError, PvResult};
use tracing::debug;

use crate::bits::{BitReader, BitWriter};
use crate::pixels::{PixelBuffer, COLOR_CHANNELS};

/// Bits used by the big-endian payload length header
pub const HEADER_BITS: u64 = 32;

/// Payload bytes a `width x height` bitmap can carry.
pub fn capacity(width: u32, height: u32) -> usize {
    let bits = width as u64 * height as u64 * COLOR_CHANNELS as u64;
    let payload_bits = bits.saturating_sub(HEADER_BITS);
    usize::try_from(payload_bits / 8).unwrap_or(usize::MAX)
}

/// Embed `payload` into the color LSBs of `pixels`, in place.
///
/// Fails with [`PvError::Capacity`] before touching any sample if the
/// payload does not fit. Samples past the end of the frame are left as-is.
pub fn embed(pixels: &mut PixelBuffer, payload: &[u8]) -> PvResult<()> {
    let cap = capacity(pixels.width(), pixels.height());
    let len = u32::try_from(payload.len()).ok().filter(|_| payload.len() <= cap);
    let Some(len) = len else {
        return Err(PvError::Capacity {
            needed: payload.len(),
            capacity: cap,
        });
    };

    let complete = {
        let mut writer = BitWriter::new(pixels.color_slots_mut());
        writer.write_bytes(&len.to_be_bytes()) && writer.write_bytes(payload)
    };
    if !complete {
        // Unreachable given the capacity check; kept so a bad count can never pass silently
        return Err(PvError::Capacity {
            needed: payload.len(),
            capacity: cap,
        });
    }

    debug!(
        width = pixels.width(),
        height = pixels.height(),
        payload = payload.len(),
        capacity = cap,
        "payload embedded"
    );
    Ok(())
}

/// Extract the payload previously embedded with [`embed`].
///
/// Fails with [`PvError::Corruption`] if the header declares zero bytes or
/// more than the bitmap can hold.
pub fn extract(pixels: &PixelBuffer) -> PvResult<Vec<u8>> {
    let cap = capacity(pixels.width(), pixels.height());
    let mut reader = BitReader::new(pixels.color_slots());

    let declared = reader.read_u32_be().ok_or_else(|| {
        PvError::Corruption(format!(
            "{}x{} image is too small to hold a length header",
            pixels.width(),
            pixels.height()
        ))
    })? as usize;

    if declared == 0 {
        return Err(PvError::Corruption("header declares an empty payload".into()));
    }
    if declared > cap {
        return Err(PvError::Corruption(format!(
            "header declares {declared} bytes, image holds at most {cap}"
        )));
    }

    let payload = reader
        .read_bytes(declared)
        .ok_or_else(|| PvError::Corruption("payload ends past the last pixel".into()))?;

    debug!(payload = payload.len(), capacity = cap, "payload extracted");
    Ok(payload)
}
