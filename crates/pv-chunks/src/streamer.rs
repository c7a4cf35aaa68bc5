//! Fixed-size chunk streaming
//!
//! Splits a byte source of known length into chunks of exactly `chunk_size`
//! bytes, except the last which holds the remainder. Chunks are read from
//! the source one at a time as the iterator is advanced; nothing is read
//! ahead, so peak memory is one chunk regardless of the source length.
//!
//! A streamer is consumed by iterating it. To make a second pass, build a
//! new streamer over a fresh reader.

use std::io::Read;

use pv_core::{PvError, PvResult};
use tracing::trace;

/// A single chunk read from the source
#[derive(Debug, Clone)]
pub struct ChunkFrame {
    /// Chunk contents
    pub bytes: Vec<u8>,
    /// Zero-based sequence index
    pub index: u32,
    /// Share of the source consumed once this chunk was read (0.0..=100.0)
    pub progress_percent: f64,
}

/// Number of chunks needed to cover `total_len` bytes: `ceil(total_len / chunk_size)`.
pub fn total_chunks(total_len: u64, chunk_size: usize) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_len.div_ceil(chunk_size as u64)
}

/// Length of the chunk at `index` for a source of `total_len` bytes.
///
/// Returns `None` when `index` is past the last chunk.
pub fn chunk_len_at(index: u64, total_len: u64, chunk_size: usize) -> Option<usize> {
    let start = index.checked_mul(chunk_size as u64)?;
    if chunk_size == 0 || start >= total_len {
        return None;
    }
    Some((total_len - start).min(chunk_size as u64) as usize)
}

/// Lazy iterator over fixed-size chunks of a `Read` source.
pub struct ChunkStreamer<R> {
    source: R,
    total_len: u64,
    chunk_size: usize,
    total_chunks: u32,
    next_index: u32,
    consumed: u64,
    failed: bool,
}

impl<R: Read> ChunkStreamer<R> {
    /// Create a streamer over `source`, which must yield exactly `total_len` bytes.
    pub fn new(source: R, total_len: u64, chunk_size: usize) -> PvResult<Self> {
        if chunk_size == 0 {
            return Err(PvError::Validation("chunk size must be > 0".into()));
        }
        let total_chunks = u32::try_from(total_chunks(total_len, chunk_size)).map_err(|_| {
            PvError::Validation(format!(
                "{total_len} bytes at chunk size {chunk_size} exceeds the chunk index range"
            ))
        })?;

        Ok(Self {
            source,
            total_len,
            chunk_size,
            total_chunks,
            next_index: 0,
            consumed: 0,
            failed: false,
        })
    }

    /// Total number of chunks this streamer yields: `ceil(N / C)`
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }
}

impl<R: Read> Iterator for ChunkStreamer<R> {
    type Item = PvResult<ChunkFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_index >= self.total_chunks {
            return None;
        }

        let len = chunk_len_at(self.next_index as u64, self.total_len, self.chunk_size)?;
        let mut bytes = vec![0u8; len];
        if let Err(e) = self.source.read_exact(&mut bytes) {
            // A short source must not surface as a truncated final chunk
            self.failed = true;
            return Some(Err(PvError::Io(e)));
        }

        let index = self.next_index;
        self.next_index += 1;
        self.consumed += len as u64;

        let progress_percent = self.consumed as f64 * 100.0 / self.total_len as f64;
        trace!(index, len, progress_percent, "chunk read");

        Some(Ok(ChunkFrame {
            bytes,
            index,
            progress_percent,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let remaining = (self.total_chunks - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}
