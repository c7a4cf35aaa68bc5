//! Fixed-size output buffer for out-of-order chunk results
//!
//! The buffer is allocated once at its final size. Chunk `i` always lands at
//! offset `i * stride`, so results can be written in any completion order
//! and the buffer reads back in index order.

use pv_core::{PvError, PvResult};

/// Indexed arena holding `count` chunks of `stride` bytes, the last one shorter.
pub struct ChunkArena {
    buf: Vec<u8>,
    stride: usize,
    count: u32,
    filled: Vec<bool>,
    remaining: u32,
}

impl ChunkArena {
    /// `total_len` is the byte length of all chunks together.
    pub fn new(count: u32, stride: usize, total_len: usize) -> PvResult<Self> {
        let full = (count as usize).saturating_sub(1).checked_mul(stride);
        let fits = match full {
            Some(full) if count > 0 => total_len >= full && total_len - full <= stride,
            _ => count == 0 && total_len == 0,
        };
        if !fits {
            return Err(PvError::Validation(format!(
                "{total_len} bytes cannot be laid out as {count} chunks of {stride}"
            )));
        }

        Ok(Self {
            buf: vec![0u8; total_len],
            stride,
            count,
            filled: vec![false; count as usize],
            remaining: count,
        })
    }

    /// Expected byte length of chunk `index`
    pub fn expected_len(&self, index: u32) -> usize {
        if index + 1 < self.count {
            self.stride
        } else {
            self.buf.len() - (self.count as usize - 1) * self.stride
        }
    }

    /// Store chunk `index`. Each slot may be filled exactly once.
    pub fn insert(&mut self, index: u32, bytes: &[u8]) -> PvResult<()> {
        if index >= self.count {
            return Err(PvError::Dispatch(format!(
                "chunk index {index} out of range (count {})",
                self.count
            )));
        }
        if self.filled[index as usize] {
            return Err(PvError::Dispatch(format!("chunk {index} delivered twice")));
        }
        let expected = self.expected_len(index);
        if bytes.len() != expected {
            return Err(PvError::Dispatch(format!(
                "chunk {index} is {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let start = index as usize * self.stride;
        self.buf[start..start + expected].copy_from_slice(bytes);
        self.filled[index as usize] = true;
        self.remaining -= 1;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Chunks stored so far
    pub fn filled(&self) -> u32 {
        self.count - self.remaining
    }

    /// The assembled bytes, only once every slot is filled.
    pub fn into_inner(self) -> PvResult<Vec<u8>> {
        if !self.is_complete() {
            return Err(PvError::Dispatch(format!(
                "{} of {} chunks missing",
                self.remaining, self.count
            )));
        }
        Ok(self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_inserts_read_back_in_order() {
        let mut arena = ChunkArena::new(3, 4, 10).unwrap();
        arena.insert(2, b"ij").unwrap();
        arena.insert(0, b"abcd").unwrap();
        assert!(!arena.is_complete());
        arena.insert(1, b"efgh").unwrap();
        assert_eq!(arena.into_inner().unwrap(), b"abcdefghij");
    }

    #[test]
    fn rejects_wrong_length_and_duplicates() {
        let mut arena = ChunkArena::new(2, 4, 6).unwrap();
        assert!(arena.insert(0, b"abc").is_err());
        arena.insert(0, b"abcd").unwrap();
        assert!(arena.insert(0, b"abcd").is_err());
        assert!(arena.insert(2, b"xy").is_err());
        assert_eq!(arena.filled(), 1);
    }

    #[test]
    fn incomplete_arena_yields_nothing() {
        let mut arena = ChunkArena::new(2, 4, 8).unwrap();
        arena.insert(1, b"efgh").unwrap();
        assert!(matches!(arena.into_inner(), Err(PvError::Dispatch(_))));
    }

    #[test]
    fn layout_is_validated() {
        assert!(ChunkArena::new(2, 4, 9).is_err());
        assert!(ChunkArena::new(2, 4, 3).is_err());
        assert!(ChunkArena::new(1, 4, 0).is_ok());
        assert!(ChunkArena::new(0, 4, 0).is_ok());
    }
}
