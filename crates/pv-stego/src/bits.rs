//! Forward-only bit cursor over sample slots
//!
//! A slot is one color sample; the cursor reads or writes its least
//! significant bit and then moves to the next slot. The cursor knows nothing
//! about pixels or channels: callers hand it an iterator that already yields
//! the usable samples in order, so a header and the payload that follows it
//! are one stream with no alignment bookkeeping.

/// Writes bits MSB-first into the LSBs of successive slots.
pub struct BitWriter<I> {
    slots: I,
    written: u64,
}

impl<'a, I> BitWriter<I>
where
    I: Iterator<Item = &'a mut u8>,
{
    pub fn new(slots: I) -> Self {
        Self { slots, written: 0 }
    }

    /// Write one bit. Returns `false` if the slots are exhausted.
    pub fn write_bit(&mut self, bit: bool) -> bool {
        match self.slots.next() {
            Some(slot) => {
                *slot = (*slot & 0xFE) | bit as u8;
                self.written += 1;
                true
            }
            None => false,
        }
    }

    /// Write a byte, most significant bit first.
    pub fn write_byte(&mut self, byte: u8) -> bool {
        (0..8).rev().all(|shift| self.write_bit((byte >> shift) & 1 == 1))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        bytes.iter().all(|&b| self.write_byte(b))
    }

    /// Bits written so far
    pub fn position(&self) -> u64 {
        self.written
    }
}

/// Reads bits MSB-first from the LSBs of successive slots.
pub struct BitReader<I> {
    slots: I,
    read: u64,
}

impl<'a, I> BitReader<I>
where
    I: Iterator<Item = &'a u8>,
{
    pub fn new(slots: I) -> Self {
        Self { slots, read: 0 }
    }

    /// Read one bit, or `None` if the slots are exhausted.
    pub fn read_bit(&mut self) -> Option<bool> {
        let slot = self.slots.next()?;
        self.read += 1;
        Some(slot & 1 == 1)
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | self.read_bit()? as u8;
        }
        Some(byte)
    }

    pub fn read_u32_be(&mut self) -> Option<u32> {
        let mut buf = [0u8; 4];
        for b in &mut buf {
            *b = self.read_byte()?;
        }
        Some(u32::from_be_bytes(buf))
    }

    /// Read `len` bytes into a fresh buffer.
    pub fn read_bytes(&mut self, len: usize) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_byte()?);
        }
        Some(out)
    }

    /// Bits read so far
    pub fn position(&self) -> u64 {
        self.read
    }
}
