//! Bounded little-endian byte reader shared by the capture decoders

use crate::error::{Error, Result};

/// Byte reader over a capture's data region
///
/// Every read is charged against a byte budget taken from the capture's
/// declared length. Reads fail softly (`None`) once either the budget or the
/// underlying data runs out, which is how the decoders detect end of stream.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    budget: u64,
}

impl<'a> ByteReader<'a> {
    /// Create a reader starting at `start` that may consume at most `budget` bytes
    pub fn new(data: &'a [u8], start: usize, budget: u64) -> Self {
        let available = data.len().saturating_sub(start) as u64;
        Self {
            data,
            pos: start.min(data.len()),
            budget: budget.min(available),
        }
    }

    /// Bytes still allowed to be read
    pub fn remaining(&self) -> u64 {
        self.budget
    }

    /// Check whether the budget is exhausted
    pub fn is_exhausted(&self) -> bool {
        self.budget == 0
    }

    /// Read a single byte
    pub fn read_u8(&mut self) -> Option<u8> {
        self.budget = self.budget.checked_sub(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Some(b)
    }

    /// Read a 16-bit little-endian value
    pub fn read_u16_le(&mut self) -> Option<u16> {
        if self.budget < 2 {
            self.budget = 0;
            return None;
        }
        let lo = self.read_u8()? as u16;
        let hi = self.read_u8()? as u16;
        Some(lo | (hi << 8))
    }

    /// Read `N` bytes at once, or nothing if fewer than `N` remain
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.budget < N as u64 {
            self.budget = 0;
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        self.budget -= N as u64;
        Some(out)
    }
}

/// Read a u16 at a specific header offset
pub fn peek_u16_at(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset..offset + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(Error::Capture(format!(
            "Header field at 0x{:02X} is past the end of the file",
            offset
        ))),
    }
}

/// Read a u32 at a specific header offset
pub fn peek_u32_at(data: &[u8], offset: usize) -> Result<u32> {
    match data.get(offset..offset + 4) {
        Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(Error::Capture(format!(
            "Header field at 0x{:02X} is past the end of the file",
            offset
        ))),
    }
}

/// Read a u8 at a specific header offset
pub fn peek_u8_at(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset).copied().ok_or_else(|| {
        Error::Capture(format!(
            "Header field at 0x{:02X} is past the end of the file",
            offset
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_limits_reads() {
        let data = [1, 2, 3, 4, 5];
        let mut reader = ByteReader::new(&data, 1, 2);
        assert_eq!(reader.read_u8(), Some(2));
        assert_eq!(reader.read_u8(), Some(3));
        assert_eq!(reader.read_u8(), None);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_budget_clamped_to_data() {
        let data = [0x34, 0x12];
        let mut reader = ByteReader::new(&data, 0, u64::MAX);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.read_u16_le(), Some(0x1234));
        assert_eq!(reader.read_u16_le(), None);
    }

    #[test]
    fn test_partial_array_read_fails() {
        let data = [1, 2, 3];
        let mut reader = ByteReader::new(&data, 0, 3);
        assert_eq!(reader.read_array::<4>(), None);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_peek_out_of_bounds() {
        let data = [0u8; 6];
        assert_eq!(peek_u32_at(&data, 2).unwrap(), 0);
        assert!(peek_u32_at(&data, 3).is_err());
        assert!(peek_u16_at(&data, 5).is_err());
        assert!(peek_u8_at(&data, 6).is_err());
    }
}
