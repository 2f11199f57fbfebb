//! LSB-first bit stream used by the replication codec.
//!
//! ```text
//! write_bits(0b101, 3); write_bit(true);
//!
//! byte 0:  bit 0..=2 = 1,0,1   bit 3 = 1
//! ```
//!
//! Every read is bounds-checked; reading past the end yields
//! [`NetError::Overflow`] instead of panicking.

use crate::error::NetError;

/// Append-only bit buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitWriter {
    bytes: Vec<u8>,
    num_bits: usize,
}

impl BitWriter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.num_bits % 8;
        if offset == 0 {
            self.bytes.push(0);
        }
        if bit && let Some(last) = self.bytes.last_mut() {
            *last |= 1 << offset;
        }
        self.num_bits += 1;
    }

    /// Write the low `count` bits of `value`, least significant first.
    ///
    /// `count` is clamped to 32.
    pub fn write_bits(&mut self, value: u32, count: u32) {
        for i in 0..count.min(u32::BITS) {
            self.write_bit(value >> i & 1 == 1);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_bits(u32::from(byte), 8);
        }
    }

    /// Number of bits written so far.
    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Written bytes. The last byte is zero-padded.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Cursor over a bit buffer produced by [`BitWriter`].
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> BitReader<'a> {
    /// Read every bit of `data`, padding included.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len() * 8,
        }
    }

    /// Read only the first `num_bits` bits of `data`.
    pub fn with_num_bits(data: &'a [u8], num_bits: usize) -> Self {
        Self {
            data,
            pos: 0,
            end: num_bits.min(data.len() * 8),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.end
    }

    pub fn read_bit(&mut self) -> Result<bool, NetError> {
        self.ensure(1)?;
        Ok(self.take_bit())
    }

    /// Read `count` bits (at most 32) into the low bits of the result.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, NetError> {
        let count = count.min(u32::BITS);
        self.ensure(count)?;
        let mut value = 0u32;
        for i in 0..count {
            if self.take_bit() {
                value |= 1 << i;
            }
        }
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, NetError> {
        let bits = len.saturating_mul(8);
        if bits > self.remaining() {
            return Err(NetError::Overflow {
                requested: u32::try_from(bits).unwrap_or(u32::MAX),
                remaining: self.remaining(),
            });
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    fn ensure(&self, count: u32) -> Result<(), NetError> {
        if count as usize > self.remaining() {
            return Err(NetError::Overflow {
                requested: count,
                remaining: self.remaining(),
            });
        }
        Ok(())
    }

    #[inline]
    fn take_bit(&mut self) -> bool {
        let bit = self.data[self.pos / 8] >> (self.pos % 8) & 1 == 1;
        self.pos += 1;
        bit
    }
}
