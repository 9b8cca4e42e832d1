//! Bit-addressed byte buffer.
//!
//! Every message in the game protocol is a tightly packed bit stream: a
//! 1-bit protocol selector, a 4- or 6-bit tag, then fields of arbitrary
//! width (3, 9, 10, 22 bits...). [`Buffer`] is the one primitive the rest of
//! the crate builds on. It keeps two independent cursors, one for writing
//! and one for reading, both counted in bits and both most-significant-bit
//! first.
//!
//! ```text
//! byte 0          byte 1
//! 7 6 5 4 3 2 1 0 7 6 5 4 3 2 1 0   <- bit within byte
//! 0 1 2 3 4 5 6 7 8 9 ...           <- stream offset
//! ```
//!
//! Buffers never grow. Outbound messages compute their size up front with
//! [`bits_to_bytes`]; inbound buffers wrap the received frame as is.

use crate::ProtocolError;

/// Placeholder substituted by [`Buffer::read_str`] for unreadable or
/// unpaired UTF-16 code units.
pub const PLACEHOLDER: char = '?';

/// Widest field a single read or write may cover.
pub const MAX_FIELD_BITS: u32 = 32;

/// Returns the number of bytes needed to hold `bits` bits (rounded up).
pub fn bits_to_bytes(bits: usize) -> usize {
    bits / 8 + usize::from(bits % 8 > 0)
}

/// Returns the number of UTF-16 code units `s` occupies on the wire.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// A fixed-size byte buffer with bit-granular read and write cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
    write_offset: usize,
    read_offset: usize,
}

impl Buffer {
    /// Creates a zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            write_offset: 0,
            read_offset: 0,
        }
    }

    /// Creates a zero-filled buffer large enough for `bits` bits.
    pub fn with_bits(bits: usize) -> Self {
        Self::new(bits_to_bytes(bits))
    }

    /// Wraps received bytes for decoding. Both cursors start at 0.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            write_offset: 0,
            read_offset: 0,
        }
    }

    /// Length of the backing storage in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length of the backing storage in bits.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Moves the read cursor. Callers use this to rewind after peeking at
    /// a field, or to reinterpret a frame from the start.
    pub fn set_read_offset(&mut self, offset: usize) {
        self.read_offset = offset;
    }

    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    pub fn set_write_offset(&mut self, offset: usize) {
        self.write_offset = offset;
    }

    /// Bits left between the read cursor and the end of the buffer.
    pub fn remaining_bits(&self) -> usize {
        self.bit_len().saturating_sub(self.read_offset)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn check_span(&self, offset: usize, count: u32) -> Result<(), ProtocolError> {
        if count > MAX_FIELD_BITS {
            return Err(ProtocolError::InvalidBitCount(count));
        }
        let fits = offset
            .checked_add(count as usize)
            .is_some_and(|end| end <= self.bit_len());
        if !fits {
            return Err(ProtocolError::BufferOverrun {
                offset,
                requested: count,
                capacity: self.bit_len(),
            });
        }
        Ok(())
    }

    /// Writes the low `count` bits of `value`, most significant first.
    ///
    /// Bits are OR-ed into whatever the buffer already holds; nothing is
    /// ever cleared. Bits of `value` above `count` are not written.
    pub fn write_bits(&mut self, count: u32, value: u32) -> Result<(), ProtocolError> {
        self.check_span(self.write_offset, count)?;
        let start = self.write_offset;
        for i in 0..count as usize {
            let bit = (value >> (count as usize - 1 - i)) & 1;
            let pos = start + i;
            self.bytes[pos / 8] |= (bit as u8) << (7 - pos % 8);
        }
        self.write_offset += count as usize;
        Ok(())
    }

    /// Reads `count` bits, most significant first, and advances the read
    /// cursor. On overrun the cursor is left where it was.
    pub fn decode_bits(&mut self, count: u32) -> Result<u32, ProtocolError> {
        self.check_span(self.read_offset, count)?;
        let start = self.read_offset;
        let mut result: u32 = 0;
        for pos in start..start + count as usize {
            let bit = (self.bytes[pos / 8] >> (7 - pos % 8)) & 1;
            result = (result << 1) | u32::from(bit);
        }
        self.read_offset += count as usize;
        Ok(result)
    }

    /// Reads a single bit as a flag.
    pub fn decode_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.decode_bits(1)? == 1)
    }

    /// Reads a field of up to 64 bits whose width comes off the wire.
    ///
    /// Wider fields are read as two halves. On error the cursor is left
    /// where it was.
    pub fn decode_wide(&mut self, count: u32) -> Result<u64, ProtocolError> {
        if count <= MAX_FIELD_BITS {
            return self.decode_bits(count).map(u64::from);
        }
        if count > 2 * MAX_FIELD_BITS {
            return Err(ProtocolError::InvalidBitCount(count));
        }
        let start = self.read_offset;
        let high = self.decode_bits(count - MAX_FIELD_BITS)?;
        match self.decode_bits(MAX_FIELD_BITS) {
            Ok(low) => Ok((u64::from(high) << MAX_FIELD_BITS) | u64::from(low)),
            Err(e) => {
                self.read_offset = start;
                Err(e)
            }
        }
    }

    /// Writes `s` as consecutive 16-bit UTF-16 code units.
    pub fn write_str(&mut self, s: &str) -> Result<(), ProtocolError> {
        for unit in s.encode_utf16() {
            self.write_bits(16, u32::from(unit))?;
        }
        Ok(())
    }

    /// Reads `length` 16-bit code units and assembles them into a string.
    ///
    /// Surrogate pairs become one character. A unit that cannot be read
    /// (overrun) or an unpaired surrogate becomes [`PLACEHOLDER`]; the rest
    /// of the string is still decoded.
    pub fn read_str(&mut self, length: usize) -> String {
        let units: Vec<Option<u16>> = (0..length)
            .map(|_| self.decode_bits(16).ok().map(|unit| unit as u16))
            .collect();

        let mut out = String::with_capacity(length);
        let mut i = 0;
        while i < units.len() {
            let Some(unit) = units[i] else {
                out.push(PLACEHOLDER);
                i += 1;
                continue;
            };
            let next = units.get(i + 1).copied().flatten();
            match (unit, next) {
                (0xD800..=0xDBFF, Some(low @ 0xDC00..=0xDFFF)) => {
                    let decoded = char::decode_utf16([unit, low])
                        .next()
                        .and_then(Result::ok)
                        .unwrap_or(PLACEHOLDER);
                    out.push(decoded);
                    i += 2;
                }
                _ => {
                    out.push(char::from_u32(u32::from(unit)).unwrap_or(PLACEHOLDER));
                    i += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_bytes_rounds_up() {
        for bits in 0..200usize {
            assert_eq!(bits_to_bytes(bits), bits.div_ceil(8), "bits = {bits}");
        }
    }

    #[test]
    fn test_round_trip_every_width() {
        for count in 1..=32u32 {
            let max = if count == 32 { u32::MAX } else { (1u32 << count) - 1 };
            for value in [0, 1, max / 3, max / 2, max] {
                // Offset by 3 bits so fields straddle byte boundaries.
                let mut buf = Buffer::with_bits(3 + count as usize);
                buf.write_bits(3, 0b101).unwrap();
                buf.write_bits(count, value).unwrap();
                buf.set_read_offset(3);
                assert_eq!(buf.decode_bits(count).unwrap(), value, "count = {count}");
                assert_eq!(buf.read_offset(), 3 + count as usize);
            }
        }
    }

    #[test]
    fn test_msb_first_layout() {
        let mut buf = Buffer::new(2);
        buf.write_bits(1, 1).unwrap();
        buf.write_bits(4, 0b0011).unwrap();
        buf.write_bits(11, 0b101_0000_0001).unwrap();
        assert_eq!(buf.as_bytes(), &[0b1001_1101, 0b0000_0001]);
        assert_eq!(buf.write_offset(), 16);
    }

    #[test]
    fn test_write_truncates_to_requested_width() {
        // 0x1F does not fit in 4 bits: only the low four are written and
        // the neighbouring nibble stays clear.
        let mut buf = Buffer::new(2);
        buf.write_bits(4, 0x1F).unwrap();
        buf.write_bits(4, 0).unwrap();
        assert_eq!(buf.as_bytes(), &[0xF0, 0x00]);
    }

    #[test]
    fn test_write_ors_into_existing_bits() {
        let mut buf = Buffer::from_bytes(vec![0b0000_1111]);
        buf.write_bits(8, 0b1100_0000).unwrap();
        assert_eq!(buf.as_bytes(), &[0b1100_1111]);
    }

    #[test]
    fn test_decode_overrun_leaves_cursor() {
        let mut buf = Buffer::from_bytes(vec![0xAB]);
        buf.set_read_offset(4);
        let err = buf.decode_bits(5).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::BufferOverrun {
                offset: 4,
                requested: 5,
                capacity: 8
            }
        );
        assert_eq!(buf.read_offset(), 4);
        assert_eq!(buf.decode_bits(4).unwrap(), 0xB);
    }

    #[test]
    fn test_write_overrun_is_an_error() {
        let mut buf = Buffer::new(1);
        buf.write_bits(6, 0).unwrap();
        assert!(buf.write_bits(3, 0).unwrap_err().is_overrun());
        assert_eq!(buf.write_offset(), 6);
    }

    #[test]
    fn test_field_wider_than_32_bits_is_rejected() {
        let mut buf = Buffer::new(8);
        assert_eq!(buf.decode_bits(33), Err(ProtocolError::InvalidBitCount(33)));
    }

    #[test]
    fn test_cursor_near_usize_max_is_an_overrun() {
        let mut buf = Buffer::new(4);
        buf.set_read_offset(usize::MAX - 2);
        assert!(buf.decode_bits(8).unwrap_err().is_overrun());
        assert_eq!(buf.read_offset(), usize::MAX - 2);

        buf.set_write_offset(usize::MAX);
        assert!(buf.write_bits(1, 1).unwrap_err().is_overrun());
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_wide_field_spans_two_reads() {
        let mut buf = Buffer::with_bits(3 + 40);
        buf.write_bits(3, 0b111).unwrap();
        buf.write_bits(8, 0xA5).unwrap();
        buf.write_bits(32, 0x0102_0304).unwrap();
        buf.set_read_offset(3);
        assert_eq!(buf.decode_wide(40).unwrap(), 0xA5_0102_0304);
        assert_eq!(buf.read_offset(), 43);

        buf.set_read_offset(3);
        assert_eq!(buf.decode_wide(8).unwrap(), 0xA5);
    }

    #[test]
    fn test_wide_field_overrun_leaves_cursor() {
        let mut buf = Buffer::new(5);
        buf.set_read_offset(2);
        assert!(buf.decode_wide(40).unwrap_err().is_overrun());
        assert_eq!(buf.read_offset(), 2);
        assert_eq!(buf.decode_wide(65), Err(ProtocolError::InvalidBitCount(65)));
    }

    #[test]
    fn test_zero_width_read_is_zero() {
        let mut buf = Buffer::new(0);
        assert_eq!(buf.decode_bits(0).unwrap(), 0);
    }

    #[test]
    fn test_string_round_trip() {
        for s in ["", "kuzheren", "Zoë & 北京", "bot (2)", "🦀 crab"] {
            let mut buf = Buffer::with_bits(16 * utf16_len(s));
            buf.write_str(s).unwrap();
            assert_eq!(buf.read_str(utf16_len(s)), s);
        }
    }

    #[test]
    fn test_surrogate_pair_counts_as_two_units() {
        assert_eq!(utf16_len("🦀"), 2);
        let mut buf = Buffer::with_bits(32);
        buf.write_str("🦀").unwrap();
        assert_eq!(buf.as_bytes(), &[0xD8, 0x3E, 0xDD, 0x80]);
    }

    #[test]
    fn test_unpaired_surrogate_becomes_placeholder() {
        let mut buf = Buffer::with_bits(48);
        buf.write_bits(16, u32::from('a')).unwrap();
        buf.write_bits(16, 0xD800).unwrap();
        buf.write_bits(16, u32::from('b')).unwrap();
        assert_eq!(buf.read_str(3), "a?b");
    }

    #[test]
    fn test_lone_low_surrogate_becomes_placeholder() {
        let mut buf = Buffer::with_bits(16);
        buf.write_bits(16, 0xDC01).unwrap();
        assert_eq!(buf.read_str(1), "?");
    }

    #[test]
    fn test_read_str_overrun_substitutes_placeholder() {
        let mut buf = Buffer::with_bits(32);
        buf.write_str("hi").unwrap();
        assert_eq!(buf.read_str(4), "hi??");
        assert_eq!(buf.read_offset(), 32);
    }
}
