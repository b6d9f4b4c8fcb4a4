//! Tagged binary read/write primitives for registry persistence.
//!
//! This module is the serialization boundary of the crate. Registry files are a sequence
//! of little-endian session segments; everything above this layer describes *what* is
//! stored while this layer owns *how* bytes are produced and consumed.
//!
//! # Key Components
//!
//! - [`TaggedIO`] - Trait defining little-endian conversion for the primitive types used
//!   by the registry format
//! - [`read_le_at`] / [`write_le_at`] - Bounds-checked primitive access with an
//!   auto-advancing offset cursor
//! - [`TaggedDataInput`] - Decoder over a byte buffer with typed, length-prefixed reads
//! - [`TaggedDataOutput`] - Growable encoder producing the matching byte stream
//!
//! All reads are bounds-checked and fail with [`crate::Error::OutOfBounds`] rather than
//! panicking; the registry layer surfaces truncation as a corruption error.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data access.
///
/// Implemented for the primitive integer types the registry format stores. Each
/// implementation defines a `Bytes` associated type representing the fixed-size byte
/// array for that type, converted with little-endian semantics.
pub trait TaggedIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_tagged_io {
    ($($t:ty => $n:literal),* $(,)?) => {
        $(
            impl TaggedIO for $t {
                type Bytes = [u8; $n];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$t>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$t>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_tagged_io! {
    u8 => 1,
    u16 => 2,
    u32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing
/// the offset by the number of bytes read.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer.
pub fn read_le_at<T: TaggedIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Writes a value of type `T` in little-endian byte order to the end of `data`,
/// advancing `offset` by the number of bytes written.
pub fn write_le_at<T: TaggedIO>(data: &mut Vec<u8>, offset: &mut usize, value: T)
where
    T::Bytes: AsRef<[u8]>,
{
    let bytes = value.to_le_bytes();
    data.extend_from_slice(bytes.as_ref());
    *offset += bytes.as_ref().len();
}

/// Decoder over a byte buffer with typed, length-prefixed reads.
///
/// Wraps a borrowed byte slice and an offset cursor. All reads are bounds-checked;
/// a truncated buffer yields [`crate::Error::OutOfBounds`] and leaves the cursor at the
/// position of the failed read.
pub struct TaggedDataInput<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TaggedDataInput<'a> {
    /// Creates a decoder positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        TaggedDataInput { data, offset: 0 }
    }

    /// Current cursor position in bytes
    #[must_use]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes remaining after the cursor
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Reads a `u8`
    pub fn read_u8(&mut self) -> Result<u8> {
        read_le_at(self.data, &mut self.offset)
    }

    /// Reads a `u16`
    pub fn read_u16(&mut self) -> Result<u16> {
        read_le_at(self.data, &mut self.offset)
    }

    /// Reads a `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        read_le_at(self.data, &mut self.offset)
    }

    /// Reads a `u64`
    pub fn read_u64(&mut self) -> Result<u64> {
        read_le_at(self.data, &mut self.offset)
    }

    /// Reads an `i64`
    pub fn read_i64(&mut self) -> Result<i64> {
        read_le_at(self.data, &mut self.offset)
    }

    /// Reads a boolean encoded as a single byte
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a `u32` length-prefixed UTF-8 string
    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(OutOfBounds);
        }
        let bytes = &self.data[self.offset..self.offset + len];
        let text = std::str::from_utf8(bytes)
            .map_err(|_| format_error!("string at offset {} is not valid UTF-8", self.offset))?;
        self.offset += len;
        Ok(text.to_string())
    }

    /// Reads an optional string encoded as a presence byte followed by the string
    pub fn read_opt_str(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_str()?))
        } else {
            Ok(None)
        }
    }

    /// Reads a `u32` length-prefixed run of `u64` words
    pub fn read_u64_run(&mut self) -> Result<Vec<u64>> {
        let count = self.read_u32()? as usize;
        // The multiplication can overflow usize on 32-bit targets
        let Some(byte_len) = count.checked_mul(8) else {
            return Err(OutOfBounds);
        };
        if byte_len > self.remaining() {
            return Err(OutOfBounds);
        }
        (0..count).map(|_| self.read_u64()).collect()
    }

    /// Reads a `u32` length prefix and returns the following `len` bytes as a sub-slice,
    /// advancing the cursor past them
    pub fn read_frame(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(OutOfBounds);
        }
        let frame = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(frame)
    }
}

/// Growable encoder producing the byte stream matching [`TaggedDataInput`].
#[derive(Default)]
pub struct TaggedDataOutput {
    buf: Vec<u8>,
    offset: usize,
}

impl TaggedDataOutput {
    /// Creates an empty encoder
    #[must_use]
    pub fn new() -> Self {
        TaggedDataOutput::default()
    }

    /// Consumes the encoder and returns the produced bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a `u8`
    pub fn write_u8(&mut self, value: u8) {
        write_le_at(&mut self.buf, &mut self.offset, value);
    }

    /// Writes a `u16`
    pub fn write_u16(&mut self, value: u16) {
        write_le_at(&mut self.buf, &mut self.offset, value);
    }

    /// Writes a `u32`
    pub fn write_u32(&mut self, value: u32) {
        write_le_at(&mut self.buf, &mut self.offset, value);
    }

    /// Writes a `u64`
    pub fn write_u64(&mut self, value: u64) {
        write_le_at(&mut self.buf, &mut self.offset, value);
    }

    /// Writes an `i64`
    pub fn write_i64(&mut self, value: i64) {
        write_le_at(&mut self.buf, &mut self.offset, value);
    }

    /// Writes a boolean as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a `u32` length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        self.offset += value.len();
    }

    /// Writes an optional string as a presence byte followed by the string
    pub fn write_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(text) => {
                self.write_bool(true);
                self.write_str(text);
            }
            None => self.write_bool(false),
        }
    }

    /// Writes a `u32` length-prefixed run of `u64` words
    pub fn write_u64_run(&mut self, words: &[u64]) {
        self.write_u32(words.len() as u32);
        for &word in words {
            self.write_u64(word);
        }
    }

    /// Writes a `u32` length prefix followed by `frame` verbatim
    pub fn write_frame(&mut self, frame: &[u8]) {
        self.write_u32(frame.len() as u32);
        self.buf.extend_from_slice(frame);
        self.offset += frame.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut out = TaggedDataOutput::new();
        out.write_u8(0xAB);
        out.write_u16(0x1234);
        out.write_u32(0xDEAD_BEEF);
        out.write_u64(0x0102_0304_0506_0708);
        out.write_i64(-42);
        out.write_bool(true);

        let bytes = out.into_bytes();
        let mut input = TaggedDataInput::new(&bytes);
        assert_eq!(input.read_u8().unwrap(), 0xAB);
        assert_eq!(input.read_u16().unwrap(), 0x1234);
        assert_eq!(input.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(input.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(input.read_i64().unwrap(), -42);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_string_round_trip() {
        let mut out = TaggedDataOutput::new();
        out.write_str("src/Main.java");
        out.write_opt_str(None);
        out.write_opt_str(Some("UTF-8"));

        let bytes = out.into_bytes();
        let mut input = TaggedDataInput::new(&bytes);
        assert_eq!(input.read_str().unwrap(), "src/Main.java");
        assert_eq!(input.read_opt_str().unwrap(), None);
        assert_eq!(input.read_opt_str().unwrap(), Some("UTF-8".to_string()));
    }

    #[test]
    fn test_word_run_round_trip() {
        let mut out = TaggedDataOutput::new();
        out.write_u64_run(&[1, 0, u64::MAX]);
        let bytes = out.into_bytes();
        let mut input = TaggedDataInput::new(&bytes);
        assert_eq!(input.read_u64_run().unwrap(), vec![1, 0, u64::MAX]);
    }

    #[test]
    fn test_frame_round_trip() {
        let mut out = TaggedDataOutput::new();
        out.write_frame(&[9, 9, 9]);
        out.write_u8(7);
        let bytes = out.into_bytes();
        let mut input = TaggedDataInput::new(&bytes);
        assert_eq!(input.read_frame().unwrap(), &[9, 9, 9]);
        assert_eq!(input.read_u8().unwrap(), 7);
    }

    #[test]
    fn test_truncated_read_is_out_of_bounds() {
        let bytes = [0x01, 0x02];
        let mut input = TaggedDataInput::new(&bytes);
        assert!(matches!(input.read_u32(), Err(crate::Error::OutOfBounds)));

        let mut input = TaggedDataInput::new(&[10, 0, 0, 0, b'x']);
        assert!(matches!(input.read_str(), Err(crate::Error::OutOfBounds)));
    }

    #[test]
    fn test_oversized_run_count_is_out_of_bounds() {
        // A count prefix claiming far more words than the buffer holds must fail
        // cleanly, including counts whose byte length does not fit in usize
        let mut input = TaggedDataInput::new(&[0xFF, 0xFF, 0xFF, 0xFF, 1, 2, 3]);
        assert!(matches!(
            input.read_u64_run(),
            Err(crate::Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_invalid_utf8_is_format_error() {
        let mut input = TaggedDataInput::new(&[2, 0, 0, 0, 0xFF, 0xFE]);
        assert!(matches!(
            input.read_str(),
            Err(crate::Error::RegistryFormat { .. })
        ));
    }
}
