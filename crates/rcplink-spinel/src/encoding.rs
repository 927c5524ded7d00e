//! Typed, positional encoding of property payloads.
//!
//! The wire layout of each property is a fixed sequence of primitive
//! values. [`Encoder`] and [`Decoder`] compose those primitives
//! positionally at the call site, so each property's layout is spelled out
//! where it is used instead of in a format string.
//!
//! Wire primitives: bool (one byte), u8/i8, u16/i16 little-endian,
//! u32/u64 little-endian, packed unsigned integers, raw trailing data,
//! u16-length-prefixed data, NUL-terminated UTF-8, and u16-length-prefixed
//! nested structs.

use bytes::{BufMut, BytesMut};
use rcplink_core::error::{Error, Result};

use crate::codec::{put_packed_uint, take_packed_uint};

/// Builds a property payload from positional typed values.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Start an empty payload.
    pub fn new() -> Encoder {
        Encoder {
            buf: BytesMut::new(),
        }
    }

    /// Finish and return the payload bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Append a bool as a single byte (0 or 1).
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Append a u8.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Append an i8.
    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    /// Append a u16, little-endian.
    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Append an i16, little-endian.
    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        self.buf.put_i16_le(value);
        self
    }

    /// Append a u32, little-endian.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append a u64, little-endian.
    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Append a packed unsigned integer.
    pub fn put_uint_packed(&mut self, value: u32) -> &mut Self {
        put_packed_uint(&mut self.buf, value);
        self
    }

    /// Append raw bytes with no length prefix (must be the final field,
    /// or inside a struct whose own length delimits it).
    pub fn put_data(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Append bytes with a u16 little-endian length prefix.
    pub fn put_data_with_len(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_u16_le(data.len() as u16);
        self.buf.put_slice(data);
        self
    }

    /// Append a NUL-terminated UTF-8 string.
    pub fn put_utf8(&mut self, value: &str) -> &mut Self {
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    /// Append a nested struct: u16 length prefix plus its pre-encoded
    /// contents.
    pub fn put_struct(&mut self, contents: &[u8]) -> &mut Self {
        self.put_data_with_len(contents)
    }
}

/// Reads positional typed values from a property payload.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    /// Wrap a payload for reading.
    pub fn new(data: &'a [u8]) -> Decoder<'a> {
        Decoder { data }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(Error::Parse(format!(
                "payload truncated: need {n} bytes, have {}",
                self.data.len()
            )));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    /// Read a bool byte.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    /// Read a u8.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read an i8.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Read a u16, little-endian.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read an i16, little-endian.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read a u32, little-endian.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a u64, little-endian.
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a packed unsigned integer.
    pub fn read_uint_packed(&mut self) -> Result<u32> {
        let (value, used) = take_packed_uint(self.data)?;
        self.data = &self.data[used..];
        Ok(value)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Consume and return all remaining bytes.
    pub fn read_data_remaining(&mut self) -> &'a [u8] {
        let rest = self.data;
        self.data = &[];
        rest
    }

    /// Read bytes with a u16 little-endian length prefix.
    pub fn read_data_with_len(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }

    /// Read a NUL-terminated UTF-8 string.
    pub fn read_utf8(&mut self) -> Result<&'a str> {
        let nul = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Parse("unterminated string".into()))?;
        let raw = self.take(nul + 1)?;
        std::str::from_utf8(&raw[..nul]).map_err(|_| Error::Parse("invalid UTF-8".into()))
    }

    /// Read a nested struct, returning a decoder over its contents.
    pub fn read_struct(&mut self) -> Result<Decoder<'a>> {
        Ok(Decoder::new(self.read_data_with_len()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let mut enc = Encoder::new();
        enc.put_bool(true)
            .put_u8(0xAB)
            .put_i8(-20)
            .put_u16(0xABCD)
            .put_i16(-1000)
            .put_u32(0xDEADBEEF)
            .put_u64(0x0123_4567_89AB_CDEF);
        let payload = enc.finish();

        let mut dec = Decoder::new(&payload);
        assert!(dec.read_bool().unwrap());
        assert_eq!(dec.read_u8().unwrap(), 0xAB);
        assert_eq!(dec.read_i8().unwrap(), -20);
        assert_eq!(dec.read_u16().unwrap(), 0xABCD);
        assert_eq!(dec.read_i16().unwrap(), -1000);
        assert_eq!(dec.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(dec.read_u64().unwrap(), 0x0123_4567_89AB_CDEF);
        assert!(dec.is_empty());
    }

    #[test]
    fn u16_is_little_endian() {
        let mut enc = Encoder::new();
        enc.put_u16(0xABCD);
        assert_eq!(enc.finish(), vec![0xCD, 0xAB]);
    }

    #[test]
    fn length_prefixed_data() {
        let mut enc = Encoder::new();
        enc.put_data_with_len(&[1, 2, 3]).put_u8(9);
        let payload = enc.finish();
        assert_eq!(payload, vec![0x03, 0x00, 1, 2, 3, 9]);

        let mut dec = Decoder::new(&payload);
        assert_eq!(dec.read_data_with_len().unwrap(), &[1, 2, 3]);
        assert_eq!(dec.read_u8().unwrap(), 9);
    }

    #[test]
    fn trailing_data() {
        let mut enc = Encoder::new();
        enc.put_u8(1).put_data(&[7, 8, 9]);
        let payload = enc.finish();

        let mut dec = Decoder::new(&payload);
        dec.read_u8().unwrap();
        assert_eq!(dec.read_data_remaining(), &[7, 8, 9]);
        assert!(dec.is_empty());
    }

    #[test]
    fn utf8_round_trip() {
        let mut enc = Encoder::new();
        enc.put_utf8("OPENTHREAD/1.2").put_u8(4);
        let payload = enc.finish();

        let mut dec = Decoder::new(&payload);
        assert_eq!(dec.read_utf8().unwrap(), "OPENTHREAD/1.2");
        assert_eq!(dec.read_u8().unwrap(), 4);
    }

    #[test]
    fn utf8_unterminated() {
        let mut dec = Decoder::new(b"abc");
        assert!(dec.read_utf8().is_err());
    }

    #[test]
    fn nested_struct() {
        let mut inner = Encoder::new();
        inner.put_u8(15).put_u8(200).put_u64(123456);

        let mut enc = Encoder::new();
        enc.put_u16(0xFFFF).put_struct(&inner.finish()).put_u8(1);
        let payload = enc.finish();

        let mut dec = Decoder::new(&payload);
        assert_eq!(dec.read_u16().unwrap(), 0xFFFF);
        let mut s = dec.read_struct().unwrap();
        assert_eq!(s.read_u8().unwrap(), 15);
        assert_eq!(s.read_u8().unwrap(), 200);
        assert_eq!(s.read_u64().unwrap(), 123456);
        assert!(s.is_empty());
        assert_eq!(dec.read_u8().unwrap(), 1);
    }

    #[test]
    fn packed_uint_in_payload() {
        let mut enc = Encoder::new();
        enc.put_uint_packed(0x120B).put_uint_packed(2);
        let payload = enc.finish();

        let mut dec = Decoder::new(&payload);
        assert_eq!(dec.read_uint_packed().unwrap(), 0x120B);
        assert_eq!(dec.read_uint_packed().unwrap(), 2);
    }

    #[test]
    fn truncation_is_an_error() {
        let mut dec = Decoder::new(&[0x01]);
        assert!(dec.read_u16().is_err());

        let mut dec = Decoder::new(&[0x05, 0x00, 1, 2]);
        assert!(dec.read_data_with_len().is_err());
    }
}
