//! Spinel frame encoder/decoder.
//!
//! A Spinel frame is a header byte followed by a packed command id, a
//! packed property key, and an opaque payload. Byte framing (HDLC-lite,
//! SPI headers) happens below the [`Transport`](rcplink_core::Transport)
//! boundary, so this module deals in whole frames.
//!
//! # Frame format
//!
//! ```text
//! <header> <cmd...> <key...> [<payload>...]
//! ```
//!
//! - `header`: `0x80 | (iid << 4) | tid` -- top bit is the valid-frame
//!   flag, two bits of interface id, four bits of transaction id
//! - `cmd`, `key`: packed unsigned integers (7 bits per byte, LSB first,
//!   bit 7 set on all but the final byte)
//! - `payload`: property-specific bytes

use bytes::{BufMut, BytesMut};
use rcplink_core::error::{Error, Result};

use crate::protocol::Command;

/// Valid-frame flag bit in the header byte.
pub const HEADER_FLAG: u8 = 0x80;

/// Transaction id mask within the header byte.
pub const HEADER_TID_MASK: u8 = 0x0F;

/// Interface id shift within the header byte.
pub const HEADER_IID_SHIFT: u8 = 4;

/// Interface id mask (after shifting).
pub const HEADER_IID_MASK: u8 = 0x03;

/// Transaction id reserved for unsolicited device-to-host notifications.
pub const TID_NOTIFICATION: u8 = 0;

/// A Spinel frame header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header(pub u8);

impl Header {
    /// Build a header for the given interface id and transaction id.
    ///
    /// Only the low two bits of `iid` and low four bits of `tid` are
    /// representable; callers keep values in range.
    pub fn new(iid: u8, tid: u8) -> Header {
        Header(HEADER_FLAG | ((iid & HEADER_IID_MASK) << HEADER_IID_SHIFT) | (tid & HEADER_TID_MASK))
    }

    /// True when the valid-frame flag bit is set.
    pub fn is_valid(self) -> bool {
        self.0 & HEADER_FLAG == HEADER_FLAG
    }

    /// Interface id addressed by this frame.
    pub fn iid(self) -> u8 {
        (self.0 >> HEADER_IID_SHIFT) & HEADER_IID_MASK
    }

    /// Transaction id; `0` marks an unsolicited notification.
    pub fn tid(self) -> u8 {
        self.0 & HEADER_TID_MASK
    }
}

/// A parsed device-to-host Spinel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinelFrame {
    /// The header byte.
    pub header: Header,
    /// Packed command id, decoded.
    pub cmd: u32,
    /// Packed property key, decoded.
    pub key: u32,
    /// Remaining payload bytes.
    pub payload: Vec<u8>,
}

/// Append a packed unsigned integer (7 bits per byte, LSB first).
pub fn put_packed_uint(buf: &mut BytesMut, mut value: u32) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

/// Decode a packed unsigned integer from the front of `buf`.
///
/// Returns the value and the number of bytes consumed.
pub fn take_packed_uint(buf: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= 5 {
            break;
        }
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::Parse("truncated packed integer".into()))
}

/// Encode a property command frame.
pub fn encode_frame(header: Header, cmd: Command, key: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(1 + 5 + 5 + payload.len());
    buf.put_u8(header.0);
    put_packed_uint(&mut buf, cmd as u32);
    put_packed_uint(&mut buf, key);
    buf.put_slice(payload);
    buf.to_vec()
}

/// Encode a reset command frame (no property key).
pub fn encode_reset_frame(header: Header, reset_type: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(3);
    buf.put_u8(header.0);
    put_packed_uint(&mut buf, Command::Reset as u32);
    buf.put_u8(reset_type);
    buf.to_vec()
}

/// Decode one device-to-host frame.
///
/// Validates the valid-frame flag; frames failing validation are dropped
/// by the caller with a parse-error count, never surfaced as success.
pub fn decode_frame(buf: &[u8]) -> Result<SpinelFrame> {
    let (&header_byte, mut rest) = buf
        .split_first()
        .ok_or_else(|| Error::Parse("empty frame".into()))?;

    let header = Header(header_byte);
    if !header.is_valid() {
        return Err(Error::Parse(format!(
            "frame flag bit missing in header 0x{header_byte:02X}"
        )));
    }

    let (cmd, used) = take_packed_uint(rest)?;
    rest = &rest[used..];
    let (key, used) = take_packed_uint(rest)?;
    rest = &rest[used..];

    Ok(SpinelFrame {
        header,
        cmd,
        key,
        payload: rest.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::prop;

    // ---------------------------------------------------------------
    // Header byte layout
    // ---------------------------------------------------------------

    #[test]
    fn header_layout() {
        let h = Header::new(0, 5);
        assert_eq!(h.0, 0x85);
        assert!(h.is_valid());
        assert_eq!(h.iid(), 0);
        assert_eq!(h.tid(), 5);
    }

    #[test]
    fn header_with_iid() {
        let h = Header::new(2, 15);
        assert_eq!(h.0, 0x80 | 0x20 | 0x0F);
        assert_eq!(h.iid(), 2);
        assert_eq!(h.tid(), 15);
    }

    #[test]
    fn header_notification_tid() {
        let h = Header::new(0, TID_NOTIFICATION);
        assert_eq!(h.tid(), 0);
    }

    #[test]
    fn header_masks_out_of_range_values() {
        // iid wider than 2 bits and tid wider than 4 bits are truncated.
        let h = Header::new(7, 0x1F);
        assert_eq!(h.iid(), 3);
        assert_eq!(h.tid(), 15);
    }

    #[test]
    fn header_invalid_without_flag() {
        assert!(!Header(0x05).is_valid());
    }

    // ---------------------------------------------------------------
    // Packed unsigned integers
    // ---------------------------------------------------------------

    #[test]
    fn packed_uint_single_byte() {
        let mut buf = BytesMut::new();
        put_packed_uint(&mut buf, 6);
        assert_eq!(&buf[..], &[0x06]);
        assert_eq!(take_packed_uint(&buf).unwrap(), (6, 1));
    }

    #[test]
    fn packed_uint_boundary_127() {
        let mut buf = BytesMut::new();
        put_packed_uint(&mut buf, 127);
        assert_eq!(&buf[..], &[0x7F]);
    }

    #[test]
    fn packed_uint_two_bytes() {
        // 0x120B (RADIO_CAPS) needs two bytes: 0x0B | 0x80, 0x24.
        let mut buf = BytesMut::new();
        put_packed_uint(&mut buf, prop::RADIO_CAPS);
        assert_eq!(&buf[..], &[0x8B, 0x24]);
        assert_eq!(take_packed_uint(&buf).unwrap(), (prop::RADIO_CAPS, 2));
    }

    #[test]
    fn packed_uint_round_trip_various() {
        for value in [0u32, 1, 0x7F, 0x80, 0x800, 0x120D, 15360, u32::MAX] {
            let mut buf = BytesMut::new();
            put_packed_uint(&mut buf, value);
            let (decoded, used) = take_packed_uint(&buf).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn packed_uint_truncated() {
        assert!(take_packed_uint(&[0x80]).is_err());
        assert!(take_packed_uint(&[]).is_err());
    }

    // ---------------------------------------------------------------
    // Frame encode/decode
    // ---------------------------------------------------------------

    #[test]
    fn encode_get_frame() {
        let bytes = encode_frame(Header::new(0, 1), Command::PropValueGet, prop::PHY_CHAN, &[]);
        assert_eq!(bytes, vec![0x81, 0x02, 0x21]);
    }

    #[test]
    fn encode_set_frame_with_payload() {
        let bytes = encode_frame(
            Header::new(0, 3),
            Command::PropValueSet,
            prop::MAC_15_4_PANID,
            &[0xCD, 0xAB],
        );
        assert_eq!(bytes, vec![0x83, 0x03, 0x36, 0xCD, 0xAB]);
    }

    #[test]
    fn encode_reset() {
        let bytes = encode_reset_frame(Header::new(0, 0), crate::protocol::RESET_STACK);
        assert_eq!(bytes, vec![0x80, 0x01, 0x02]);
    }

    #[test]
    fn round_trip_preserves_all_fields() {
        let header = Header::new(1, 7);
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let bytes = encode_frame(header, Command::PropValueIs, prop::RCP_MAC_KEY, &payload);

        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.cmd, Command::PropValueIs as u32);
        assert_eq!(frame.key, prop::RCP_MAC_KEY);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn round_trip_empty_payload() {
        let bytes = encode_frame(Header::new(0, 2), Command::PropValueIs, prop::LAST_STATUS, &[]);
        let frame = decode_frame(&bytes).unwrap();
        assert!(frame.payload.is_empty());
        assert_eq!(frame.key, prop::LAST_STATUS);
    }

    #[test]
    fn decode_rejects_missing_flag() {
        let err = decode_frame(&[0x01, 0x06, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn decode_rejects_empty() {
        assert!(decode_frame(&[]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_key() {
        // Valid header, command, then a packed key that never terminates.
        assert!(decode_frame(&[0x81, 0x06, 0x8B]).is_err());
    }
}
