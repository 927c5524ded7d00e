//! Spinel command, property, and status registries.
//!
//! Numeric values follow the published Spinel registry. Only the subset
//! the driver actually exchanges with a radio co-processor is defined
//! here; the property space is large and mostly NCP-only.

use rcplink_core::error::Error;

/// Spinel command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// No-op; also used as the "no expected command" placeholder.
    Noop = 0,
    /// Reset the co-processor.
    Reset = 1,
    /// Read a property value (host to device).
    PropValueGet = 2,
    /// Write a property value (host to device).
    PropValueSet = 3,
    /// Insert an entry into a list-valued property (host to device).
    PropValueInsert = 4,
    /// Remove an entry from a list-valued property (host to device).
    PropValueRemove = 5,
    /// A property value announcement (device to host).
    PropValueIs = 6,
    /// Acknowledges a completed insert (device to host).
    PropValueInserted = 7,
    /// Acknowledges a completed remove (device to host).
    PropValueRemoved = 8,
}

impl Command {
    /// Decode a packed command id; unknown ids return `None`.
    pub fn from_u32(value: u32) -> Option<Command> {
        Some(match value {
            0 => Command::Noop,
            1 => Command::Reset,
            2 => Command::PropValueGet,
            3 => Command::PropValueSet,
            4 => Command::PropValueInsert,
            5 => Command::PropValueRemove,
            6 => Command::PropValueIs,
            7 => Command::PropValueInserted,
            8 => Command::PropValueRemoved,
            _ => return None,
        })
    }

    /// True for the device-to-host reply commands.
    pub fn is_reply(self) -> bool {
        matches!(
            self,
            Command::PropValueIs | Command::PropValueInserted | Command::PropValueRemoved
        )
    }
}

/// Property keys, packed-uint encoded on the wire.
pub mod prop {
    /// Outcome of the most recent operation; also carries reset announcements.
    pub const LAST_STATUS: u32 = 0x00;
    /// Spinel protocol version (packed major, packed minor).
    pub const PROTOCOL_VERSION: u32 = 0x01;
    /// Firmware version string.
    pub const NCP_VERSION: u32 = 0x02;
    /// Capability list (sequence of packed uints).
    pub const CAPS: u32 = 0x05;
    /// Factory EUI-64.
    pub const HWADDR: u32 = 0x08;

    /// PHY enabled flag.
    pub const PHY_ENABLED: u32 = 0x20;
    /// Current channel.
    pub const PHY_CHAN: u32 = 0x21;
    /// Supported channel list.
    pub const PHY_CHAN_SUPPORTED: u32 = 0x22;
    /// Clear-channel-assessment energy threshold, dBm.
    pub const PHY_CCA_THRESHOLD: u32 = 0x24;
    /// Transmit power, dBm.
    pub const PHY_TX_POWER: u32 = 0x25;
    /// Instantaneous RSSI, dBm.
    pub const PHY_RSSI: u32 = 0x26;
    /// Receive sensitivity, dBm.
    pub const PHY_RX_SENSITIVITY: u32 = 0x27;
    /// Preferred channel list.
    pub const PHY_CHAN_PREFERRED: u32 = 0x29;
    /// Per-channel maximum transmit power (channel, dBm).
    pub const PHY_CHAN_MAX_POWER: u32 = 0x2B;

    /// Scan state machine control (see [`scan_state`](super::scan_state)).
    pub const MAC_SCAN_STATE: u32 = 0x30;
    /// Channels to scan, as a channel list.
    pub const MAC_SCAN_MASK: u32 = 0x31;
    /// Per-channel scan dwell time, milliseconds.
    pub const MAC_SCAN_PERIOD: u32 = 0x32;
    /// Extended (long) MAC address.
    pub const MAC_15_4_LADDR: u32 = 0x34;
    /// Short MAC address.
    pub const MAC_15_4_SADDR: u32 = 0x35;
    /// PAN identifier.
    pub const MAC_15_4_PANID: u32 = 0x36;
    /// Raw MAC frame stream enable (receiver on/off).
    pub const MAC_RAW_STREAM_ENABLED: u32 = 0x37;
    /// Promiscuous mode (see [`promiscuous_mode`](super::promiscuous_mode)).
    pub const MAC_PROMISCUOUS_MODE: u32 = 0x38;
    /// Energy scan result notification (channel, max RSSI).
    pub const MAC_ENERGY_SCAN_RESULT: u32 = 0x39;

    /// Debug byte stream from the co-processor.
    pub const STREAM_DEBUG: u32 = 0x70;
    /// Raw 802.15.4 frame stream (both transmit and receive carrier).
    pub const STREAM_RAW: u32 = 0x71;
    /// Structured log stream (UTF-8 message plus severity).
    pub const STREAM_LOG: u32 = 0x74;

    /// Radio capability bitmask (see [`caps`](rcplink_core::types::caps)).
    pub const RADIO_CAPS: u32 = 0x120B;
    /// Coexistence metrics structure.
    pub const RADIO_COEX_METRICS: u32 = 0x120C;
    /// Radio coexistence enable flag.
    pub const RADIO_COEX_ENABLE: u32 = 0x120D;

    /// Source-address-match (pending-frame filtering) enable.
    pub const MAC_SRC_MATCH_ENABLED: u32 = 0x1303;
    /// Source-match short-address entries (insert/remove).
    pub const MAC_SRC_MATCH_SHORT_ADDRESSES: u32 = 0x1304;
    /// Source-match extended-address entries (insert/remove).
    pub const MAC_SRC_MATCH_EXTENDED_ADDRESSES: u32 = 0x1305;

    /// MAC key material (id mode, index, previous/current/next keys).
    pub const RCP_MAC_KEY: u32 = 0x800;
    /// MAC frame counter.
    pub const RCP_MAC_FRAME_COUNTER: u32 = 0x801;
    /// Co-processor timestamp, microseconds (time sync probe).
    pub const RCP_TIMESTAMP: u32 = 0x802;
}

/// Capability list entries (packed uints inside [`prop::CAPS`]).
pub mod cap {
    /// Device is a radio co-processor (not a full NCP).
    pub const CONFIG_RADIO: u32 = 34;
    /// Device supports the raw MAC frame stream.
    pub const MAC_RAW: u32 = 513;
    /// Device emits structured log metadata on `STREAM_LOG`.
    pub const OPENTHREAD_LOG_METADATA: u32 = 518;
}

/// `MAC_SCAN_STATE` values.
pub mod scan_state {
    /// Not scanning.
    pub const IDLE: u8 = 0;
    /// Energy scan in progress.
    pub const ENERGY: u8 = 2;
}

/// `MAC_PROMISCUOUS_MODE` values.
pub mod promiscuous_mode {
    /// Normal address filtering.
    pub const OFF: u8 = 0;
    /// Receive all frames that pass CRC, regardless of addressing.
    pub const NETWORK: u8 = 1;
}

/// Reset command argument: reset the stack but not the bootloader.
pub const RESET_STACK: u8 = 2;

/// Protocol major version this driver speaks.
pub const PROTOCOL_VERSION_MAJOR: u32 = 4;
/// Protocol minor version this driver speaks.
pub const PROTOCOL_VERSION_MINOR: u32 = 3;

/// Receive-metadata flag: frame was ACKed with frame-pending set.
pub const MD_FLAG_ACKED_FP: u16 = 0x0010;
/// Receive-metadata flag: frame was ACKed with a secured enhanced ACK.
pub const MD_FLAG_ACKED_SEC: u16 = 0x0020;

/// First status code in the reset-announcement range.
pub const STATUS_RESET_BEGIN: u32 = 112;
/// Last status code in the reset-announcement range.
pub const STATUS_RESET_END: u32 = 127;
/// First status code in the vendor-specific range.
pub const STATUS_VENDOR_BEGIN: u32 = 15360;
/// One past the last vendor-specific status code.
pub const STATUS_VENDOR_END: u32 = 16384;

/// Status codes carried in `LAST_STATUS` replies and announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    /// Operation completed successfully.
    pub const OK: Status = Status(0);
    /// Operation failed for an unspecified reason.
    pub const FAILURE: Status = Status(1);
    /// Operation not implemented.
    pub const UNIMPLEMENTED: Status = Status(2);
    /// An argument was invalid.
    pub const INVALID_ARGUMENT: Status = Status(3);
    /// Operation invalid for the current device state.
    pub const INVALID_STATE: Status = Status(4);
    /// Command could not be parsed.
    pub const PARSE_ERROR: Status = Status(9);
    /// Device out of buffer memory.
    pub const NOMEM: Status = Status(11);
    /// Device busy with a mutually exclusive operation.
    pub const BUSY: Status = Status(12);
    /// The property key is not recognized.
    pub const PROP_NOT_FOUND: Status = Status(13);
    /// Packet dropped.
    pub const DROPPED: Status = Status(14);
    /// Packet was not acknowledged.
    pub const NO_ACK: Status = Status(17);
    /// Packet not sent due to CCA failure.
    pub const CCA_FAILURE: Status = Status(18);
    /// Operation already in progress / already applied.
    pub const ALREADY: Status = Status(19);
    /// Item not found.
    pub const ITEM_NOT_FOUND: Status = Status(20);
    /// No response from a remote node.
    pub const RESPONSE_TIMEOUT: Status = Status(24);

    /// True when this status announces a device reset.
    pub fn is_reset(self) -> bool {
        (STATUS_RESET_BEGIN..=STATUS_RESET_END).contains(&self.0)
    }

    /// Map to the local error enumeration. `OK` maps to `Ok(())`.
    pub fn into_result(self) -> Result<(), Error> {
        Err(match self {
            Status::OK => return Ok(()),
            Status::FAILURE => Error::Failure,
            Status::UNIMPLEMENTED => Error::Unimplemented,
            Status::INVALID_ARGUMENT => Error::InvalidArgument,
            Status::INVALID_STATE => Error::InvalidState,
            Status::PARSE_ERROR => Error::Parse("rejected by co-processor".into()),
            Status::NOMEM => Error::NoMemory,
            Status::BUSY => Error::Busy,
            Status::PROP_NOT_FOUND => Error::PropertyNotFound,
            Status::DROPPED => Error::Dropped,
            Status::NO_ACK => Error::NoAck,
            Status::CCA_FAILURE => Error::ChannelAccessFailure,
            Status::ALREADY => Error::Already,
            Status::ITEM_NOT_FOUND => Error::ItemNotFound,
            Status::RESPONSE_TIMEOUT => Error::Timeout,
            Status(code) if (STATUS_VENDOR_BEGIN..STATUS_VENDOR_END).contains(&code) => {
                Error::Vendor(code)
            }
            // Reset announcements and anything unmapped degrade to the
            // generic failure kind.
            Status(_) => Error::Failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trip() {
        for value in 0..=8u32 {
            let cmd = Command::from_u32(value).unwrap();
            assert_eq!(cmd as u32, value);
        }
        assert!(Command::from_u32(9).is_none());
        assert!(Command::from_u32(15360).is_none());
    }

    #[test]
    fn reply_commands() {
        assert!(Command::PropValueIs.is_reply());
        assert!(Command::PropValueInserted.is_reply());
        assert!(Command::PropValueRemoved.is_reply());
        assert!(!Command::PropValueSet.is_reply());
        assert!(!Command::Reset.is_reply());
    }

    #[test]
    fn status_ok_maps_to_ok() {
        assert!(Status::OK.into_result().is_ok());
    }

    #[test]
    fn status_closed_mapping() {
        assert_eq!(Status::NO_ACK.into_result().unwrap_err(), Error::NoAck);
        assert_eq!(
            Status::CCA_FAILURE.into_result().unwrap_err(),
            Error::ChannelAccessFailure
        );
        assert_eq!(Status::BUSY.into_result().unwrap_err(), Error::Busy);
        assert_eq!(
            Status::PROP_NOT_FOUND.into_result().unwrap_err(),
            Error::PropertyNotFound
        );
        assert_eq!(
            Status::ITEM_NOT_FOUND.into_result().unwrap_err(),
            Error::ItemNotFound
        );
        assert_eq!(Status::ALREADY.into_result().unwrap_err(), Error::Already);
    }

    #[test]
    fn status_vendor_range() {
        assert_eq!(
            Status(15400).into_result().unwrap_err(),
            Error::Vendor(15400)
        );
        // One past the vendor range falls back to the generic kind.
        assert_eq!(Status(16384).into_result().unwrap_err(), Error::Failure);
    }

    #[test]
    fn status_unknown_falls_back() {
        assert_eq!(Status(99).into_result().unwrap_err(), Error::Failure);
    }

    #[test]
    fn reset_range() {
        assert!(Status(112).is_reset());
        assert!(Status(115).is_reset());
        assert!(Status(127).is_reset());
        assert!(!Status(111).is_reset());
        assert!(!Status(128).is_reset());
    }
}
