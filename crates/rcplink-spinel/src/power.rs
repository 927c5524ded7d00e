//! Per-channel transmit power limits and channel masks.

use rcplink_core::error::{Error, Result};
use rcplink_core::types::{CHANNEL_MAX, CHANNEL_MIN};

use crate::encoding::Decoder;

/// Maximum transmit power per 802.15.4 channel.
///
/// Entries are unset until the host configures a limit; unset channels are
/// skipped during recovery replay.
#[derive(Debug, Clone, Default)]
pub struct MaxPowerTable {
    entries: [Option<i8>; (CHANNEL_MAX - CHANNEL_MIN + 1) as usize],
}

impl MaxPowerTable {
    /// An empty table with no limits configured.
    pub fn new() -> MaxPowerTable {
        MaxPowerTable::default()
    }

    fn index(channel: u8) -> Result<usize> {
        if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
            return Err(Error::InvalidArgument);
        }
        Ok((channel - CHANNEL_MIN) as usize)
    }

    /// Record the maximum transmit power for a channel.
    pub fn set(&mut self, channel: u8, max_power_dbm: i8) -> Result<()> {
        self.entries[Self::index(channel)?] = Some(max_power_dbm);
        Ok(())
    }

    /// The configured limit for a channel, if any.
    pub fn get(&self, channel: u8) -> Option<i8> {
        Self::index(channel).ok().and_then(|i| self.entries[i])
    }

    /// Iterate configured `(channel, max_power)` pairs in channel order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, i8)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, power)| power.map(|p| (CHANNEL_MIN + i as u8, p)))
    }
}

/// Decode a channel-list payload (one byte per channel) into a bitmask.
///
/// Channels above bit 31 are rejected as malformed.
pub fn decode_channel_mask(payload: &[u8]) -> Result<u32> {
    let mut dec = Decoder::new(payload);
    let mut mask = 0u32;

    while !dec.is_empty() {
        let channel = dec.read_u8()?;
        if channel > 31 {
            return Err(Error::Parse(format!("channel {channel} out of range")));
        }
        mask |= 1 << channel;
    }

    Ok(mask)
}
