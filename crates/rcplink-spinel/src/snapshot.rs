//! Configuration snapshot replayed after co-processor recovery.
//!
//! Every successful `Set`/`Insert` of a recoverable property records its
//! value here. After a reset, the driver replays the snapshot in a fixed
//! order so the co-processor ends up in the same configuration it had
//! before the failure. A field is only eligible for replay once its
//! original write succeeded, so the snapshot starts empty.

use rcplink_core::types::{ExtAddress, MAC_KEY_SIZE};

use crate::power::MaxPowerTable;

/// MAC security key material as last pushed to the co-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacKeyMaterial {
    /// Key identifier mode from the security header.
    pub key_id_mode: u8,
    /// Key index.
    pub key_id: u8,
    /// Previous rotation key.
    pub prev: [u8; MAC_KEY_SIZE],
    /// Current key.
    pub curr: [u8; MAC_KEY_SIZE],
    /// Next rotation key.
    pub next: [u8; MAC_KEY_SIZE],
}

/// Snapshot of all co-processor configuration the driver has applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    /// PAN identifier.
    pub pan_id: Option<u16>,
    /// Short MAC address.
    pub short_address: Option<u16>,
    /// Extended MAC address.
    pub ext_address: Option<ExtAddress>,
    /// Radio channel.
    pub channel: Option<u8>,
    /// MAC key material.
    pub mac_key: Option<MacKeyMaterial>,
    /// MAC frame counter as last written. Replayed with a guard increment
    /// so a post-reset counter can never reuse a nonce.
    pub frame_counter: Option<u32>,
    /// Source-address-match enable flag.
    pub src_match_enabled: Option<bool>,
    /// Source-match short-address filter entries.
    pub src_match_short: Vec<u16>,
    /// Source-match extended-address filter entries.
    pub src_match_ext: Vec<ExtAddress>,
    /// CCA energy-detect threshold, dBm.
    pub cca_threshold: Option<i8>,
    /// Transmit power, dBm.
    pub transmit_power: Option<i8>,
    /// Radio coexistence enable flag.
    pub coex_enabled: Option<bool>,
    /// Per-channel maximum transmit power.
    pub max_power: MaxPowerTable,
    /// Energy scan in progress: `(channel, duration_ms)`. Re-issued after
    /// recovery so the scan completes despite the reset.
    pub energy_scan: Option<(u8, u16)>,
}

impl ConfigSnapshot {
    /// An empty snapshot; nothing is eligible for replay.
    pub fn new() -> ConfigSnapshot {
        ConfigSnapshot::default()
    }

    /// Record a short-address filter entry, keeping entries unique.
    pub fn add_src_match_short(&mut self, address: u16) {
        if !self.src_match_short.contains(&address) {
            self.src_match_short.push(address);
        }
    }

    /// Drop a short-address filter entry.
    pub fn remove_src_match_short(&mut self, address: u16) {
        self.src_match_short.retain(|&a| a != address);
    }

    /// Record an extended-address filter entry, keeping entries unique.
    pub fn add_src_match_ext(&mut self, address: ExtAddress) {
        if !self.src_match_ext.contains(&address) {
            self.src_match_ext.push(address);
        }
    }

    /// Drop an extended-address filter entry.
    pub fn remove_src_match_ext(&mut self, address: &ExtAddress) {
        self.src_match_ext.retain(|a| a != address);
    }

    /// Forget all filter entries (both tables).
    pub fn clear_src_match(&mut self) {
        self.src_match_short.clear();
        self.src_match_ext.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let snap = ConfigSnapshot::new();
        assert!(snap.pan_id.is_none());
        assert!(snap.mac_key.is_none());
        assert!(snap.src_match_short.is_empty());
        assert!(snap.energy_scan.is_none());
    }

    #[test]
    fn src_match_short_dedup() {
        let mut snap = ConfigSnapshot::new();
        snap.add_src_match_short(0x1234);
        snap.add_src_match_short(0x1234);
        snap.add_src_match_short(0x5678);
        assert_eq!(snap.src_match_short, vec![0x1234, 0x5678]);

        snap.remove_src_match_short(0x1234);
        assert_eq!(snap.src_match_short, vec![0x5678]);
    }

    #[test]
    fn src_match_ext_dedup() {
        let mut snap = ConfigSnapshot::new();
        let a = [1, 2, 3, 4, 5, 6, 7, 8];
        snap.add_src_match_ext(a);
        snap.add_src_match_ext(a);
        assert_eq!(snap.src_match_ext.len(), 1);

        snap.remove_src_match_ext(&a);
        assert!(snap.src_match_ext.is_empty());
    }

    #[test]
    fn clear_src_match_empties_both_tables() {
        let mut snap = ConfigSnapshot::new();
        snap.add_src_match_short(1);
        snap.add_src_match_ext([0; 8]);
        snap.clear_src_match();
        assert!(snap.src_match_short.is_empty());
        assert!(snap.src_match_ext.is_empty());
    }
}
