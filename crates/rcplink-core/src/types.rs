//! Shared radio types: states, frames, and capability constants.

/// IEEE 802.15.4 extended (EUI-64) address, as raw bytes in wire order.
pub type ExtAddress = [u8; 8];

/// Size of a MAC security key in bytes.
pub const MAC_KEY_SIZE: usize = 16;

/// Lowest 2.4 GHz O-QPSK channel number.
pub const CHANNEL_MIN: u8 = 11;

/// Highest 2.4 GHz O-QPSK channel number.
pub const CHANNEL_MAX: u8 = 26;

/// Maximum 802.15.4 PHY payload (PSDU) size in bytes.
pub const FRAME_MAX_SIZE: usize = 127;

/// Radio capability bits, as reported by the co-processor.
///
/// These mirror the capability bitmask property: the driver reads the mask
/// once at startup and branches on individual bits at runtime instead of
/// compiling capability tiers in or out.
pub mod caps {
    /// Radio supports ACK timeout handling in hardware.
    pub const ACK_TIMEOUT: u32 = 1 << 0;
    /// Radio supports energy scanning.
    pub const ENERGY_SCAN: u32 = 1 << 1;
    /// Radio performs transmit retries itself.
    pub const TRANSMIT_RETRIES: u32 = 1 << 2;
    /// Radio performs CSMA backoff itself.
    pub const CSMA_BACKOFF: u32 = 1 << 3;
    /// Radio can transmit directly from the sleep state.
    pub const SLEEP_TO_TX: u32 = 1 << 4;
    /// Radio applies frame security (AES, frame counter) itself.
    pub const TRANSMIT_SEC: u32 = 1 << 5;
    /// Radio supports delayed (scheduled) transmission.
    pub const TRANSMIT_TIMING: u32 = 1 << 6;
}

/// The driver-side radio state machine.
///
/// A single instance lives inside the driver and is mutated only by the
/// state-machine methods (`enable`, `receive`, `sleep`, `transmit`,
/// `disable`) and the `process()` tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// PHY disabled; only `enable` is accepted.
    Disabled,
    /// PHY enabled, receiver off.
    Sleep,
    /// Receiver listening on the cached channel.
    Receive,
    /// A transmit attempt is in flight on the streaming transaction.
    Transmitting,
    /// Transmit completion recorded; the next `process()` tick delivers it.
    TransmitDone,
}

/// Outcome of a transmit attempt, as reported by the co-processor or
/// synthesized by failure recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Frame sent and (if requested) acknowledged.
    Ok,
    /// Frame sent but never acknowledged.
    NoAck,
    /// Clear-channel assessment failed; frame never aired.
    ChannelAccessFailure,
    /// Attempt abandoned (co-processor error or recovery reset).
    Aborted,
}

/// A frame received over the air, with its receive-side metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxRadioFrame {
    /// PHY payload bytes.
    pub psdu: Vec<u8>,
    /// Channel the frame was received on.
    pub channel: u8,
    /// Received signal strength in dBm.
    pub rssi: i8,
    /// Noise floor in dBm at the time of reception.
    pub noise_floor: i8,
    /// Link quality indicator (0-255).
    pub lqi: u8,
    /// Co-processor timestamp of reception, microseconds.
    pub timestamp: u64,
    /// The outgoing ACK for this frame had its frame-pending bit set.
    pub acked_with_frame_pending: bool,
    /// The outgoing ACK was a secured enhanced ACK.
    pub acked_with_sec_enh_ack: bool,
    /// Key index used to secure the enhanced ACK, when applicable.
    pub ack_key_id: u8,
    /// Frame counter used to secure the enhanced ACK, when applicable.
    pub ack_frame_counter: u32,
}

impl RxRadioFrame {
    /// An empty frame placeholder, reused as a parse destination.
    pub fn empty() -> Self {
        RxRadioFrame {
            psdu: Vec::new(),
            channel: 0,
            rssi: 0,
            noise_floor: -128,
            lqi: 0,
            timestamp: 0,
            acked_with_frame_pending: false,
            acked_with_sec_enh_ack: false,
            ack_key_id: 0,
            ack_frame_counter: 0,
        }
    }
}

/// A frame to transmit, with its transmit-side parameters.
///
/// The CSMA/retry fields are forwarded verbatim to the co-processor, which
/// owns the actual medium-access behavior (see [`caps`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRadioFrame {
    /// PHY payload bytes.
    pub psdu: Vec<u8>,
    /// Channel to transmit on.
    pub channel: u8,
    /// Maximum CSMA backoff attempts before reporting channel access failure.
    pub max_csma_backoffs: u8,
    /// Maximum retransmissions after a missing ACK.
    pub max_frame_retries: u8,
    /// Whether CSMA-CA is performed for this frame.
    pub csma_ca_enabled: bool,
    /// The MAC header (frame counter, key index) is already finalized.
    pub is_header_updated: bool,
    /// This is a retransmission of a previously sent frame.
    pub is_a_retx: bool,
    /// Security processing has already been applied to the payload.
    pub is_security_processed: bool,
    /// Delay before transmission, microseconds (0 = immediate).
    pub tx_delay: u32,
    /// Base time the delay is measured from, co-processor clock.
    pub tx_delay_base_time: u32,
}

impl TxRadioFrame {
    /// A transmit frame with immediate, CSMA-enabled defaults.
    pub fn new(psdu: Vec<u8>, channel: u8) -> Self {
        TxRadioFrame {
            psdu,
            channel,
            max_csma_backoffs: 4,
            max_frame_retries: 3,
            csma_ca_enabled: true,
            is_header_updated: false,
            is_a_retx: false,
            is_security_processed: false,
            tx_delay: 0,
            tx_delay_base_time: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_state_equality() {
        assert_eq!(RadioState::Sleep, RadioState::Sleep);
        assert_ne!(RadioState::Sleep, RadioState::Receive);
    }

    #[test]
    fn tx_frame_defaults() {
        let frame = TxRadioFrame::new(vec![0x41, 0x88], 15);
        assert_eq!(frame.channel, 15);
        assert!(frame.csma_ca_enabled);
        assert_eq!(frame.max_frame_retries, 3);
        assert_eq!(frame.tx_delay, 0);
    }

    #[test]
    fn rx_frame_empty() {
        let frame = RxRadioFrame::empty();
        assert!(frame.psdu.is_empty());
        assert_eq!(frame.noise_floor, -128);
    }

    #[test]
    fn channel_bounds() {
        assert!(CHANNEL_MIN < CHANNEL_MAX);
        assert_eq!((CHANNEL_MIN..=CHANNEL_MAX).count(), 16);
    }
}
