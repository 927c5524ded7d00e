//! Asynchronous radio event types.
//!
//! Events are emitted by the driver through a `tokio::sync::broadcast`
//! channel when unsolicited notifications arrive from the co-processor or
//! when an in-flight operation completes asynchronously. The upper-layer
//! MAC subscribes to these instead of registering callbacks.

use crate::types::{RxRadioFrame, TxStatus};

/// An event emitted by the driver.
///
/// Delivered on a best-effort basis through a bounded broadcast channel;
/// slow consumers may miss events under heavy receive load.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A frame was received over the air.
    FrameReceived(RxRadioFrame),

    /// An energy scan finished.
    EnergyScanDone {
        /// The channel that was scanned.
        channel: u8,
        /// Maximum RSSI observed during the scan, dBm.
        max_rssi: i8,
    },

    /// The in-flight transmit attempt completed.
    TransmitDone {
        /// Outcome reported by the co-processor (or `Aborted` if recovery
        /// reset the radio mid-attempt).
        status: TxStatus,
        /// The received ACK frame, when one was captured.
        ack: Option<RxRadioFrame>,
    },

    /// The co-processor reset without being asked to.
    ///
    /// Recovery (when enabled) runs automatically; this event is
    /// informational.
    UnexpectedReset {
        /// The raw reset status code announced by the co-processor.
        status: u32,
    },

    /// A recovery cycle finished and prior configuration was replayed.
    Recovered {
        /// The consecutive-failure count at the time recovery started.
        attempt: u32,
    },
}
