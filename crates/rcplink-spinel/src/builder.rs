//! Fluent builder for constructing [`RcpDriver`] instances.
//!
//! Separates configuration from construction so that callers can set
//! timeout ceilings, the recovery policy, and the interface id before
//! handing over the transport.
//!
//! # Example
//!
//! ```no_run
//! use rcplink_spinel::RcpDriverBuilder;
//! use std::time::Duration;
//!
//! # async fn example(transport: Box<dyn rcplink_core::Transport>) -> rcplink_core::Result<()> {
//! let mut driver = RcpDriverBuilder::new()
//!     .response_timeout(Duration::from_millis(2000))
//!     .max_restorations(5)
//!     .build_with_transport(transport);
//! driver.init(true).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rcplink_core::transport::Transport;

use crate::driver::{RcpDriver, VendorExt};

/// Tunable driver parameters, resolved once at construction.
///
/// Recovery behavior branches on [`max_restorations`](DriverConfig::max_restorations)
/// at runtime, so both the recovering and the fail-fast configuration are
/// exercised in one build.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Interface id stamped into every frame header (0-3); frames for
    /// other interfaces sharing the transport are not ours.
    pub iid: u8,
    /// Ceiling for a single request/response exchange.
    pub response_timeout: Duration,
    /// How long a transmit attempt may stay in flight before it is
    /// declared lost.
    pub tx_wait: Duration,
    /// Maximum consecutive recovery attempts. `0` disables recovery
    /// entirely: any co-processor failure is unrecoverable.
    pub max_restorations: u32,
    /// Increment added to the MAC frame counter during recovery replay so
    /// the restored counter can never reuse a nonce. The right value
    /// depends on worst-case transmit rate across one failure window.
    pub frame_counter_guard: u32,
    /// Whether the periodic clock-offset estimation runs at all.
    pub time_sync_enabled: bool,
    /// Normal clock-offset re-estimation interval.
    pub time_sync_interval: Duration,
    /// Shortened retry interval after a failed time-sync exchange.
    pub time_sync_retry: Duration,
    /// Whether recovery issues a software reset before replaying state.
    pub reset_on_recovery: bool,
    /// Bound on the deferred-notification FIFO.
    pub deferred_capacity: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            iid: 0,
            response_timeout: Duration::from_millis(2000),
            tx_wait: Duration::from_secs(5),
            max_restorations: 0,
            frame_counter_guard: 1000,
            time_sync_enabled: true,
            time_sync_interval: Duration::from_secs(60),
            time_sync_retry: Duration::from_secs(5),
            reset_on_recovery: true,
            deferred_capacity: 16,
            event_capacity: 64,
        }
    }
}

/// Fluent builder for [`RcpDriver`].
///
/// All parameters have working defaults; the simplest usage is
/// `RcpDriverBuilder::new().build_with_transport(transport)`.
#[derive(Default)]
pub struct RcpDriverBuilder {
    config: DriverConfig,
    vendor: Option<Box<dyn VendorExt>>,
}

impl RcpDriverBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> RcpDriverBuilder {
        RcpDriverBuilder {
            config: DriverConfig::default(),
            vendor: None,
        }
    }

    /// Set the interface id (0-3) for multi-radio transports.
    pub fn iid(mut self, iid: u8) -> Self {
        self.config.iid = iid & 0x03;
        self
    }

    /// Set the request/response timeout ceiling (default: 2000 ms).
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Set the transmit-completion deadline (default: 5 s).
    pub fn tx_wait(mut self, timeout: Duration) -> Self {
        self.config.tx_wait = timeout;
        self
    }

    /// Set the recovery ceiling (default: 0, recovery disabled).
    pub fn max_restorations(mut self, count: u32) -> Self {
        self.config.max_restorations = count;
        self
    }

    /// Set the frame-counter guard increment used during recovery replay
    /// (default: 1000).
    pub fn frame_counter_guard(mut self, guard: u32) -> Self {
        self.config.frame_counter_guard = guard;
        self
    }

    /// Enable or disable clock-offset estimation (default: enabled).
    pub fn time_sync(mut self, enabled: bool) -> Self {
        self.config.time_sync_enabled = enabled;
        self
    }

    /// Set the clock-offset re-estimation interval (default: 60 s).
    pub fn time_sync_interval(mut self, interval: Duration) -> Self {
        self.config.time_sync_interval = interval;
        self
    }

    /// Set the early-retry interval after a failed time sync (default: 5 s).
    pub fn time_sync_retry(mut self, interval: Duration) -> Self {
        self.config.time_sync_retry = interval;
        self
    }

    /// Choose whether recovery sends a software reset before replaying
    /// configuration (default: true).
    pub fn reset_on_recovery(mut self, reset: bool) -> Self {
        self.config.reset_on_recovery = reset;
        self
    }

    /// Install a vendor extension consulted for unrecognized property
    /// announcements.
    pub fn vendor(mut self, vendor: Box<dyn VendorExt>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    /// Build an [`RcpDriver`] with a caller-provided transport.
    ///
    /// This is the primary entry point both for production (a serial or
    /// SPI transport) and for testing (a `MockTransport` from
    /// `rcplink-test-harness`). The driver is constructed idle; call
    /// [`RcpDriver::init`] to perform the startup handshake.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> RcpDriver {
        RcpDriver::new(transport, self.config, self.vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_ceilings() {
        let config = DriverConfig::default();
        assert_eq!(config.response_timeout, Duration::from_millis(2000));
        assert_eq!(config.tx_wait, Duration::from_secs(5));
        assert_eq!(config.max_restorations, 0);
        assert_eq!(config.frame_counter_guard, 1000);
        assert_eq!(config.iid, 0);
        assert!(config.reset_on_recovery);
    }

    #[test]
    fn iid_is_masked_to_two_bits() {
        let builder = RcpDriverBuilder::new().iid(7);
        assert_eq!(builder.config.iid, 3);
    }

    #[test]
    fn fluent_chain_applies_all_settings() {
        let builder = RcpDriverBuilder::new()
            .iid(1)
            .response_timeout(Duration::from_millis(250))
            .tx_wait(Duration::from_millis(10))
            .max_restorations(4)
            .frame_counter_guard(5000)
            .time_sync_interval(Duration::from_secs(30))
            .time_sync_retry(Duration::from_secs(2))
            .reset_on_recovery(false);

        let c = &builder.config;
        assert_eq!(c.iid, 1);
        assert_eq!(c.response_timeout, Duration::from_millis(250));
        assert_eq!(c.tx_wait, Duration::from_millis(10));
        assert_eq!(c.max_restorations, 4);
        assert_eq!(c.frame_counter_guard, 5000);
        assert_eq!(c.time_sync_interval, Duration::from_secs(30));
        assert_eq!(c.time_sync_retry, Duration::from_secs(2));
        assert!(!c.reset_on_recovery);
    }
}
