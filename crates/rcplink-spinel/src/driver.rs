//! The Spinel radio co-processor driver.
//!
//! [`RcpDriver`] owns the transport and all protocol state: transaction
//! correlation, the radio state machine, unsolicited-notification
//! handling, failure recovery with configuration replay, and clock-offset
//! estimation. It is single-owner and non-spawning: the application loop
//! calls [`RcpDriver::process`] periodically and `await`s the property
//! operations directly.
//!
//! Exactly one synchronous request may be outstanding at a time; the one
//! exception is the streaming transaction carrying a transmit attempt,
//! which stays in flight until the co-processor reports completion.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use rcplink_core::error::{Error, FailureReason, Result};
use rcplink_core::events::RadioEvent;
use rcplink_core::transport::Transport;
use rcplink_core::types::{
    caps, ExtAddress, RadioState, RxRadioFrame, TxRadioFrame, TxStatus, FRAME_MAX_SIZE,
    MAC_KEY_SIZE,
};

use crate::builder::DriverConfig;
use crate::codec::{
    decode_frame, encode_frame, encode_reset_frame, Header, SpinelFrame, TID_NOTIFICATION,
};
use crate::encoding::{Decoder, Encoder};
use crate::power::decode_channel_mask;
use crate::protocol::{
    cap, prop, promiscuous_mode, scan_state, Command, Status, MD_FLAG_ACKED_FP, MD_FLAG_ACKED_SEC,
    PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR, RESET_STACK,
};
use crate::snapshot::{ConfigSnapshot, MacKeyMaterial};
use crate::tid::TidAllocator;
use crate::timesync::TimeSync;

/// Largest frame the transport may deliver.
const MAX_FRAME_SIZE: usize = 1300;

/// Vendor extension hook.
///
/// Installed through the builder and consulted for `VALUE_IS`
/// announcements whose property key the driver does not recognize.
/// Returning `true` marks the announcement as consumed.
pub trait VendorExt: Send + Sync {
    /// Handle a vendor property announcement; `true` if consumed.
    fn handle_value_is(&mut self, key: u32, payload: &[u8]) -> bool;
}

/// Observability counters maintained by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverMetrics {
    /// Malformed or unexpected frames dropped.
    pub parse_errors: u64,
    /// Request/response and transmit-completion timeouts.
    pub timeouts: u64,
    /// Reset announcements received while the driver was enabled.
    pub unexpected_resets: u64,
    /// Recovery cycles started.
    pub restorations: u64,
}

/// Radio coexistence counters, as reported by the co-processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CoexMetrics {
    pub num_tx_request: u32,
    pub num_tx_grant_immediate: u32,
    pub num_tx_grant_wait: u32,
    pub num_tx_grant_wait_activated: u32,
    pub num_tx_grant_wait_timeout: u32,
    pub num_tx_grant_deactivated_during_request: u32,
    pub num_tx_delayed_grant: u32,
    pub avg_tx_request_to_grant_time: u32,
    pub num_rx_request: u32,
    pub num_rx_grant_immediate: u32,
    pub num_rx_grant_wait: u32,
    pub num_rx_grant_wait_activated: u32,
    pub num_rx_grant_wait_timeout: u32,
    pub num_rx_grant_deactivated_during_request: u32,
    pub num_rx_delayed_grant: u32,
    pub avg_rx_request_to_grant_time: u32,
    pub num_rx_grant_none: u32,
    pub stopped: bool,
    pub num_grant_glitch: u32,
}

/// The one outstanding non-streaming request.
#[derive(Debug)]
struct PendingRequest {
    tid: u8,
    key: u32,
    expected: Command,
    /// Filled in by the response dispatcher; `wait_response` takes it.
    outcome: Option<Result<Vec<u8>>>,
}

/// Failure bookkeeping for the recovery subsystem.
#[derive(Debug, Default)]
struct FailureTracker {
    /// A failure awaiting recovery (or fatal surfacing).
    pending: Option<FailureReason>,
    /// Consecutive recovery attempts without a full success.
    consecutive: u32,
}

impl FailureTracker {
    fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Runs `$body` under the recover-then-retry guard: any pending failure is
/// recovered before the operation, and a failure raised *by* the operation
/// sends it around the loop again. With recovery disabled the operation's
/// own error is surfaced and the driver stays failed.
macro_rules! with_recovery {
    ($self:ident, $body:expr) => {{
        loop {
            match $self.recover_from_failure().await {
                Ok(()) => {}
                Err(e @ Error::Unrecoverable { .. }) => return Err(e),
                Err(_) => continue,
            }
            let result = $body;
            if $self.failure.is_pending() {
                if $self.config.max_restorations == 0 {
                    return result;
                }
                continue;
            }
            return result;
        }
    }};
}

/// Host-side driver for a Spinel radio co-processor.
pub struct RcpDriver {
    transport: Box<dyn Transport>,
    config: DriverConfig,
    vendor: Option<Box<dyn VendorExt>>,

    tids: TidAllocator,
    pending: Option<PendingRequest>,
    /// Streaming tid carrying the in-flight transmit; 0 = none.
    tx_tid: u8,

    /// Notification frames unsafe to handle mid-request, replayed from
    /// `process()`.
    deferred: VecDeque<Vec<u8>>,

    state: RadioState,
    /// The co-processor announced its post-reset status.
    is_ready: bool,

    channel: u8,
    promiscuous: bool,
    rx_sensitivity: i8,
    radio_caps: u32,
    version: String,
    eui64: ExtAddress,
    supports_log_stream: bool,

    snapshot: ConfigSnapshot,
    failure: FailureTracker,
    skip_next_reset: bool,
    last_reset_status: u32,
    metrics: DriverMetrics,

    tx_frame: Option<TxRadioFrame>,
    tx_status: TxStatus,
    tx_ack: Option<RxRadioFrame>,
    tx_deadline: Option<Instant>,

    time_sync: TimeSync,
    epoch: Instant,

    events: broadcast::Sender<RadioEvent>,
}

impl RcpDriver {
    /// Construct an idle driver. Called by the builder.
    pub(crate) fn new(
        transport: Box<dyn Transport>,
        config: DriverConfig,
        vendor: Option<Box<dyn VendorExt>>,
    ) -> RcpDriver {
        let (events, _) = broadcast::channel(config.event_capacity);
        let time_sync = TimeSync::new(config.time_sync_interval, config.time_sync_retry);

        RcpDriver {
            transport,
            config,
            vendor,
            tids: TidAllocator::new(),
            pending: None,
            tx_tid: 0,
            deferred: VecDeque::new(),
            state: RadioState::Disabled,
            is_ready: false,
            channel: 0,
            promiscuous: false,
            rx_sensitivity: 0,
            radio_caps: 0,
            version: String::new(),
            eui64: [0; 8],
            supports_log_stream: false,
            snapshot: ConfigSnapshot::new(),
            failure: FailureTracker::default(),
            skip_next_reset: false,
            last_reset_status: 0,
            metrics: DriverMetrics::default(),
            tx_frame: None,
            tx_status: TxStatus::Aborted,
            tx_ack: None,
            tx_deadline: None,
            time_sync,
            epoch: Instant::now(),
            events,
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    /// Current radio state.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// True once the PHY has been enabled.
    pub fn is_enabled(&self) -> bool {
        self.state != RadioState::Disabled
    }

    /// The cached radio channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Receive sensitivity in dBm, read during `enable`.
    pub fn rx_sensitivity(&self) -> i8 {
        self.rx_sensitivity
    }

    /// Radio capability bitmask (see [`caps`]).
    pub fn radio_caps(&self) -> u32 {
        self.radio_caps
    }

    /// Co-processor firmware version string, read during `init`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Factory EUI-64, read during `init`.
    pub fn eui64(&self) -> ExtAddress {
        self.eui64
    }

    /// Observability counters.
    pub fn metrics(&self) -> DriverMetrics {
        self.metrics
    }

    /// Consecutive recovery attempts without a full success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failure.consecutive
    }

    /// Host monotonic time in microseconds.
    pub fn host_now(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Co-processor time corresponding to now, once the clock offset has
    /// been estimated.
    pub fn now(&self) -> Option<u64> {
        self.time_sync.remote_now(self.host_now())
    }

    /// Skip the reset step of the next recovery cycle.
    ///
    /// For transports where switching interfaces resets the co-processor
    /// as a side effect; the recovery replay still runs, but a second
    /// reset is pointless.
    pub fn skip_next_recovery_reset(&mut self) {
        self.skip_next_reset = true;
    }

    // -----------------------------------------------------------------
    // Startup
    // -----------------------------------------------------------------

    /// Perform the startup handshake.
    ///
    /// Optionally resets the co-processor, waits for its reset
    /// announcement, verifies the protocol version, and reads the
    /// firmware version, EUI-64, capability list, and radio capability
    /// bitmask.
    pub async fn init(&mut self, reset_radio: bool) -> Result<()> {
        if reset_radio {
            self.send_reset(RESET_STACK).await?;
        }

        match self.wait_until_ready().await {
            Ok(()) => {}
            // A failed first handshake goes through recovery below when
            // recovery is enabled.
            Err(Error::Timeout) if self.failure.is_pending() => {}
            Err(e) => return Err(e),
        }

        while self.failure.is_pending() {
            self.recover_from_failure().await?;
        }

        self.check_protocol_version().await?;
        self.version = self.get_version_string().await?;
        self.eui64 = self.get_hwaddr().await?;
        self.probe_capabilities().await?;
        self.radio_caps = self.get_radio_caps_impl().await?;

        info!(version = %self.version, "co-processor ready");
        Ok(())
    }

    async fn check_protocol_version(&mut self) -> Result<()> {
        let payload = self.get_impl(prop::PROTOCOL_VERSION).await?;
        let mut dec = Decoder::new(&payload);
        let major = dec.read_uint_packed()?;
        let minor = dec.read_uint_packed()?;

        if major != PROTOCOL_VERSION_MAJOR || minor != PROTOCOL_VERSION_MINOR {
            error!(
                host_major = PROTOCOL_VERSION_MAJOR,
                host_minor = PROTOCOL_VERSION_MINOR,
                rcp_major = major,
                rcp_minor = minor,
                "protocol version mismatch"
            );
            return Err(Error::NotCapable(format!(
                "protocol version mismatch: host {PROTOCOL_VERSION_MAJOR}.{PROTOCOL_VERSION_MINOR}, rcp {major}.{minor}"
            )));
        }
        Ok(())
    }

    async fn get_version_string(&mut self) -> Result<String> {
        let payload = self.get_impl(prop::NCP_VERSION).await?;
        Ok(Decoder::new(&payload).read_utf8()?.to_string())
    }

    async fn get_hwaddr(&mut self) -> Result<ExtAddress> {
        let payload = self.get_impl(prop::HWADDR).await?;
        let mut eui64 = [0u8; 8];
        eui64.copy_from_slice(Decoder::new(&payload).read_bytes(8)?);
        Ok(eui64)
    }

    async fn probe_capabilities(&mut self) -> Result<()> {
        let payload = self.get_impl(prop::CAPS).await?;
        let mut dec = Decoder::new(&payload);

        let mut supports_mac_raw = false;
        let mut is_rcp = false;
        while !dec.is_empty() {
            match dec.read_uint_packed()? {
                cap::MAC_RAW => supports_mac_raw = true,
                cap::CONFIG_RADIO => is_rcp = true,
                cap::OPENTHREAD_LOG_METADATA => self.supports_log_stream = true,
                other => debug!(capability = other, "unused capability"),
            }
        }

        if !is_rcp {
            return Err(Error::NotCapable(
                "device is not a radio co-processor".into(),
            ));
        }
        if !supports_mac_raw {
            return Err(Error::NotCapable(
                "co-processor lacks raw MAC stream support".into(),
            ));
        }
        Ok(())
    }

    async fn get_radio_caps_impl(&mut self) -> Result<u32> {
        let payload = self.get_impl(prop::RADIO_CAPS).await?;
        Decoder::new(&payload).read_uint_packed()
    }

    // -----------------------------------------------------------------
    // Property RPC engine
    // -----------------------------------------------------------------

    fn alloc_tid(&mut self) -> Result<u8> {
        match self.tids.allocate() {
            0 => Err(Error::Busy),
            tid => Ok(tid),
        }
    }

    /// Send a command and block (up to the response ceiling) for the
    /// tagged reply.
    async fn request(
        &mut self,
        cmd: Command,
        key: u32,
        payload: &[u8],
        expected: Command,
    ) -> Result<Vec<u8>> {
        debug_assert!(
            self.pending.is_none(),
            "second synchronous request while one is outstanding"
        );

        let tid = self.alloc_tid()?;
        let frame = encode_frame(Header::new(self.config.iid, tid), cmd, key, payload);

        if let Err(e) = self.transport.send(&frame).await {
            self.tids.free(tid);
            return Err(e);
        }

        self.pending = Some(PendingRequest {
            tid,
            key,
            expected,
            outcome: None,
        });
        self.wait_response().await
    }

    async fn wait_response(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        loop {
            if let Some(outcome) = self.pending.as_mut().and_then(|p| p.outcome.take()) {
                self.pending = None;
                return outcome;
            }

            // An unexpected reset observed mid-wait fails the request
            // immediately; there is nothing left to wait for.
            if let Some(reason) = self.failure.pending {
                if let Some(req) = self.pending.take() {
                    self.tids.free(req.tid);
                }
                return Err(match reason {
                    FailureReason::Timeout => Error::Timeout,
                    FailureReason::UnexpectedReset => {
                        Error::UnexpectedReset(self.last_reset_status)
                    }
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return self.fail_pending_with_timeout();
            }

            match self.transport.receive(&mut buf, deadline - now).await {
                Ok(n) => {
                    let frame = buf[..n].to_vec();
                    self.handle_received(&frame);
                }
                Err(Error::Timeout) => return self.fail_pending_with_timeout(),
                Err(e) => {
                    if let Some(req) = self.pending.take() {
                        self.tids.free(req.tid);
                    }
                    return Err(e);
                }
            }
        }
    }

    fn fail_pending_with_timeout(&mut self) -> Result<Vec<u8>> {
        if let Some(req) = self.pending.take() {
            self.tids.free(req.tid);
            warn!(tid = req.tid, key = req.key, "response timeout");
        }
        self.note_timeout();
        Err(Error::Timeout)
    }

    fn note_timeout(&mut self) {
        self.metrics.timeouts += 1;
        self.failure.pending = Some(FailureReason::Timeout);
    }

    async fn get_impl(&mut self, key: u32) -> Result<Vec<u8>> {
        self.request(Command::PropValueGet, key, &[], Command::PropValueIs)
            .await
    }

    async fn get_with_param_impl(&mut self, key: u32, param: &[u8]) -> Result<Vec<u8>> {
        self.request(Command::PropValueGet, key, param, Command::PropValueIs)
            .await
    }

    async fn set_impl(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        self.request(Command::PropValueSet, key, payload, Command::PropValueIs)
            .await
            .map(|_| ())
    }

    async fn insert_impl(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        self.request(
            Command::PropValueInsert,
            key,
            payload,
            Command::PropValueInserted,
        )
        .await
        .map(|_| ())
    }

    async fn remove_impl(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        self.request(
            Command::PropValueRemove,
            key,
            payload,
            Command::PropValueRemoved,
        )
        .await
        .map(|_| ())
    }

    async fn set_bool_impl(&mut self, key: u32, value: bool) -> Result<()> {
        let mut enc = Encoder::new();
        enc.put_bool(value);
        self.set_impl(key, &enc.finish()).await
    }

    async fn send_reset(&mut self, reset_type: u8) -> Result<()> {
        let frame = encode_reset_frame(Header::new(self.config.iid, TID_NOTIFICATION), reset_type);
        self.transport.send(&frame).await
    }

    /// Wait for the co-processor's post-reset announcement.
    async fn wait_until_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut buf = vec![0u8; MAX_FRAME_SIZE];

        while !self.is_ready {
            let now = Instant::now();
            if now >= deadline {
                warn!("timed out waiting for reset announcement");
                self.note_timeout();
                return Err(Error::Timeout);
            }

            match self.transport.receive(&mut buf, deadline - now).await {
                Ok(n) => {
                    let frame = buf[..n].to_vec();
                    self.handle_received(&frame);
                }
                Err(Error::Timeout) => {
                    warn!("timed out waiting for reset announcement");
                    self.note_timeout();
                    return Err(Error::Timeout);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Frame dispatch
    // -----------------------------------------------------------------

    fn note_parse_error(&mut self, context: &str, e: &Error) {
        self.metrics.parse_errors += 1;
        warn!(error = %e, "{context}");
    }

    fn handle_received(&mut self, bytes: &[u8]) {
        let frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.note_parse_error("dropping malformed frame", &e);
                return;
            }
        };

        if frame.header.iid() != self.config.iid {
            debug!(iid = frame.header.iid(), "frame for another interface");
            return;
        }

        if frame.header.tid() == TID_NOTIFICATION {
            self.handle_notification(&frame, bytes);
        } else {
            self.handle_response(&frame);
        }
    }

    /// Properties whose handlers may re-enter the caller's context; these
    /// are deferred to `process()` instead of being handled inline.
    fn is_safe_to_handle_now(key: u32) -> bool {
        !(key == prop::STREAM_RAW || key == prop::MAC_ENERGY_SCAN_RESULT)
    }

    fn handle_notification(&mut self, frame: &SpinelFrame, raw: &[u8]) {
        match Command::from_u32(frame.cmd) {
            Some(Command::PropValueIs) => {
                if !Self::is_safe_to_handle_now(frame.key) {
                    self.defer_frame(raw);
                    return;
                }
                self.handle_value_is(frame.key, &frame.payload);
            }
            Some(Command::PropValueInserted) | Some(Command::PropValueRemoved) => {
                debug!(cmd = frame.cmd, key = frame.key, "ignored notification");
            }
            _ => {
                self.note_parse_error(
                    "unexpected notification command",
                    &Error::Parse(format!("command {}", frame.cmd)),
                );
            }
        }
    }

    fn defer_frame(&mut self, raw: &[u8]) {
        if self.deferred.len() >= self.config.deferred_capacity {
            warn!("deferred-notification queue full, dropping frame");
            return;
        }
        self.deferred.push_back(raw.to_vec());
    }

    fn drain_deferred(&mut self) {
        while let Some(raw) = self.deferred.pop_front() {
            match decode_frame(&raw) {
                Ok(frame) if Command::from_u32(frame.cmd) == Some(Command::PropValueIs) => {
                    self.handle_value_is(frame.key, &frame.payload);
                }
                Ok(_) => {}
                Err(e) => self.note_parse_error("dropping saved frame", &e),
            }
        }
    }

    fn handle_value_is(&mut self, key: u32, payload: &[u8]) {
        match key {
            prop::STREAM_RAW => match self.parse_radio_frame(payload) {
                Ok(Some(frame)) => self.radio_receive(frame),
                Ok(None) => {}
                Err(e) => self.note_parse_error("bad received-frame notification", &e),
            },
            prop::LAST_STATUS => {
                let status = match Decoder::new(payload).read_uint_packed() {
                    Ok(code) => Status(code),
                    Err(e) => {
                        self.note_parse_error("bad status notification", &e);
                        return;
                    }
                };
                if status.is_reset() {
                    if self.is_enabled() {
                        self.handle_unexpected_reset(status);
                    } else {
                        info!(status = status.0, "co-processor reset");
                        self.is_ready = true;
                    }
                } else {
                    info!(status = status.0, "co-processor status");
                }
            }
            prop::MAC_ENERGY_SCAN_RESULT => {
                let mut dec = Decoder::new(payload);
                let parsed = dec.read_u8().and_then(|ch| dec.read_i8().map(|r| (ch, r)));
                match parsed {
                    Ok((channel, max_rssi)) => {
                        self.snapshot.energy_scan = None;
                        debug!(channel, max_rssi, "energy scan done");
                        self.emit(RadioEvent::EnergyScanDone { channel, max_rssi });
                    }
                    Err(e) => self.note_parse_error("bad energy-scan result", &e),
                }
            }
            prop::STREAM_DEBUG => {
                debug!(target: "rcp", "{}", String::from_utf8_lossy(payload).trim_end());
            }
            prop::STREAM_LOG if self.supports_log_stream => {
                self.handle_log_stream(payload);
            }
            _ => {
                if let Some(vendor) = self.vendor.as_mut() {
                    if vendor.handle_value_is(key, payload) {
                        return;
                    }
                }
                debug!(key, "unhandled property announcement");
            }
        }
    }

    fn handle_log_stream(&mut self, payload: &[u8]) {
        let mut dec = Decoder::new(payload);
        let (message, level) = match dec.read_utf8().and_then(|m| dec.read_u8().map(|l| (m, l))) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.note_parse_error("bad log-stream notification", &e);
                return;
            }
        };

        // Levels follow syslog severity: 0..=2 critical, 3..=4 warning,
        // 5 notice, 6 info, 7 debug.
        match level {
            0..=2 => error!(target: "rcp", "{message}"),
            3..=4 => warn!(target: "rcp", "{message}"),
            5 | 6 => info!(target: "rcp", "{message}"),
            _ => debug!(target: "rcp", "{message}"),
        }
    }

    fn handle_unexpected_reset(&mut self, status: Status) {
        self.metrics.unexpected_resets += 1;
        self.last_reset_status = status.0;
        error!(status = status.0, "unexpected co-processor reset");
        self.emit(RadioEvent::UnexpectedReset { status: status.0 });
        self.failure.pending = Some(FailureReason::UnexpectedReset);
    }

    fn handle_response(&mut self, frame: &SpinelFrame) {
        let tid = frame.header.tid();

        match Command::from_u32(frame.cmd) {
            Some(cmd) if cmd.is_reply() => {
                if self.pending.as_ref().is_some_and(|p| p.tid == tid) {
                    let outcome = self.waiting_response_outcome(cmd, frame);
                    self.tids.free(tid);
                    if let Some(pending) = self.pending.as_mut() {
                        pending.outcome = Some(outcome);
                    }
                } else if self.tx_tid != 0 && self.tx_tid == tid {
                    if self.state == RadioState::Transmitting {
                        self.handle_transmit_done(cmd, frame);
                    }
                    self.tids.free(tid);
                    self.tx_tid = 0;
                } else {
                    warn!(tid, "response for unknown transaction");
                }
            }
            _ => {
                self.note_parse_error(
                    "unexpected response command",
                    &Error::Parse(format!("command {}", frame.cmd)),
                );
            }
        }
    }

    fn waiting_response_outcome(&self, cmd: Command, frame: &SpinelFrame) -> Result<Vec<u8>> {
        let pending = self.pending.as_ref().expect("checked by caller");

        if frame.key == prop::LAST_STATUS && pending.key != prop::LAST_STATUS {
            // The outcome indicator: decode the status and map it.
            let code = Decoder::new(&frame.payload).read_uint_packed()?;
            Status(code).into_result()?;
            return Ok(Vec::new());
        }

        if cmd == pending.expected && frame.key == pending.key {
            return Ok(frame.payload.clone());
        }

        debug!(
            cmd = frame.cmd,
            key = frame.key,
            expected = pending.expected as u32,
            "mismatched reply"
        );
        Err(Error::Dropped)
    }

    // -----------------------------------------------------------------
    // Radio frame parsing and delivery
    // -----------------------------------------------------------------

    /// Parse a radio frame plus metadata; an empty payload means "no
    /// frame" (e.g. a transmit completed without capturing an ACK).
    fn parse_radio_frame(&self, payload: &[u8]) -> Result<Option<RxRadioFrame>> {
        if payload.is_empty() {
            return Ok(None);
        }

        let mut dec = Decoder::new(payload);

        let psdu = dec.read_data_with_len()?;
        if psdu.len() > FRAME_MAX_SIZE {
            return Err(Error::Parse(format!("psdu of {} bytes", psdu.len())));
        }
        let rssi = dec.read_i8()?;
        let noise_floor = dec.read_i8()?;
        let flags = dec.read_u16()?;

        let mut phy = dec.read_struct()?;
        let channel = phy.read_u8()?;
        let lqi = phy.read_u8()?;
        let timestamp = phy.read_u64()?;

        let mut vendor = dec.read_struct()?;
        let receive_error = vendor.read_uint_packed()?;

        let mut frame = RxRadioFrame {
            psdu: psdu.to_vec(),
            channel,
            rssi,
            noise_floor,
            lqi,
            timestamp,
            acked_with_frame_pending: flags & MD_FLAG_ACKED_FP != 0,
            acked_with_sec_enh_ack: flags & MD_FLAG_ACKED_SEC != 0,
            ack_key_id: 0,
            ack_frame_counter: 0,
        };

        if self.radio_caps & caps::TRANSMIT_SEC != 0 {
            let mut sec = dec.read_struct()?;
            frame.ack_key_id = sec.read_u8()?;
            frame.ack_frame_counter = sec.read_u32()?;
        }

        if receive_error != 0 {
            // Receive-side error reported by the radio; the frame content
            // is not usable.
            debug!(receive_error, "frame dropped by radio");
            return Err(Error::Dropped);
        }

        Ok(Some(frame))
    }

    fn radio_receive(&mut self, frame: RxRadioFrame) {
        if !self.promiscuous
            && matches!(self.state, RadioState::Disabled | RadioState::Sleep)
        {
            debug!("dropping frame received while not listening");
            return;
        }
        self.emit(RadioEvent::FrameReceived(frame));
    }

    fn handle_transmit_done(&mut self, cmd: Command, frame: &SpinelFrame) {
        if cmd != Command::PropValueIs || frame.key != prop::LAST_STATUS {
            self.note_parse_error(
                "unexpected transmit completion",
                &Error::Parse(format!("cmd {} key {}", frame.cmd, frame.key)),
            );
            return;
        }

        let mut dec = Decoder::new(&frame.payload);
        let parsed = (|| -> Result<(Status, bool, bool, Vec<u8>)> {
            let status = Status(dec.read_uint_packed()?);
            let frame_pending = dec.read_bool()?;
            let header_updated = dec.read_bool()?;
            Ok((
                status,
                frame_pending,
                header_updated,
                dec.read_data_remaining().to_vec(),
            ))
        })();

        let (status, _frame_pending, header_updated, rest) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.note_parse_error("bad transmit completion", &e);
                return;
            }
        };

        self.tx_ack = None;
        self.tx_status = match status {
            Status::OK => {
                match self.parse_radio_frame(&rest) {
                    Ok(ack) => self.tx_ack = ack,
                    Err(e) => self.note_parse_error("bad ack in transmit completion", &e),
                }
                TxStatus::Ok
            }
            Status::NO_ACK => TxStatus::NoAck,
            Status::CCA_FAILURE => TxStatus::ChannelAccessFailure,
            other => {
                debug!(status = other.0, "transmit failed");
                TxStatus::Aborted
            }
        };

        if let Some(tx) = self.tx_frame.as_mut() {
            if header_updated {
                tx.is_header_updated = true;
            }
        }

        self.state = RadioState::TransmitDone;
    }

    // -----------------------------------------------------------------
    // Process loop
    // -----------------------------------------------------------------

    /// Drive the driver forward.
    ///
    /// Called periodically by the application loop: replays deferred
    /// notifications, polls the transport, ticks the state machine, and
    /// runs time sync, interleaving a recovery check after each step.
    pub async fn process(&mut self) -> Result<()> {
        self.drain_deferred();
        self.recover_from_failure().await?;

        self.poll_transport().await?;
        self.recover_from_failure().await?;

        self.drain_deferred();
        self.recover_from_failure().await?;

        self.tick_radio_state();
        self.recover_from_failure().await?;

        self.sync_time_if_due().await;
        self.recover_from_failure().await?;

        Ok(())
    }

    /// Drain every frame the transport already has buffered.
    async fn poll_transport(&mut self) -> Result<()> {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        loop {
            match self.transport.receive(&mut buf, Duration::ZERO).await {
                Ok(n) => {
                    let frame = buf[..n].to_vec();
                    self.handle_received(&frame);
                }
                Err(Error::Timeout) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn tick_radio_state(&mut self) {
        match self.state {
            RadioState::TransmitDone => {
                self.state = RadioState::Receive;
                self.tx_deadline = None;
                self.tx_frame = None;
                let status = self.tx_status;
                let ack = self.tx_ack.take();
                self.emit(RadioEvent::TransmitDone { status, ack });
            }
            RadioState::Transmitting => {
                if self.tx_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    // The attempt was queued but completion never came;
                    // this is a protocol-level timeout even though no RPC
                    // call is blocked.
                    warn!("transmit completion timeout");
                    self.note_timeout();
                }
            }
            _ => {}
        }
    }

    async fn sync_time_if_due(&mut self) {
        if !self.config.time_sync_enabled
            || !self.is_ready
            || !self.time_sync.is_due(self.host_now())
        {
            return;
        }

        debug!("estimating co-processor clock offset");

        // Dummy timestamp payload keeps the request the same length as
        // the response, balancing the propagation terms.
        let mut enc = Encoder::new();
        enc.put_u64(0);
        let param = enc.finish();

        let local_tx = self.host_now();
        let result = self.get_with_param_impl(prop::RCP_TIMESTAMP, &param).await;
        let local_rx = self.host_now();

        match result.and_then(|payload| Decoder::new(&payload).read_u64()) {
            Ok(remote) => self.time_sync.record_success(local_tx, local_rx, remote),
            Err(e) => {
                debug!(error = %e, "time sync exchange failed");
                self.time_sync.record_failure(local_rx);
            }
        }
    }

    // -----------------------------------------------------------------
    // Failure recovery
    // -----------------------------------------------------------------

    async fn recover_from_failure(&mut self) -> Result<()> {
        let Some(reason) = self.failure.pending else {
            return Ok(());
        };

        if self.config.max_restorations == 0 {
            error!(%reason, "co-processor failure with recovery disabled");
            return Err(Error::Unrecoverable { reason, attempts: 0 });
        }

        self.failure.pending = None;
        self.metrics.restorations += 1;
        self.failure.consecutive += 1;
        let attempt = self.failure.consecutive;

        if attempt > self.config.max_restorations {
            error!(attempt, "too many co-processor failures, giving up");
            return Err(Error::Unrecoverable {
                reason,
                attempts: attempt,
            });
        }

        warn!(
            attempt,
            max = self.config.max_restorations,
            %reason,
            "recovering co-processor"
        );

        let prior_state = self.state;
        self.state = RadioState::Disabled;
        self.deferred.clear();
        self.tids.reset();
        self.pending = None;
        self.tx_tid = 0;
        self.is_ready = false;
        self.time_sync.invalidate();

        if self.config.reset_on_recovery && !self.skip_next_reset {
            // Software reset first; fall back to the reset line when the
            // transport cannot deliver the command.
            if self.send_reset(RESET_STACK).await.is_err() {
                self.transport.hardware_reset().await?;
            }
        }
        self.skip_next_reset = false;

        self.wait_until_ready().await?;

        if prior_state != RadioState::Disabled {
            self.set_bool_impl(prop::PHY_ENABLED, true).await?;
            self.state = RadioState::Sleep;
        }

        self.restore_properties().await?;

        match prior_state {
            RadioState::Disabled | RadioState::Sleep => {}
            RadioState::Receive => {
                self.set_bool_impl(prop::MAC_RAW_STREAM_ENABLED, true).await?;
                self.state = RadioState::Receive;
            }
            RadioState::Transmitting | RadioState::TransmitDone => {
                self.set_bool_impl(prop::MAC_RAW_STREAM_ENABLED, true).await?;
                // The in-flight attempt is lost; resolve it as aborted so
                // the next tick completes the transmit cycle.
                self.tx_status = TxStatus::Aborted;
                self.tx_ack = None;
                self.state = RadioState::TransmitDone;
            }
        }

        if let Some((channel, duration_ms)) = self.snapshot.energy_scan {
            self.energy_scan_impl(channel, duration_ms).await?;
        }

        self.failure.consecutive -= 1;
        info!("co-processor recovery complete");
        self.emit(RadioEvent::Recovered { attempt });
        Ok(())
    }

    /// Replay the configuration snapshot in its fixed order.
    async fn restore_properties(&mut self) -> Result<()> {
        if let Some(pan_id) = self.snapshot.pan_id {
            let mut enc = Encoder::new();
            enc.put_u16(pan_id);
            self.set_impl(prop::MAC_15_4_PANID, &enc.finish()).await?;
        }
        if let Some(address) = self.snapshot.short_address {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            self.set_impl(prop::MAC_15_4_SADDR, &enc.finish()).await?;
        }
        if let Some(address) = self.snapshot.ext_address {
            self.set_impl(prop::MAC_15_4_LADDR, &address).await?;
        }
        if let Some(channel) = self.snapshot.channel {
            let mut enc = Encoder::new();
            enc.put_u8(channel);
            self.set_impl(prop::PHY_CHAN, &enc.finish()).await?;
        }

        if let Some(key) = self.snapshot.mac_key.clone() {
            let payload = encode_mac_key(&key);
            self.set_impl(prop::RCP_MAC_KEY, &payload).await?;
        }

        if let Some(counter) = self.snapshot.frame_counter {
            // The pre-failure counter may be stale by however many frames
            // the co-processor secured before dying; the guard increment
            // keeps the restored counter ahead of any nonce already used.
            let mut enc = Encoder::new();
            enc.put_u32(counter.wrapping_add(self.config.frame_counter_guard));
            self.set_impl(prop::RCP_MAC_FRAME_COUNTER, &enc.finish())
                .await?;
        }

        if let Some(enabled) = self.snapshot.src_match_enabled {
            self.set_bool_impl(prop::MAC_SRC_MATCH_ENABLED, enabled)
                .await?;
        }
        for address in self.snapshot.src_match_short.clone() {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            self.insert_impl(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &enc.finish())
                .await?;
        }
        for address in self.snapshot.src_match_ext.clone() {
            self.insert_impl(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &address)
                .await?;
        }

        if let Some(threshold) = self.snapshot.cca_threshold {
            let mut enc = Encoder::new();
            enc.put_i8(threshold);
            self.set_impl(prop::PHY_CCA_THRESHOLD, &enc.finish()).await?;
        }
        if let Some(power) = self.snapshot.transmit_power {
            let mut enc = Encoder::new();
            enc.put_i8(power);
            self.set_impl(prop::PHY_TX_POWER, &enc.finish()).await?;
        }
        if let Some(enabled) = self.snapshot.coex_enabled {
            self.set_bool_impl(prop::RADIO_COEX_ENABLE, enabled).await?;
        }

        let limits: Vec<(u8, i8)> = self.snapshot.max_power.iter().collect();
        for (channel, max_power) in limits {
            let mut enc = Encoder::new();
            enc.put_u8(channel).put_i8(max_power);
            match self.set_impl(prop::PHY_CHAN_MAX_POWER, &enc.finish()).await {
                Ok(()) => {}
                // Older firmware predates per-channel limits.
                Err(Error::PropertyNotFound) => {
                    debug!(channel, "max-power property unsupported, skipping")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------
    // Radio state machine
    // -----------------------------------------------------------------

    /// Enable the PHY, replaying any already-configured addresses and
    /// reading the receive sensitivity.
    pub async fn enable(&mut self) -> Result<()> {
        with_recovery!(self, self.enable_impl().await)
    }

    async fn enable_impl(&mut self) -> Result<()> {
        if self.is_enabled() {
            return Ok(());
        }

        self.set_bool_impl(prop::PHY_ENABLED, true).await?;
        if let Some(pan_id) = self.snapshot.pan_id {
            let mut enc = Encoder::new();
            enc.put_u16(pan_id);
            self.set_impl(prop::MAC_15_4_PANID, &enc.finish()).await?;
        }
        if let Some(address) = self.snapshot.short_address {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            self.set_impl(prop::MAC_15_4_SADDR, &enc.finish()).await?;
        }

        let payload = self.get_impl(prop::PHY_RX_SENSITIVITY).await?;
        self.rx_sensitivity = Decoder::new(&payload).read_i8()?;

        self.state = RadioState::Sleep;
        Ok(())
    }

    /// Disable the PHY. Rejected while a transmit is in flight.
    pub async fn disable(&mut self) -> Result<()> {
        with_recovery!(self, self.disable_impl().await)
    }

    async fn disable_impl(&mut self) -> Result<()> {
        match self.state {
            RadioState::Disabled => return Ok(()),
            RadioState::Transmitting => return Err(Error::InvalidState),
            RadioState::Receive | RadioState::TransmitDone => {
                self.set_bool_impl(prop::MAC_RAW_STREAM_ENABLED, false).await?;
            }
            RadioState::Sleep => {}
        }

        self.set_bool_impl(prop::PHY_ENABLED, false).await?;
        self.state = RadioState::Disabled;
        self.tx_deadline = None;
        Ok(())
    }

    /// Start listening on `channel`.
    pub async fn receive(&mut self, channel: u8) -> Result<()> {
        with_recovery!(self, self.receive_impl(channel).await)
    }

    async fn receive_impl(&mut self, channel: u8) -> Result<()> {
        if self.state == RadioState::Disabled {
            return Err(Error::InvalidState);
        }

        if self.channel != channel {
            let mut enc = Encoder::new();
            enc.put_u8(channel);
            self.set_impl(prop::PHY_CHAN, &enc.finish()).await?;
            self.channel = channel;
            self.snapshot.channel = Some(channel);
        }

        if self.state == RadioState::Sleep {
            self.set_bool_impl(prop::MAC_RAW_STREAM_ENABLED, true).await?;
        }

        if self.tx_tid != 0 {
            self.tids.free(self.tx_tid);
            self.tx_tid = 0;
        }

        self.state = RadioState::Receive;
        Ok(())
    }

    /// Turn the receiver off.
    pub async fn sleep(&mut self) -> Result<()> {
        with_recovery!(self, self.sleep_impl().await)
    }

    async fn sleep_impl(&mut self) -> Result<()> {
        match self.state {
            RadioState::Receive => {
                self.set_bool_impl(prop::MAC_RAW_STREAM_ENABLED, false).await?;
                self.state = RadioState::Sleep;
                Ok(())
            }
            RadioState::Sleep => Ok(()),
            _ => Err(Error::InvalidState),
        }
    }

    /// Queue a transmit attempt on the streaming transaction.
    ///
    /// The call returns once the attempt has been handed to the
    /// co-processor; completion is delivered later as a
    /// [`RadioEvent::TransmitDone`] from the `process()` tick.
    pub async fn transmit(&mut self, frame: TxRadioFrame) -> Result<()> {
        with_recovery!(self, self.transmit_impl(&frame).await)
    }

    async fn transmit_impl(&mut self, frame: &TxRadioFrame) -> Result<()> {
        let can_transmit = self.state == RadioState::Receive
            || (self.state == RadioState::Sleep && self.radio_caps & caps::SLEEP_TO_TX != 0);
        if !can_transmit {
            return Err(Error::InvalidState);
        }

        // Not allowed to queue another frame before the last one is done.
        if self.tx_tid != 0 {
            return Err(Error::Busy);
        }

        let tid = self.alloc_tid()?;

        let mut enc = Encoder::new();
        enc.put_data_with_len(&frame.psdu)
            .put_u8(frame.channel)
            .put_u8(frame.max_csma_backoffs)
            .put_u8(frame.max_frame_retries)
            .put_bool(frame.csma_ca_enabled)
            .put_bool(frame.is_header_updated)
            .put_bool(frame.is_a_retx)
            .put_bool(frame.is_security_processed)
            .put_u32(frame.tx_delay)
            .put_u32(frame.tx_delay_base_time);

        let wire = encode_frame(
            Header::new(self.config.iid, tid),
            Command::PropValueSet,
            prop::STREAM_RAW,
            &enc.finish(),
        );

        if let Err(e) = self.transport.send(&wire).await {
            self.tids.free(tid);
            return Err(e);
        }

        self.tx_tid = tid;
        self.tx_frame = Some(frame.clone());
        self.channel = frame.channel;
        self.snapshot.channel = Some(frame.channel);
        self.state = RadioState::Transmitting;
        self.tx_deadline = Some(Instant::now() + self.config.tx_wait);
        Ok(())
    }

    /// Start an energy scan; the result arrives as
    /// [`RadioEvent::EnergyScanDone`].
    pub async fn energy_scan(&mut self, channel: u8, duration_ms: u16) -> Result<()> {
        if self.radio_caps & caps::ENERGY_SCAN == 0 {
            return Err(Error::NotCapable("energy scan unsupported".into()));
        }
        with_recovery!(self, self.energy_scan_impl(channel, duration_ms).await)
    }

    async fn energy_scan_impl(&mut self, channel: u8, duration_ms: u16) -> Result<()> {
        self.snapshot.energy_scan = Some((channel, duration_ms));

        self.set_impl(prop::MAC_SCAN_MASK, &[channel]).await?;

        let mut enc = Encoder::new();
        enc.put_u16(duration_ms);
        self.set_impl(prop::MAC_SCAN_PERIOD, &enc.finish()).await?;

        let mut enc = Encoder::new();
        enc.put_u8(scan_state::ENERGY);
        self.set_impl(prop::MAC_SCAN_STATE, &enc.finish()).await?;

        self.channel = channel;
        self.snapshot.channel = Some(channel);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Property operations
    // -----------------------------------------------------------------

    /// Set the PAN identifier.
    pub async fn set_pan_id(&mut self, pan_id: u16) -> Result<()> {
        if self.snapshot.pan_id == Some(pan_id) {
            return Ok(());
        }
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u16(pan_id);
            let result = self.set_impl(prop::MAC_15_4_PANID, &enc.finish()).await;
            if result.is_ok() {
                self.snapshot.pan_id = Some(pan_id);
            }
            result
        })
    }

    /// The cached PAN identifier, once set.
    pub fn pan_id(&self) -> Option<u16> {
        self.snapshot.pan_id
    }

    /// Set the short MAC address.
    pub async fn set_short_address(&mut self, address: u16) -> Result<()> {
        if self.snapshot.short_address == Some(address) {
            return Ok(());
        }
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            let result = self.set_impl(prop::MAC_15_4_SADDR, &enc.finish()).await;
            if result.is_ok() {
                self.snapshot.short_address = Some(address);
            }
            result
        })
    }

    /// Set the extended MAC address.
    pub async fn set_extended_address(&mut self, address: ExtAddress) -> Result<()> {
        if self.snapshot.ext_address == Some(address) {
            return Ok(());
        }
        with_recovery!(self, {
            let result = self.set_impl(prop::MAC_15_4_LADDR, &address).await;
            if result.is_ok() {
                self.snapshot.ext_address = Some(address);
            }
            result
        })
    }

    /// Push MAC key material to the co-processor.
    pub async fn set_mac_key(
        &mut self,
        key_id_mode: u8,
        key_id: u8,
        prev: [u8; MAC_KEY_SIZE],
        curr: [u8; MAC_KEY_SIZE],
        next: [u8; MAC_KEY_SIZE],
    ) -> Result<()> {
        let key = MacKeyMaterial {
            key_id_mode,
            key_id,
            prev,
            curr,
            next,
        };
        with_recovery!(self, {
            let payload = encode_mac_key(&key);
            let result = self.set_impl(prop::RCP_MAC_KEY, &payload).await;
            if result.is_ok() {
                self.snapshot.mac_key = Some(key.clone());
            }
            result
        })
    }

    /// Set the MAC frame counter.
    pub async fn set_mac_frame_counter(&mut self, counter: u32) -> Result<()> {
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u32(counter);
            let result = self.set_impl(prop::RCP_MAC_FRAME_COUNTER, &enc.finish()).await;
            if result.is_ok() {
                self.snapshot.frame_counter = Some(counter);
            }
            result
        })
    }

    /// Enable or disable source-address-match filtering.
    pub async fn enable_src_match(&mut self, enabled: bool) -> Result<()> {
        with_recovery!(self, {
            let result = self.set_bool_impl(prop::MAC_SRC_MATCH_ENABLED, enabled).await;
            if result.is_ok() {
                self.snapshot.src_match_enabled = Some(enabled);
            }
            result
        })
    }

    /// Add a short address to the source-match table.
    pub async fn add_src_match_short(&mut self, address: u16) -> Result<()> {
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            let result = self
                .insert_impl(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &enc.finish())
                .await;
            if result.is_ok() {
                self.snapshot.add_src_match_short(address);
            }
            result
        })
    }

    /// Remove a short address from the source-match table.
    pub async fn clear_src_match_short(&mut self, address: u16) -> Result<()> {
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u16(address);
            let result = self
                .remove_impl(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &enc.finish())
                .await;
            if result.is_ok() {
                self.snapshot.remove_src_match_short(address);
            }
            result
        })
    }

    /// Add an extended address to the source-match table.
    pub async fn add_src_match_ext(&mut self, address: ExtAddress) -> Result<()> {
        with_recovery!(self, {
            let result = self
                .insert_impl(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &address)
                .await;
            if result.is_ok() {
                self.snapshot.add_src_match_ext(address);
            }
            result
        })
    }

    /// Remove an extended address from the source-match table.
    pub async fn clear_src_match_ext(&mut self, address: ExtAddress) -> Result<()> {
        with_recovery!(self, {
            let result = self
                .remove_impl(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &address)
                .await;
            if result.is_ok() {
                self.snapshot.remove_src_match_ext(&address);
            }
            result
        })
    }

    /// Drop every short entry from the source-match table.
    pub async fn clear_src_match_short_entries(&mut self) -> Result<()> {
        with_recovery!(self, {
            let result = self.set_impl(prop::MAC_SRC_MATCH_SHORT_ADDRESSES, &[]).await;
            if result.is_ok() {
                self.snapshot.src_match_short.clear();
            }
            result
        })
    }

    /// Drop every extended entry from the source-match table.
    pub async fn clear_src_match_ext_entries(&mut self) -> Result<()> {
        with_recovery!(self, {
            let result = self
                .set_impl(prop::MAC_SRC_MATCH_EXTENDED_ADDRESSES, &[])
                .await;
            if result.is_ok() {
                self.snapshot.src_match_ext.clear();
            }
            result
        })
    }

    /// Set the CCA energy-detect threshold in dBm.
    pub async fn set_cca_energy_detect_threshold(&mut self, threshold: i8) -> Result<()> {
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_i8(threshold);
            let result = self.set_impl(prop::PHY_CCA_THRESHOLD, &enc.finish()).await;
            if result.is_ok() {
                self.snapshot.cca_threshold = Some(threshold);
            }
            result
        })
    }

    /// Read the CCA energy-detect threshold in dBm.
    pub async fn get_cca_energy_detect_threshold(&mut self) -> Result<i8> {
        with_recovery!(self, {
            match self.get_impl(prop::PHY_CCA_THRESHOLD).await {
                Ok(payload) => Decoder::new(&payload).read_i8(),
                Err(e) => Err(e),
            }
        })
    }

    /// Set the transmit power in dBm.
    pub async fn set_transmit_power(&mut self, power: i8) -> Result<()> {
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_i8(power);
            let result = self.set_impl(prop::PHY_TX_POWER, &enc.finish()).await;
            if result.is_ok() {
                self.snapshot.transmit_power = Some(power);
            }
            result
        })
    }

    /// Read the transmit power in dBm.
    pub async fn get_transmit_power(&mut self) -> Result<i8> {
        with_recovery!(self, {
            match self.get_impl(prop::PHY_TX_POWER).await {
                Ok(payload) => Decoder::new(&payload).read_i8(),
                Err(e) => Err(e),
            }
        })
    }

    /// Read the instantaneous RSSI in dBm.
    pub async fn get_rssi(&mut self) -> Result<i8> {
        with_recovery!(self, {
            match self.get_impl(prop::PHY_RSSI).await {
                Ok(payload) => Decoder::new(&payload).read_i8(),
                Err(e) => Err(e),
            }
        })
    }

    /// Enable or disable radio coexistence.
    pub async fn set_coex_enabled(&mut self, enabled: bool) -> Result<()> {
        with_recovery!(self, {
            let result = self.set_bool_impl(prop::RADIO_COEX_ENABLE, enabled).await;
            if result.is_ok() {
                self.snapshot.coex_enabled = Some(enabled);
            }
            result
        })
    }

    /// Read the radio coexistence enable flag.
    pub async fn is_coex_enabled(&mut self) -> Result<bool> {
        with_recovery!(self, {
            match self.get_impl(prop::RADIO_COEX_ENABLE).await {
                Ok(payload) => Decoder::new(&payload).read_bool(),
                Err(e) => Err(e),
            }
        })
    }

    /// Read the radio coexistence counters.
    pub async fn get_coex_metrics(&mut self) -> Result<CoexMetrics> {
        with_recovery!(self, {
            match self.get_impl(prop::RADIO_COEX_METRICS).await {
                Ok(payload) => decode_coex_metrics(&payload),
                Err(e) => Err(e),
            }
        })
    }

    /// Set the maximum transmit power for one channel.
    pub async fn set_channel_max_transmit_power(
        &mut self,
        channel: u8,
        max_power: i8,
    ) -> Result<()> {
        self.snapshot.max_power.set(channel, max_power)?;
        with_recovery!(self, {
            let mut enc = Encoder::new();
            enc.put_u8(channel).put_i8(max_power);
            self.set_impl(prop::PHY_CHAN_MAX_POWER, &enc.finish()).await
        })
    }

    /// Enable or disable promiscuous reception.
    pub async fn set_promiscuous(&mut self, enabled: bool) -> Result<()> {
        with_recovery!(self, {
            let mode = if enabled {
                promiscuous_mode::NETWORK
            } else {
                promiscuous_mode::OFF
            };
            let mut enc = Encoder::new();
            enc.put_u8(mode);
            let result = self.set_impl(prop::MAC_PROMISCUOUS_MODE, &enc.finish()).await;
            if result.is_ok() {
                self.promiscuous = enabled;
            }
            result
        })
    }

    /// Read the supported or preferred channel mask.
    pub async fn get_radio_channel_mask(&mut self, preferred: bool) -> Result<u32> {
        let key = if preferred {
            prop::PHY_CHAN_PREFERRED
        } else {
            prop::PHY_CHAN_SUPPORTED
        };
        with_recovery!(self, {
            match self.get_impl(key).await {
                Ok(payload) => decode_channel_mask(&payload),
                Err(e) => Err(e),
            }
        })
    }

    fn emit(&self, event: RadioEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn encode_mac_key(key: &MacKeyMaterial) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.put_u8(key.key_id_mode)
        .put_u8(key.key_id)
        .put_data_with_len(&key.prev)
        .put_data_with_len(&key.curr)
        .put_data_with_len(&key.next);
    enc.finish()
}

fn decode_coex_metrics(payload: &[u8]) -> Result<CoexMetrics> {
    let mut dec = Decoder::new(payload);
    let mut metrics = CoexMetrics::default();

    let mut tx = dec.read_struct()?;
    metrics.num_tx_request = tx.read_u32()?;
    metrics.num_tx_grant_immediate = tx.read_u32()?;
    metrics.num_tx_grant_wait = tx.read_u32()?;
    metrics.num_tx_grant_wait_activated = tx.read_u32()?;
    metrics.num_tx_grant_wait_timeout = tx.read_u32()?;
    metrics.num_tx_grant_deactivated_during_request = tx.read_u32()?;
    metrics.num_tx_delayed_grant = tx.read_u32()?;
    metrics.avg_tx_request_to_grant_time = tx.read_u32()?;

    let mut rx = dec.read_struct()?;
    metrics.num_rx_request = rx.read_u32()?;
    metrics.num_rx_grant_immediate = rx.read_u32()?;
    metrics.num_rx_grant_wait = rx.read_u32()?;
    metrics.num_rx_grant_wait_activated = rx.read_u32()?;
    metrics.num_rx_grant_wait_timeout = rx.read_u32()?;
    metrics.num_rx_grant_deactivated_during_request = rx.read_u32()?;
    metrics.num_rx_delayed_grant = rx.read_u32()?;
    metrics.avg_rx_request_to_grant_time = rx.read_u32()?;
    metrics.num_rx_grant_none = rx.read_u32()?;

    metrics.stopped = dec.read_bool()?;
    metrics.num_grant_glitch = dec.read_u32()?;

    Ok(metrics)
}
