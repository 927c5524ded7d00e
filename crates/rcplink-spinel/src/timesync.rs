//! Host / co-processor clock offset estimation.
//!
//! The co-processor timestamps received frames with its own microsecond
//! clock. To relate those to host time the driver runs a modified NTP
//! exchange: record host time `T0` just before sending a timestamp Get,
//! `T2` just after the reply is processed, and take the remote-reported
//! `T1'` from the reply. Assuming symmetric propagation,
//!
//! ```text
//! T1' = T0 + P + D    and    T1' = T2 - P + D
//! =>  D = T1' - ((T0 + T2) / 2)
//! ```
//!
//! where `D` is the offset added to host time to obtain co-processor time.

use std::time::Duration;

/// Compute the clock offset from one exchange.
///
/// `local_tx`/`local_rx` are host timestamps around the exchange and
/// `remote` is the co-processor timestamp from the reply, all in
/// microseconds. The averaging halves each term separately so the sum
/// cannot overflow.
pub fn compute_clock_offset(local_tx: u64, local_rx: u64, remote: u64) -> i64 {
    remote.wrapping_sub(local_tx / 2 + local_rx / 2) as i64
}

/// State of the time-sync engine.
#[derive(Debug, Clone)]
pub struct TimeSync {
    /// Current offset estimate, valid only when `synced`.
    offset: i64,
    /// Whether at least one exchange has succeeded since the last reset.
    synced: bool,
    /// Host time (microseconds) at which the next exchange is due.
    next_sync_at: u64,
    /// Normal re-estimation interval.
    interval: Duration,
    /// Shortened interval after a failed exchange.
    retry_interval: Duration,
}

impl TimeSync {
    /// A new engine that is due immediately.
    pub fn new(interval: Duration, retry_interval: Duration) -> TimeSync {
        TimeSync {
            offset: 0,
            synced: false,
            next_sync_at: 0,
            interval,
            retry_interval,
        }
    }

    /// True when an exchange should run at host time `now` (microseconds).
    pub fn is_due(&self, now: u64) -> bool {
        !self.synced || now >= self.next_sync_at
    }

    /// Record a successful exchange.
    pub fn record_success(&mut self, local_tx: u64, local_rx: u64, remote: u64) {
        self.offset = compute_clock_offset(local_tx, local_rx, remote);
        self.synced = true;
        self.next_sync_at = local_rx + self.interval.as_micros() as u64;
    }

    /// Record a failed exchange: the offset is untouched but the next
    /// attempt is scheduled earlier than the normal interval.
    pub fn record_failure(&mut self, now: u64) {
        self.next_sync_at = now + self.retry_interval.as_micros() as u64;
    }

    /// Co-processor time corresponding to host time `now`, once synced.
    pub fn remote_now(&self, now: u64) -> Option<u64> {
        self.synced
            .then(|| now.wrapping_add(self.offset as u64))
    }

    /// Current offset estimate, once synced.
    pub fn offset(&self) -> Option<i64> {
        self.synced.then_some(self.offset)
    }

    /// Discard the estimate (after a co-processor reset its clock
    /// restarted, so the old offset is meaningless).
    pub fn invalidate(&mut self) {
        self.synced = false;
        self.next_sync_at = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_from_reference_exchange() {
        // T0=100, T2=140, remote T1'=1000120:
        // D = 1000120 - (100 + 140)/2 = 1000120 - 120 = 1000000.
        assert_eq!(compute_clock_offset(100, 140, 1_000_120), 1_000_000);
    }

    #[test]
    fn offset_can_be_negative() {
        // Remote clock behind the host.
        assert_eq!(compute_clock_offset(1_000_100, 1_000_140, 120), -1_000_000);
    }

    #[test]
    fn due_until_first_success() {
        let sync = TimeSync::new(Duration::from_secs(60), Duration::from_secs(1));
        assert!(sync.is_due(0));
        assert!(sync.is_due(u64::MAX));
    }

    #[test]
    fn success_schedules_next_interval() {
        let mut sync = TimeSync::new(Duration::from_secs(60), Duration::from_secs(1));
        sync.record_success(100, 140, 1_000_120);

        assert_eq!(sync.offset(), Some(1_000_000));
        assert_eq!(sync.remote_now(200), Some(1_000_200));
        assert!(!sync.is_due(140 + 59_000_000));
        assert!(sync.is_due(140 + 60_000_000));
    }

    #[test]
    fn failure_schedules_early_retry_without_touching_offset() {
        let mut sync = TimeSync::new(Duration::from_secs(60), Duration::from_secs(1));
        sync.record_success(100, 140, 1_000_120);
        sync.record_failure(10_000_000);

        assert_eq!(sync.offset(), Some(1_000_000));
        assert!(!sync.is_due(10_500_000));
        assert!(sync.is_due(11_000_000));
    }

    #[test]
    fn unsynced_has_no_remote_time() {
        let sync = TimeSync::new(Duration::from_secs(60), Duration::from_secs(1));
        assert_eq!(sync.remote_now(12345), None);
        assert_eq!(sync.offset(), None);
    }

    #[test]
    fn invalidate_discards_estimate() {
        let mut sync = TimeSync::new(Duration::from_secs(60), Duration::from_secs(1));
        sync.record_success(100, 140, 1_000_120);
        sync.invalidate();
        assert_eq!(sync.remote_now(200), None);
        assert!(sync.is_due(0));
    }
}
