//! Mock transport for deterministic testing of the protocol driver.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test frame encoding, response
//! correlation, recovery replay, and notification handling without real
//! hardware.
//!
//! Because the real transport delivers whole frames, each expectation's
//! response is a list of complete frames: one `receive()` call yields one
//! frame. Unsolicited notifications are injected with
//! [`MockTransport::push_frame`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use rcplink_core::error::{Error, Result};
use rcplink_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact frame we expect to be sent.
    request: Vec<u8>,
    /// Frames to make available to `receive()` once the request matches.
    responses: Vec<Vec<u8>>,
}

/// A mock [`Transport`] for testing the driver without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// frame is recorded and matched against the next expectation; its
/// response frames are queued for subsequent `receive()` calls. When the
/// receive queue is empty, `receive()` returns [`Error::Timeout`]
/// immediately, which keeps driver timeout paths fast in tests.
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// Frames waiting to be returned by `receive()`.
    rx_queue: VecDeque<Vec<u8>>,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all frames sent through this transport.
    sent_log: Vec<Vec<u8>>,
    /// Number of times `hardware_reset()` was invoked.
    hardware_resets: u32,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            rx_queue: VecDeque::new(),
            connected: true,
            sent_log: Vec::new(),
            hardware_resets: 0,
        }
    }

    /// Add an expected request with a single response frame.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expect_many(request, &[response]);
    }

    /// Add an expected request with several response frames.
    ///
    /// Useful when a command provokes both an unsolicited notification and
    /// the tagged reply (e.g. a reset command followed by the reset
    /// announcement).
    pub fn expect_many(&mut self, request: &[u8], responses: &[&[u8]]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            responses: responses.iter().map(|r| r.to_vec()).collect(),
        });
    }

    /// Add an expected request that provokes no reply at all.
    ///
    /// Used to exercise the driver's timeout and recovery paths.
    pub fn expect_no_reply(&mut self, request: &[u8]) {
        self.expect_many(request, &[]);
    }

    /// Inject an unsolicited frame, available to the next `receive()`.
    pub fn push_frame(&mut self, frame: &[u8]) {
        self.rx_queue.push_back(frame.to_vec());
    }

    /// Return all frames that have been sent through this transport.
    pub fn sent_frames(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Return how many times the hardware reset line was asserted.
    pub fn hardware_reset_count(&self) -> u32 {
        self.hardware_resets
    }

    /// Set the connected state of the mock transport.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(frame.to_vec());

        match self.expectations.pop_front() {
            Some(expectation) => {
                if frame != expectation.request.as_slice() {
                    return Err(Error::Transport(format!(
                        "unexpected frame sent: expected {:02X?}, got {:02X?}",
                        expectation.request, frame
                    )));
                }
                self.rx_queue.extend(expectation.responses);
                Ok(())
            }
            None => Err(Error::Transport(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.rx_queue.pop_front() {
            Some(frame) => {
                if frame.len() > buf.len() {
                    return Err(Error::Transport(format!(
                        "mock frame of {} bytes exceeds receive buffer of {}",
                        frame.len(),
                        buf.len()
                    )));
                }
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(frame.len())
            }
            None => Err(Error::Timeout),
        }
    }

    async fn hardware_reset(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.hardware_resets += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.rx_queue.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// A cloneable handle around a [`MockTransport`].
///
/// The driver takes its transport by value, which would otherwise make
/// the mock unreachable for loading further expectations or inspecting
/// the sent-frame log mid-test. Clone one handle into the driver and keep
/// the other.
#[derive(Debug, Clone, Default)]
pub struct SharedMockTransport {
    inner: std::sync::Arc<tokio::sync::Mutex<MockTransport>>,
}

impl SharedMockTransport {
    /// A connected mock behind a shared handle.
    pub fn new() -> Self {
        SharedMockTransport::default()
    }

    /// Lock the underlying mock for loading expectations or inspection.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, MockTransport> {
        self.inner.lock().await
    }
}

#[async_trait]
impl Transport for SharedMockTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.inner.lock().await.send(frame).await
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.inner.lock().await.receive(buf, timeout).await
    }

    async fn hardware_reset(&mut self) -> Result<()> {
        self.inner.lock().await.hardware_reset().await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.lock().await.close().await
    }

    fn is_connected(&self) -> bool {
        // Cheap state probe; contention only exists if a test holds the
        // lock across an await point while also driving the transport.
        self.inner
            .try_lock()
            .map(|mock| mock.is_connected())
            .unwrap_or(true)
    }
}
