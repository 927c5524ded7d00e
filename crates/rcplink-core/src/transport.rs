//! Transport trait for co-processor communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the radio
//! co-processor. Byte framing (HDLC-lite over UART, SPI frame headers) is
//! handled *below* this boundary: one successful [`Transport::receive`]
//! call yields exactly one complete Spinel frame.
//!
//! The protocol driver in `rcplink-spinel` operates on a `Transport`
//! rather than directly on a serial port, enabling both real hardware
//! control and deterministic unit testing with `MockTransport` from the
//! `rcplink-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous frame-level transport to a radio co-processor.
///
/// Implementations own framing, buffering, and checksum validation at the
/// physical layer. Protocol-level concerns (headers, transaction ids,
/// property encoding) are handled by the driver that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one complete frame to the co-processor.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Receive one complete frame into the provided buffer.
    ///
    /// Returns the number of bytes in the frame. Waits up to `timeout` for
    /// a frame to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if none is available within the deadline. A zero `timeout` polls:
    /// it returns a frame only if one is already buffered.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Assert the co-processor's hardware reset line.
    ///
    /// Used as the fallback when a software reset command goes
    /// unanswered. Returns `Unimplemented` when the platform has no reset
    /// line wired.
    async fn hardware_reset(&mut self) -> Result<()>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
