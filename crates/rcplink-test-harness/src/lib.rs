//! rcplink-test-harness: deterministic test doubles for rcplink.
//!
//! Provides [`MockTransport`], a frame-level [`Transport`](rcplink_core::Transport)
//! implementation driven by pre-loaded request/response expectations.

pub mod mock_transport;

pub use mock_transport::{MockTransport, SharedMockTransport};
