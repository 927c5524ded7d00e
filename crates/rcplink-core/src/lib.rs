//! rcplink-core: Core traits, types, and error definitions for rcplink.
//!
//! This crate defines the transport-agnostic abstractions the protocol
//! driver is built on. Applications depend on these types without pulling
//! in the Spinel protocol engine itself.
//!
//! # Key types
//!
//! - [`Transport`] -- frame-level communication channel to the co-processor
//! - [`RadioEvent`] -- asynchronous notifications (received frames, scan
//!   results, transmit completion)
//! - [`RadioState`] / [`TxStatus`] -- driver state machine vocabulary
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use rcplink_core::*`.
pub use error::{Error, FailureReason, Result};
pub use events::RadioEvent;
pub use transport::Transport;
pub use types::*;
