//! rcplink-spinel: the Spinel protocol driver for radio co-processors.
//!
//! Turns a frame-level byte transport into a reliable, typed
//! request/response control interface with asynchronous event delivery,
//! failure detection, and state recovery.
//!
//! # Architecture
//!
//! - [`codec`] -- wire header, packed integers, frame encode/decode
//! - [`encoding`] -- positional typed value encoding for property payloads
//! - [`tid`] -- the four-bit transaction id allocator
//! - [`driver`] -- [`RcpDriver`]: property RPC engine, radio state
//!   machine, notification handling, failure recovery
//! - [`timesync`] -- host / co-processor clock offset estimation
//! - [`power`] -- per-channel transmit power limits and channel masks
//! - [`builder`] -- fluent driver construction
//!
//! # Example
//!
//! ```no_run
//! use rcplink_spinel::RcpDriverBuilder;
//!
//! # async fn example(transport: Box<dyn rcplink_core::Transport>) -> rcplink_core::Result<()> {
//! let mut driver = RcpDriverBuilder::new()
//!     .max_restorations(5)
//!     .build_with_transport(transport);
//!
//! driver.init(true).await?;
//! driver.enable().await?;
//! driver.set_pan_id(0xABCD).await?;
//! driver.receive(15).await?;
//!
//! let mut events = driver.subscribe();
//! loop {
//!     driver.process().await?;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{event:?}");
//!     }
//! }
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod driver;
pub mod encoding;
pub mod power;
pub mod protocol;
pub mod snapshot;
pub mod tid;
pub mod timesync;

pub use builder::{DriverConfig, RcpDriverBuilder};
pub use driver::{CoexMetrics, DriverMetrics, RcpDriver, VendorExt};
pub use protocol::{Command, Status};
pub use timesync::compute_clock_offset;
