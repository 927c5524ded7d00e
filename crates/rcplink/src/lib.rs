//! rcplink: host-side driver for 802.15.4 radio co-processors.
//!
//! Umbrella crate re-exporting the public API. Most applications only
//! need [`RcpDriverBuilder`], [`RadioEvent`], and a [`Transport`]
//! implementation.

pub use rcplink_core::{
    error::{Error, FailureReason, Result},
    events::RadioEvent,
    transport::Transport,
    types::*,
};
pub use rcplink_spinel::{
    CoexMetrics, DriverMetrics, DriverConfig, RcpDriver, RcpDriverBuilder, VendorExt,
};
