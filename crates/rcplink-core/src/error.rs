//! Error types for rcplink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer failures, protocol
//! decode errors, locally detected timeouts, and the closed set of status
//! codes reported by the radio co-processor are all captured here.

/// The error type for all rcplink operations.
///
/// The first group of variants covers failures detected on the host side
/// (transport faults, malformed frames, response timeouts). The second
/// group is the one-to-one mapping of co-processor status codes; an
/// unknown status outside the vendor range falls back to [`Error::Failure`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A transport-level error (UART, SPI, socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A malformed or unexpected frame was received.
    #[error("parse error: {0}")]
    Parse(String),

    /// Timed out waiting for a tagged response from the co-processor.
    ///
    /// This typically indicates the RCP firmware has hung or the transport
    /// configuration (device path, baud rate) is wrong.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the co-processor has been established.
    #[error("not connected")]
    NotConnected,

    /// The co-processor reset while the driver considered it operational.
    #[error("unexpected co-processor reset (status {0})")]
    UnexpectedReset(u32),

    /// Recovery is disabled or the consecutive-failure ceiling was
    /// exceeded. The driver is no longer usable; operator intervention
    /// (firmware update, transport reconfiguration) is required.
    #[error("co-processor unrecoverable after {attempts} attempt(s): {reason}")]
    Unrecoverable {
        /// What kind of failure exhausted recovery.
        reason: FailureReason,
        /// How many recovery attempts were made before giving up.
        attempts: u32,
    },

    /// All transaction ids are in use; the driver is busy.
    #[error("all transaction ids in use")]
    Busy,

    /// Operation failed for an unspecified reason (status `FAILURE`).
    #[error("operation failed")]
    Failure,

    /// The frame or request was dropped by the co-processor.
    #[error("dropped by co-processor")]
    Dropped,

    /// The co-processor is out of buffer memory.
    #[error("co-processor out of memory")]
    NoMemory,

    /// An argument was rejected by the co-processor.
    #[error("invalid argument")]
    InvalidArgument,

    /// The requested operation is not implemented by this firmware.
    #[error("unimplemented on co-processor")]
    Unimplemented,

    /// The operation is invalid for the current radio state.
    #[error("invalid state for operation")]
    InvalidState,

    /// The transmitted frame was not acknowledged.
    #[error("no acknowledgment received")]
    NoAck,

    /// Transmission failed clear-channel assessment.
    #[error("channel access failure")]
    ChannelAccessFailure,

    /// The operation is already in progress or already applied.
    #[error("already in requested state")]
    Already,

    /// The property key is not recognized by the co-processor.
    #[error("property not found")]
    PropertyNotFound,

    /// The item (e.g. an address-filter entry) was not found.
    #[error("item not found")]
    ItemNotFound,

    /// A status in the vendor-specific range.
    #[error("vendor status {0}")]
    Vendor(u32),

    /// The radio does not support the requested capability.
    #[error("radio not capable: {0}")]
    NotCapable(String),
}

/// Why the failure-recovery subsystem was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// A synchronous request received no tagged reply within the ceiling,
    /// or a transmit attempt never reported completion.
    Timeout,
    /// The co-processor announced a reset while the driver was enabled.
    UnexpectedReset,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Timeout => write!(f, "response timeout"),
            FailureReason::UnexpectedReset => write!(f, "unexpected reset"),
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_unrecoverable() {
        let e = Error::Unrecoverable {
            reason: FailureReason::Timeout,
            attempts: 3,
        };
        assert_eq!(
            e.to_string(),
            "co-processor unrecoverable after 3 attempt(s): response timeout"
        );
    }

    #[test]
    fn error_display_vendor() {
        assert_eq!(Error::Vendor(15400).to_string(), "vendor status 15400");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }

    #[test]
    fn failure_reason_display() {
        assert_eq!(FailureReason::Timeout.to_string(), "response timeout");
        assert_eq!(
            FailureReason::UnexpectedReset.to_string(),
            "unexpected reset"
        );
    }
}
