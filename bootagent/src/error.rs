//! Error types for bootagent.

use std::io;
use thiserror::Error;

/// Result type for bootagent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bootagent operations.
///
/// Session-level failures (bad addresses, flash faults, unknown commands) are
/// not errors: they are status codes written into the session and echoed to
/// the host. Only transport trouble and malformed frames surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (transport, image file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A frame could not be decoded.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// The host closed the connection.
    #[error("Transport disconnected")]
    Disconnected,

    /// The embedding application asked the loop to stop.
    #[error("Interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Malformed or unrecognised request frame.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Fewer bytes than the command table requires for this frame.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the frame shape requires.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// More bytes than the frame shape allows.
    #[error("oversized frame: expected {expected} bytes, got {actual}")]
    Oversized {
        /// Bytes the frame shape requires.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// The selector is known but the command byte selects no frame shape.
    #[error("no frame shape for selector {selector:#06x} with command {command:#04x}")]
    UnknownShape {
        /// Selector field of the frame.
        selector: u16,
        /// Command byte of the frame.
        command: u8,
    },

    /// Trailing checksum does not match the frame contents.
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the frame.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },
}
