//! Wire protocol: command table, frame codec and checksums.
//!
//! ## Request Frame
//!
//! ```text
//! +----+-----+----------+-----------------+----------+
//! | ID | CMD | SELECTOR |     PAYLOAD     | CHECKSUM |
//! +----+-----+----------+-----------------+----------+
//! | 1  | 1   | 2        | 0..=128 (table) | 2 (hi,lo)|
//! +----+-----+----------+-----------------+----------+
//! ```
//!
//! ## Response Frame
//!
//! ```text
//! +----+-----+---------+---------+------+------+----------+
//! | ID | CMD | ADDR_HI | ADDR_LO | P0   | P1   | CHECKSUM |
//! +----+-----+---------+---------+------+------+----------+
//! | 1  | 1   | 1       | 1       | 1    | 1    | 2 (hi,lo)|
//! +----+-----+---------+---------+------+------+----------+
//! ```

pub mod checksum;
pub mod frame;
pub mod table;

pub use checksum::{ChecksumMode, crc16_xmodem};
pub use frame::{Codec, Request, RequestFrame, ResponseFrame};
pub use table::{BLOCK_SIZE, COMMAND_TABLE, CommandKind, FrameShape, Lookup, lookup};

/// Acknowledge byte placed in the first payload byte of a reply.
pub const ACK: u8 = 0xCC;

/// Not-acknowledge byte placed in the first payload byte of a reply.
pub const NAK: u8 = 0x33;

/// Default id byte of the status frame.
pub const STATUS_FRAME_ID: u8 = 0x21;

/// Address field of the status frame.
pub const STATUS_FRAME_ADDRESS: u16 = 0x0006;

/// Result of the most recently completed command.
///
/// The numeric values are shared with the host-side updater tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Status {
    /// Command completed.
    #[default]
    Success = 0x40,
    /// Selector not recognised.
    UnknownCommand = 0x41,
    /// Address or size outside writable flash, or no transfer active.
    InvalidAddress = 0x43,
    /// Flash erase or program reported a fault.
    FlashFail = 0x44,
}

impl Status {
    /// Wire value.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x40 => Some(Self::Success),
            0x41 => Some(Self::UnknownCommand),
            0x43 => Some(Self::InvalidAddress),
            0x44 => Some(Self::FlashFail),
            _ => None,
        }
    }
}

/// Byte order of the selector field in request frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SelectorOrder {
    /// Low byte first.
    #[default]
    LowFirst,
    /// High byte first.
    HighFirst,
}

impl SelectorOrder {
    /// Assemble a selector from its two wire bytes.
    pub fn read(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::LowFirst => u16::from_le_bytes(bytes),
            Self::HighFirst => u16::from_be_bytes(bytes),
        }
    }

    /// Split a selector into its two wire bytes.
    pub fn write(self, selector: u16) -> [u8; 2] {
        match self {
            Self::LowFirst => selector.to_le_bytes(),
            Self::HighFirst => selector.to_be_bytes(),
        }
    }
}

/// Protocol variant settings.
///
/// Deployments of this agent differ in checksum convention and selector byte
/// order; both are configuration rather than separate code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProtocolConfig {
    /// Checksum convention for requests and replies.
    pub checksum: ChecksumMode,
    /// Byte order of the request selector field.
    pub selector_order: SelectorOrder,
    /// Id byte of the status frame.
    pub status_id: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            checksum: ChecksumMode::None,
            selector_order: SelectorOrder::LowFirst,
            status_id: STATUS_FRAME_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(Status::Success.code(), 0x40);
        assert_eq!(Status::UnknownCommand.code(), 0x41);
        assert_eq!(Status::InvalidAddress.code(), 0x43);
        assert_eq!(Status::FlashFail.code(), 0x44);
    }

    #[test]
    fn test_status_from_code() {
        for status in [
            Status::Success,
            Status::UnknownCommand,
            Status::InvalidAddress,
            Status::FlashFail,
        ] {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(0x42), None);
    }

    #[test]
    fn test_selector_order() {
        assert_eq!(SelectorOrder::LowFirst.read([0x01, 0x60]), 0x6001);
        assert_eq!(SelectorOrder::HighFirst.read([0x60, 0x01]), 0x6001);
        assert_eq!(SelectorOrder::LowFirst.write(0x6006), [0x06, 0x60]);
        assert_eq!(SelectorOrder::HighFirst.write(0x6006), [0x60, 0x06]);
    }
}
