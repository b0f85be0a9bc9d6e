//! The command table.
//!
//! The selector field of a request doubles as its opcode, and the number of
//! payload bytes that follow depends on the selector and the command byte
//! together. There is no length prefix on the wire, so the codec and the
//! dispatcher must agree on the shape of every frame. Both consult
//! [`COMMAND_TABLE`] through [`lookup`].

use crate::error::FramingError;

/// Selector of the exit (abort and reset) command.
pub const SEL_EXIT: u16 = 0x6000;
/// Selector of the handshake (liveness) command.
pub const SEL_HANDSHAKE: u16 = 0x6001;
/// Selector of the run (jump to application) command.
pub const SEL_RUN: u16 = 0x6002;
/// Selector of the write-info and status-query commands.
pub const SEL_WRITE_INFO: u16 = 0x6003;
/// Selector of the write-block command.
pub const SEL_WRITE_BIN: u16 = 0x6006;

/// Command byte that begins a transfer or carries a data block.
pub const CMD_TRANSFER: u8 = 0x10;
/// Command byte that asks for the status frame.
pub const CMD_STATUS: u8 = 0x03;
/// Command byte of the two-byte exit variant.
pub const CMD_EXIT_SHORT: u8 = 0x06;

/// Bytes of image data carried by one write-block frame.
pub const BLOCK_SIZE: usize = 128;

/// Largest payload any frame carries.
pub const MAX_PAYLOAD: usize = BLOCK_SIZE;

/// What a frame asks the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CommandKind {
    /// Session liveness check.
    Handshake,
    /// Begin an image transfer: validate, erase, set the cursor.
    WriteInfo,
    /// Report the last status.
    StatusQuery,
    /// Hand control to an application image.
    Run,
    /// Program the next block at the cursor.
    WriteBin,
    /// Abort the session and reset.
    Exit,
}

/// One row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShape {
    /// Selector this row applies to.
    pub selector: u16,
    /// Command byte this row applies to, `None` for any.
    pub command: Option<u8>,
    /// Meaning of matching frames.
    pub kind: CommandKind,
    /// Payload bytes between the selector and the checksum.
    pub payload_len: usize,
}

impl FrameShape {
    const fn new(
        selector: u16,
        command: Option<u8>,
        kind: CommandKind,
        payload_len: usize,
    ) -> Self {
        Self {
            selector,
            command,
            kind,
            payload_len,
        }
    }

    fn matches(&self, selector: u16, command: u8) -> bool {
        self.selector == selector && self.command.is_none_or(|c| c == command)
    }
}

/// Every frame shape the agent understands. Rows are matched in order, so a
/// wildcard row must follow the specific rows of its selector.
pub const COMMAND_TABLE: &[FrameShape] = &[
    FrameShape::new(SEL_EXIT, Some(CMD_EXIT_SHORT), CommandKind::Exit, 2),
    FrameShape::new(SEL_EXIT, Some(CMD_TRANSFER), CommandKind::Exit, 3),
    FrameShape::new(SEL_EXIT, None, CommandKind::Exit, 0),
    FrameShape::new(SEL_HANDSHAKE, None, CommandKind::Handshake, 2),
    FrameShape::new(SEL_RUN, None, CommandKind::Run, 3),
    FrameShape::new(SEL_WRITE_INFO, Some(CMD_TRANSFER), CommandKind::WriteInfo, 10),
    FrameShape::new(SEL_WRITE_INFO, Some(CMD_STATUS), CommandKind::StatusQuery, 2),
    FrameShape::new(SEL_WRITE_BIN, Some(CMD_TRANSFER), CommandKind::WriteBin, BLOCK_SIZE),
];

/// Result of looking a frame header up in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The header selects a known shape.
    Known(&'static FrameShape),
    /// The selector is not in the table. Such frames carry no payload and are
    /// answered as unknown commands.
    UnknownSelector,
}

impl Lookup {
    /// Payload bytes that follow the header.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Known(shape) => shape.payload_len,
            Self::UnknownSelector => 0,
        }
    }
}

/// Find the shape for a `(selector, command)` header.
///
/// A selector that appears in the table but has no row for `command` is a
/// framing error rather than an unknown command: its payload length cannot
/// be known, so the rest of the frame cannot be trusted.
pub fn lookup(selector: u16, command: u8) -> Result<Lookup, FramingError> {
    if let Some(shape) = COMMAND_TABLE
        .iter()
        .find(|shape| shape.matches(selector, command))
    {
        return Ok(Lookup::Known(shape));
    }

    if COMMAND_TABLE
        .iter()
        .any(|shape| shape.selector == selector)
    {
        Err(FramingError::UnknownShape { selector, command })
    } else {
        Ok(Lookup::UnknownSelector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(selector: u16, command: u8) -> Option<CommandKind> {
        match lookup(selector, command) {
            Ok(Lookup::Known(shape)) => Some(shape.kind),
            _ => None,
        }
    }

    #[test]
    fn test_write_info_sub_tags() {
        assert_eq!(kind_of(SEL_WRITE_INFO, CMD_TRANSFER), Some(CommandKind::WriteInfo));
        assert_eq!(kind_of(SEL_WRITE_INFO, CMD_STATUS), Some(CommandKind::StatusQuery));
        assert_eq!(
            lookup(SEL_WRITE_INFO, 0x05),
            Err(FramingError::UnknownShape {
                selector: SEL_WRITE_INFO,
                command: 0x05
            })
        );
    }

    #[test]
    fn test_write_bin_requires_data_tag() {
        assert_eq!(lookup(SEL_WRITE_BIN, CMD_TRANSFER).map(Lookup::payload_len), Ok(128));
        assert!(lookup(SEL_WRITE_BIN, 0x11).is_err());
    }

    #[test]
    fn test_exit_payload_depends_on_command() {
        assert_eq!(lookup(SEL_EXIT, CMD_EXIT_SHORT).map(Lookup::payload_len), Ok(2));
        assert_eq!(lookup(SEL_EXIT, CMD_TRANSFER).map(Lookup::payload_len), Ok(3));
        assert_eq!(lookup(SEL_EXIT, 0x99).map(Lookup::payload_len), Ok(0));
        assert_eq!(kind_of(SEL_EXIT, 0x99), Some(CommandKind::Exit));
    }

    #[test]
    fn test_wildcard_selectors_accept_any_command() {
        for command in [0x00, 0x10, 0xFF] {
            assert_eq!(kind_of(SEL_HANDSHAKE, command), Some(CommandKind::Handshake));
            assert_eq!(kind_of(SEL_RUN, command), Some(CommandKind::Run));
        }
    }

    #[test]
    fn test_unknown_selector_has_no_payload() {
        assert_eq!(lookup(0x1234, 0x10), Ok(Lookup::UnknownSelector));
        assert_eq!(Lookup::UnknownSelector.payload_len(), 0);
    }

    #[test]
    fn test_no_payload_exceeds_block() {
        assert!(COMMAND_TABLE.iter().all(|s| s.payload_len <= MAX_PAYLOAD));
    }
}
