//! Per-session transfer state.

use crate::protocol::Status;

/// Cursor value meaning no transfer is active.
///
/// While the cursor holds this value the agent's own flash region is never
/// erased.
pub const NO_TRANSFER: u32 = 0xFFFF_FFFF;

/// State of one update session, from first handshake to run or reset.
///
/// Owned by the agent loop and lent to the dispatcher one frame at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Next flash address to program, or [`NO_TRANSFER`].
    pub transfer_address: u32,
    /// Bytes still expected for the current image.
    pub transfer_remaining: u32,
    /// Result of the most recently completed command.
    pub last_status: Status,
    /// Start address of the current image.
    pub image_address: u32,
    /// Total size of the current image.
    pub image_size: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A fresh session with no transfer active.
    pub const fn new() -> Self {
        Self {
            transfer_address: NO_TRANSFER,
            transfer_remaining: 0,
            last_status: Status::Success,
            image_address: 0,
            image_size: 0,
        }
    }

    /// Whether a WriteBin would currently be accepted.
    pub fn transfer_active(&self) -> bool {
        self.transfer_address != NO_TRANSFER && self.transfer_remaining > 0
    }

    /// Bytes of the current image programmed so far.
    pub fn transferred(&self) -> u32 {
        self.image_size
            .saturating_sub(self.transfer_remaining)
    }

    /// Stop accepting data for the current image, recording `status`.
    pub fn abort(&mut self, status: Status) {
        self.transfer_remaining = 0;
        self.last_status = status;
    }
}
