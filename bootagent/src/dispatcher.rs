//! Command dispatcher.
//!
//! [`Dispatcher::handle`] interprets one decoded frame against the session,
//! drives the flash adapter and produces the reply. Transfers of control are
//! returned as an [`Outcome`] instead of being performed here, so the caller
//! decides how to flush, release peripherals and jump or reset.

use crate::flash::FlashAdapter;
use crate::hooks::{Hooks, NoHooks};
use crate::protocol::{
    BLOCK_SIZE, Request, RequestFrame, ResponseFrame, STATUS_FRAME_ID, Status,
};
use crate::session::{NO_TRANSFER, Session};
use log::{debug, info, warn};

/// What the caller must do after sending the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Wait for the next frame.
    Continue,
    /// Hand control to the application at `address`.
    Run {
        /// Entry address.
        address: u32,
    },
    /// Reset the device.
    Reset,
}

impl Outcome {
    /// Whether the session ends after this reply.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// Result of handling one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    /// Reply to send, before its checksum is computed.
    pub reply: ResponseFrame,
    /// Follow-up action.
    pub outcome: Outcome,
}

impl Dispatch {
    fn reply(reply: ResponseFrame) -> Self {
        Self {
            reply,
            outcome: Outcome::Continue,
        }
    }
}

/// Interprets requests against a session and a flash device.
#[derive(Debug)]
pub struct Dispatcher<F, H = NoHooks> {
    flash: F,
    hooks: H,
    status_id: u8,
}

impl<F: FlashAdapter> Dispatcher<F> {
    /// Create a dispatcher without hooks.
    pub fn new(flash: F) -> Self {
        Self {
            flash,
            hooks: NoHooks,
            status_id: STATUS_FRAME_ID,
        }
    }
}

impl<F: FlashAdapter, H: Hooks> Dispatcher<F, H> {
    /// Replace the transfer hooks.
    pub fn with_hooks<H2: Hooks>(self, hooks: H2) -> Dispatcher<F, H2> {
        Dispatcher {
            flash: self.flash,
            hooks,
            status_id: self.status_id,
        }
    }

    /// Set the id byte of the status frame.
    #[must_use]
    pub fn with_status_id(mut self, status_id: u8) -> Self {
        self.status_id = status_id;
        self
    }

    /// The flash device.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// The flash device, mutably.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// The transfer hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Take the flash device and hooks back.
    pub fn into_parts(self) -> (F, H) {
        (self.flash, self.hooks)
    }

    /// Handle one decoded frame.
    pub fn handle(&mut self, session: &mut Session, frame: &RequestFrame) -> Dispatch {
        debug!(
            "Handling {:?} (id={:#04x}, cmd={:#04x}, selector={:#06x})",
            frame
                .request
                .kind(),
            frame.id,
            frame.command,
            frame.selector
        );

        match &frame.request {
            Request::Handshake => {
                Dispatch::reply(ResponseFrame::handshake_ack(frame.id, frame.command))
            },
            Request::WriteInfo { address, size } => {
                self.write_info(session, *address, *size);
                Dispatch::reply(ResponseFrame::ack(frame, session.last_status))
            },
            Request::StatusQuery => {
                Dispatch::reply(ResponseFrame::status(self.status_id, session.last_status))
            },
            Request::Run { address } => {
                session.last_status = Status::Success;
                if *address >= self.flash.flash_size() {
                    warn!(
                        "Run target {address:#010x} is beyond flash size {:#010x}",
                        self.flash.flash_size()
                    );
                    session.last_status = Status::InvalidAddress;
                    return Dispatch::reply(ResponseFrame::ack(frame, session.last_status));
                }
                info!("Handing off to application at {address:#010x}");
                Dispatch {
                    reply: ResponseFrame::ack(frame, session.last_status),
                    outcome: Outcome::Run { address: *address },
                }
            },
            Request::WriteBin { block } => {
                self.write_bin(session, block);
                Dispatch::reply(ResponseFrame::ack(frame, session.last_status))
            },
            Request::Exit => {
                info!("Exit requested, resetting");
                Dispatch {
                    reply: ResponseFrame::ack(frame, session.last_status),
                    outcome: Outcome::Reset,
                }
            },
            Request::Unknown => {
                warn!("Unknown command selector {:#06x}", frame.selector);
                session.last_status = Status::UnknownCommand;
                Dispatch::reply(ResponseFrame::ack(frame, session.last_status))
            },
        }
    }

    fn write_info(&mut self, session: &mut Session, address: u32, size: u32) {
        session.last_status = Status::Success;

        if !self
            .flash
            .validate_range(address, size)
        {
            warn!("Rejected transfer of {size} bytes to {address:#010x}");
            session.abort(Status::InvalidAddress);
            return;
        }

        session.transfer_address = address;
        session.transfer_remaining = size;
        session.image_address = address;
        session.image_size = size;

        // The agent region is erased by the first block, never here.
        let page = self.flash.page_size();
        let first = address.max(self.flash.protected_end());
        let first = first - first % page;
        let end = address.saturating_add(size);

        self.flash
            .clear_error_latch();
        for page_address in (first..end).step_by(page as usize) {
            self.flash
                .erase_page(page_address);
        }
        if self.flash.has_error() {
            warn!("Erase failed for transfer at {address:#010x}");
            session.abort(Status::FlashFail);
            return;
        }

        info!("Transfer of {size} bytes to {address:#010x} started");
        self.hooks
            .start(address, size);
    }

    fn write_bin(&mut self, session: &mut Session, block: &[u8; BLOCK_SIZE]) {
        session.last_status = Status::Success;

        if session.transfer_address == NO_TRANSFER || session.transfer_remaining == 0 {
            warn!("Data block received with no transfer active");
            session.abort(Status::InvalidAddress);
            return;
        }

        self.flash
            .clear_error_latch();

        if session.transfer_address == 0 {
            let page = self.flash.page_size();
            info!("Erasing agent region below {:#010x}", self.flash.protected_end());
            for page_address in (0..self.flash.protected_end()).step_by(page as usize) {
                self.flash
                    .erase_page(page_address);
            }
            if self.flash.has_error() {
                warn!("Erase of agent region failed");
                session.abort(Status::FlashFail);
                return;
            }
        }

        let len = session
            .transfer_remaining
            .min(BLOCK_SIZE as u32);
        let mut data = *block;
        self.hooks
            .decrypt(&mut data);
        self.flash
            .program(session.transfer_address, &data[..len as usize]);
        if self.flash.has_error() {
            warn!("Program failed at {:#010x}", session.transfer_address);
            session.abort(Status::FlashFail);
            return;
        }

        session.transfer_address += len;
        session.transfer_remaining -= len;
        self.hooks
            .progress(session.transferred(), session.image_size);

        if session.transfer_remaining == 0 {
            info!(
                "Transfer of {} bytes to {:#010x} complete",
                session.image_size, session.image_address
            );
            self.hooks.end();
        }
    }
}
