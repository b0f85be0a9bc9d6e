//! # bootagent
//!
//! The update core of a serial boot agent: the piece of a microcontroller's
//! boot sector that accepts a new firmware image over a UART and writes it to
//! flash.
//!
//! The crate provides:
//!
//! - A frame codec driven by a single command table
//! - A command dispatcher that validates, erases and programs flash
//! - A flash adapter contract plus a RAM/file backed implementation
//! - A transport contract plus a `serialport` backed port
//! - The receive, dispatch and reply loop that ends in a run or reset handoff
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use bootagent::{Agent, FlashLayout, Handoff, MemoryFlash, ProtocolConfig, StreamTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let flash = MemoryFlash::load(FlashLayout::default(), "flash.bin".as_ref())?;
//!     let stdio = bootagent::transport::Duplex::new(std::io::stdin(), std::io::stdout());
//!     let mut agent = Agent::new(StreamTransport::new(stdio), flash, ProtocolConfig::default());
//!
//!     match agent.serve()? {
//!         Handoff::Run { address } => println!("run {address:#x}"),
//!         Handoff::Reset => println!("reset"),
//!     }
//!     agent.dispatcher().flash().save("flash.bin".as_ref())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod agent;
pub mod dispatcher;
pub mod error;
pub mod flash;
pub mod hooks;
pub mod port;
pub mod protocol;
pub mod session;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted while waiting for frames.
///
/// The checker should return `true` when serving should stop (for example
/// after Ctrl-C in a host application). Only the first registration counts.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    agent::{Agent, Handoff, Platform},
    dispatcher::{Dispatch, Dispatcher, Outcome},
    error::{Error, FramingError, Result},
    flash::{FlashAdapter, FlashLayout, MemoryFlash},
    hooks::{Hooks, NoHooks},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        ChecksumMode, Codec, CommandKind, ProtocolConfig, Request, RequestFrame, ResponseFrame,
        SelectorOrder, Status,
    },
    session::Session,
    transport::{StreamTransport, Transport},
};
