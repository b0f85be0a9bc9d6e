//! Serial port access.
//!
//! The agent listens on one UART. On a host this is a `serialport` device,
//! opened from a [`SerialConfig`] and wrapped in a
//! [`StreamTransport`](crate::transport::StreamTransport).
//!
//! ```rust,no_run
//! # #[cfg(feature = "native")]
//! # fn main() -> bootagent::Result<()> {
//! use bootagent::port::{NativePort, SerialConfig};
//! use bootagent::transport::StreamTransport;
//!
//! let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//! let transport = StreamTransport::new(port);
//! # let _ = transport;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "native"))]
//! # fn main() {}
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default line rate of the agent's UART.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default poll interval of a blocking receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial port configuration. The line is always 8 data bits, no parity,
/// one stop bit and no flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout; a blocking receive polls at this interval.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// An open serial port.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Discard anything received but not yet read.
    fn clear_input(&mut self) -> Result<()>;
}

/// Lists available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
