//! RAM-backed flash.

use crate::error::{Error, Result};
use crate::flash::FlashAdapter;
use log::{debug, trace, warn};
use std::fs;
use std::io;
use std::path::Path;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

/// Geometry and policy of a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlashLayout {
    /// Total size in bytes.
    pub size: u32,
    /// Erase unit in bytes.
    pub page_size: u32,
    /// First application address. `[0, app_start)` holds the agent.
    pub app_start: u32,
    /// Bytes at the top of flash that images may not touch.
    pub reserved: u32,
    /// Accept images that start at address 0 and replace the agent.
    pub allow_agent_update: bool,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self {
            size: 256 * 1024,
            page_size: 1024,
            app_start: 0x2800,
            reserved: 0,
            allow_agent_update: false,
        }
    }
}

impl FlashLayout {
    /// Check that the geometry is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || !self.page_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "page size {} is not a power of two",
                self.page_size
            )));
        }
        if self.size % self.page_size != 0 {
            return Err(Error::Config(format!(
                "flash size {:#x} is not a multiple of the page size",
                self.size
            )));
        }
        if self.app_start % self.page_size != 0 || self.reserved % self.page_size != 0 {
            return Err(Error::Config(
                "application start and reserved space must be page aligned".to_string(),
            ));
        }
        if self
            .app_start
            .saturating_add(self.reserved)
            > self.size
        {
            return Err(Error::Config(
                "application start and reserved space exceed the flash size".to_string(),
            ));
        }
        Ok(())
    }

    /// Last address an image may end at (exclusive).
    pub fn writable_end(&self) -> u32 {
        self.size - self.reserved
    }
}

/// A flash operation, as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Page erase at this address.
    Erase(u32),
    /// Program of `len` bytes at `address`.
    Program {
        /// Start address.
        address: u32,
        /// Byte count.
        len: usize,
    },
}

/// Flash held in memory.
///
/// Programming can only clear bits, as on NOR flash, so writing over
/// unerased data corrupts it the same way the hardware would.
#[derive(Debug, Clone)]
pub struct MemoryFlash {
    layout: FlashLayout,
    data: Vec<u8>,
    error: bool,
    fail_erase_at: Option<u32>,
    fail_program_at: Option<u32>,
    ops: Vec<FlashOp>,
}

impl MemoryFlash {
    /// A fully erased device. Fails when the layout is inconsistent.
    pub fn new(layout: FlashLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            layout,
            data: vec![ERASED; layout.size as usize],
            error: false,
            fail_erase_at: None,
            fail_program_at: None,
            ops: Vec::new(),
        })
    }

    /// A device whose contents start with `image`, erased beyond it.
    pub fn from_image(layout: FlashLayout, image: &[u8]) -> Result<Self> {
        if image.len() > layout.size as usize {
            return Err(Error::Config(format!(
                "image is {} bytes but flash holds {}",
                image.len(),
                layout.size
            )));
        }
        let mut flash = Self::new(layout)?;
        flash.data[..image.len()].copy_from_slice(image);
        Ok(flash)
    }

    /// Load contents from a raw image file. A missing file is an erased device.
    pub fn load(layout: FlashLayout, path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(image) => {
                debug!("Loaded {} bytes of flash from {}", image.len(), path.display());
                Self::from_image(layout, &image)
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, starting erased", path.display());
                Self::new(layout)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Write the full contents to a raw image file.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.data)?;
        debug!("Saved {} bytes of flash to {}", self.data.len(), path.display());
        Ok(())
    }

    /// Geometry in use.
    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    /// Entire contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `len` bytes at `address`, or `None` when out of range.
    pub fn read(&self, address: u32, len: usize) -> Option<&[u8]> {
        let start = address as usize;
        self.data
            .get(start..start.checked_add(len)?)
    }

    /// Make the next erase of the page at `address` fail.
    pub fn fail_erase_at(&mut self, address: u32) {
        self.fail_erase_at = Some(address);
    }

    /// Make the next program that starts at `address` fail.
    pub fn fail_program_at(&mut self, address: u32) {
        self.fail_program_at = Some(address);
    }

    /// Every erase and program issued so far, in order.
    pub fn operations(&self) -> &[FlashOp] {
        &self.ops
    }

    /// Addresses of every page erased so far, in order.
    pub fn erased_pages(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                FlashOp::Erase(address) => Some(*address),
                FlashOp::Program { .. } => None,
            })
            .collect()
    }

    /// Forget the operation log.
    pub fn clear_operations(&mut self) {
        self.ops
            .clear();
    }

    fn in_bounds(&self, address: u32, len: usize) -> bool {
        (address as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len())
    }
}

impl FlashAdapter for MemoryFlash {
    fn validate_range(&self, address: u32, size: u32) -> bool {
        let layout = &self.layout;
        if address % 4 != 0 || address % layout.page_size != 0 {
            return false;
        }
        let start_ok =
            address >= layout.app_start || (address == 0 && layout.allow_agent_update);
        if !start_ok {
            return false;
        }
        address
            .checked_add(size)
            .is_some_and(|end| end <= layout.writable_end())
    }

    fn clear_error_latch(&mut self) {
        self.error = false;
    }

    fn has_error(&self) -> bool {
        self.error
    }

    fn erase_page(&mut self, address: u32) {
        self.ops
            .push(FlashOp::Erase(address));
        if self.fail_erase_at == Some(address) {
            self.fail_erase_at = None;
            warn!("Injected erase fault at {address:#010x}");
            self.error = true;
            return;
        }
        let page = self.layout.page_size as usize;
        if address % self.layout.page_size != 0 || !self.in_bounds(address, page) {
            warn!("Erase at {address:#010x} is unaligned or out of range");
            self.error = true;
            return;
        }
        trace!("Erase page {address:#010x}");
        let start = address as usize;
        self.data[start..start + page].fill(ERASED);
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        self.ops
            .push(FlashOp::Program {
                address,
                len: data.len(),
            });
        if self.fail_program_at == Some(address) {
            self.fail_program_at = None;
            warn!("Injected program fault at {address:#010x}");
            self.error = true;
            return;
        }
        if !self.in_bounds(address, data.len()) {
            warn!(
                "Program of {} bytes at {address:#010x} is out of range",
                data.len()
            );
            self.error = true;
            return;
        }
        trace!("Program {} bytes at {address:#010x}", data.len());
        let start = address as usize;
        for (cell, byte) in self.data[start..start + data.len()]
            .iter_mut()
            .zip(data)
        {
            *cell &= byte;
        }
    }

    fn flash_size(&self) -> u32 {
        self.layout.size
    }

    fn page_size(&self) -> u32 {
        self.layout.page_size
    }

    fn protected_end(&self) -> u32 {
        self.layout.app_start
    }
}
