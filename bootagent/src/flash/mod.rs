//! Flash adapter contract.
//!
//! The dispatcher never touches flash directly. It goes through
//! [`FlashAdapter`], which owns page geometry, reserved regions and the
//! sticky error latch. [`MemoryFlash`] is a RAM-backed implementation that
//! can be loaded from and saved to an image file.

pub mod memory;

pub use memory::{FlashLayout, FlashOp, MemoryFlash};

/// Operations the dispatcher needs from a flash driver.
///
/// All operations are synchronous. Erase and program report failure only
/// through the error latch, which stays set until [`clear_error_latch`] is
/// called.
///
/// [`clear_error_latch`]: FlashAdapter::clear_error_latch
pub trait FlashAdapter {
    /// Whether `[address, address + size)` is a writable image range.
    fn validate_range(&self, address: u32, size: u32) -> bool;

    /// Clear the sticky error latch.
    fn clear_error_latch(&mut self);

    /// Whether an erase or program failed since the latch was last cleared.
    fn has_error(&self) -> bool;

    /// Erase the page starting at `address`.
    fn erase_page(&mut self, address: u32);

    /// Program `data` at `address`. The range must already be erased.
    fn program(&mut self, address: u32, data: &[u8]);

    /// Total flash size in bytes.
    fn flash_size(&self) -> u32;

    /// Erase unit in bytes.
    fn page_size(&self) -> u32;

    /// End of the region holding the agent itself, which starts at 0.
    fn protected_end(&self) -> u32;
}

impl<F: FlashAdapter + ?Sized> FlashAdapter for &mut F {
    fn validate_range(&self, address: u32, size: u32) -> bool {
        (**self).validate_range(address, size)
    }

    fn clear_error_latch(&mut self) {
        (**self).clear_error_latch();
    }

    fn has_error(&self) -> bool {
        (**self).has_error()
    }

    fn erase_page(&mut self, address: u32) {
        (**self).erase_page(address);
    }

    fn program(&mut self, address: u32, data: &[u8]) {
        (**self).program(address, data);
    }

    fn flash_size(&self) -> u32 {
        (**self).flash_size()
    }

    fn page_size(&self) -> u32 {
        (**self).page_size()
    }

    fn protected_end(&self) -> u32 {
        (**self).protected_end()
    }
}
