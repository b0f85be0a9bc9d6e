//! Optional callbacks around an image transfer.

/// Callbacks the dispatcher invokes during a transfer.
///
/// Every method has an empty default, so implementors override only what
/// they need.
pub trait Hooks {
    /// A transfer of `size` bytes to `address` was accepted and erased.
    fn start(&mut self, address: u32, size: u32) {
        let _ = (address, size);
    }

    /// A block was programmed; `done` of `total` bytes are now written.
    fn progress(&mut self, done: u32, total: u32) {
        let _ = (done, total);
    }

    /// The last block of the image was programmed.
    fn end(&mut self) {}

    /// Transform a received block in place before it is programmed.
    fn decrypt(&mut self, block: &mut [u8]) {
        let _ = block;
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl Hooks for NoHooks {}

impl<H: Hooks + ?Sized> Hooks for &mut H {
    fn start(&mut self, address: u32, size: u32) {
        (**self).start(address, size);
    }

    fn progress(&mut self, done: u32, total: u32) {
        (**self).progress(done, total);
    }

    fn end(&mut self) {
        (**self).end();
    }

    fn decrypt(&mut self, block: &mut [u8]) {
        (**self).decrypt(block);
    }
}
