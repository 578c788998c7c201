//! Owned native descriptors
//!
//! Every native handle is wrapped in a [`Descriptor`] the moment its factory
//! returns, so it is released exactly once: explicitly through
//! [`Descriptor::destroy`], or on drop. The typed descriptors in the
//! submodules build on it:
//!
//! - [`DnMatDescriptor`], [`DnVecDescriptor`]: dense operands
//! - [`SpMatDescriptor`] ([`CsrDescriptor`], [`CscDescriptor`]): sparse operands
//! - [`SpSvDescriptor`], [`SpSmDescriptor`], [`SpGemmDescriptor`],
//!   [`MatDescriptor`]: per-operation workspaces
//!
//! Descriptors hold raw device addresses into tensor storage they do not
//! own. They are neither `Send` nor `Sync`.

mod dense;
mod operation;
mod sparse;

pub use dense::{DnMatDescriptor, DnVecDescriptor};
pub use operation::{MatDescriptor, SpGemmDescriptor, SpSmDescriptor, SpSvDescriptor};
pub use sparse::{CscDescriptor, CsrDescriptor, SpMatDescriptor, SparseMatrixDescriptor};

use crate::runtime::{DescriptorKind, NativeResult, RawHandle};
use std::fmt;

type Release<H> = Box<dyn FnOnce(H) -> NativeResult<()>>;

/// Sole owner of one native handle
///
/// The release function is captured at creation. It runs once, and only for
/// non-null handles. A release that reports failure means the native library
/// or driver is in an unknown state, so it panics instead of returning.
pub struct Descriptor<H: RawHandle> {
    raw: H,
    release: Option<Release<H>>,
}

impl<H: RawHandle> Descriptor<H> {
    /// Take ownership of `raw`, releasing it with `release`
    pub fn create(raw: H, release: impl FnOnce(H) -> NativeResult<()> + 'static) -> Self {
        Self {
            raw,
            release: Some(Box::new(release)),
        }
    }

    /// The raw handle, for passing into native calls
    #[inline]
    pub fn descriptor(&self) -> H {
        self.raw
    }

    /// The raw handle, for native calls that modify the descriptor
    #[inline]
    pub fn descriptor_mut(&mut self) -> H {
        self.raw
    }

    /// Kind of the owned descriptor
    #[inline]
    pub fn kind(&self) -> DescriptorKind {
        H::KIND
    }

    /// Release the handle now
    pub fn destroy(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        if self.raw.is_null() {
            return;
        }

        tracing::trace!(kind = %H::KIND, handle = ?self.raw.as_ptr(), "destroying descriptor");
        if let Err(status) = release(self.raw) {
            tracing::error!(kind = %H::KIND, %status, "descriptor destructor failed");
            panic!(
                "unrecoverable: destroying {} descriptor {:?} failed: {status}",
                H::KIND,
                self.raw.as_ptr()
            );
        }
    }
}

impl<H: RawHandle> Drop for Descriptor<H> {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl<H: RawHandle> fmt::Debug for Descriptor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("kind", &H::KIND)
            .field("raw", &self.raw.as_ptr())
            .field("live", &self.release.is_some())
            .finish()
    }
}
