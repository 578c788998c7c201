//! Per-operation workspace descriptors
//!
//! These describe execution state rather than data. A kernel creates one per
//! solve or multiply sequence, passes it through the buffer-size query and
//! the execute call, and drops it when the sequence is done.

use super::Descriptor;
use crate::context::SparseContext;
use crate::error::{NativeResultExt, Result};
use crate::runtime::{MatHandle, SpGemmHandle, SpSmHandle, SpSvHandle};

macro_rules! workspace_descriptor {
    (
        $(#[$meta:meta])*
        $name:ident($handle:ty) {
            $(gate: $flag:ident => $feature:literal,)?
            create: $create:ident,
            destroy: $destroy:ident $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            inner: Descriptor<$handle>,
        }

        impl $name {
            /// Create an empty descriptor
            pub fn new(ctx: &SparseContext) -> Result<Self> {
                $(
                    let features = ctx.features();
                    features.require(features.$flag, $feature)?;
                )?

                let raw = ctx.backend().$create().or_native(stringify!($create))?;
                let inner = ctx.own(raw, |backend, descr| backend.$destroy(descr));
                tracing::debug!(kind = %inner.kind(), "created workspace descriptor");
                Ok(Self { inner })
            }

            /// The raw handle, for passing into native calls
            #[inline]
            pub fn descriptor(&self) -> $handle {
                self.inner.descriptor()
            }

            /// The raw handle, for native calls that modify the descriptor
            #[inline]
            pub fn descriptor_mut(&mut self) -> $handle {
                self.inner.descriptor_mut()
            }

            /// Release the descriptor now instead of on drop
            pub fn destroy(self) {
                self.inner.destroy();
            }
        }
    };
}

workspace_descriptor!(
    /// Triangular solve (sparse matrix, dense vector) workspace
    SpSvDescriptor(SpSvHandle) {
        gate: spsv => "triangular solve (vector) descriptors",
        create: spsv_create_descr,
        destroy: spsv_destroy_descr,
    }
);

workspace_descriptor!(
    /// Triangular solve (sparse matrix, dense matrix) workspace
    SpSmDescriptor(SpSmHandle) {
        gate: spsm => "triangular solve (matrix) descriptors",
        create: spsm_create_descr,
        destroy: spsm_destroy_descr,
    }
);

workspace_descriptor!(
    /// Sparse-sparse multiply workspace
    SpGemmDescriptor(SpGemmHandle) {
        gate: spgemm => "sparse-sparse multiply descriptors",
        create: spgemm_create_descr,
        destroy: spgemm_destroy_descr,
    }
);

workspace_descriptor!(
    /// Legacy generic matrix descriptor, used by the pre-generic API
    MatDescriptor(MatHandle) {
        create: create_mat_descr,
        destroy: destroy_mat_descr,
    }
);
