//! # spdesc
//!
//! **Owned, validated descriptors for a GPU sparse linear-algebra library.**
//!
//! Sparse kernels in vendor libraries such as cuSPARSE take opaque descriptor
//! handles for every operand: dense matrices, dense vectors, CSR/CSC matrices,
//! and per-operation workspaces. spdesc turns tensor views into those
//! handles and owns them:
//!
//! - **Exactly-once release**: every handle is destroyed once, on drop or on
//!   explicit `destroy`, and never leaks on a failed setup call
//! - **Validation before native calls**: layout, rank, index dtype and batch
//!   count checks all run before the library sees anything
//! - **Capability gating**: f16 needs compute capability 5.3, bf16 needs 8.0
//! - **Version gating**: features missing from the linked library are
//!   reported as errors instead of being compiled out
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spdesc::prelude::*;
//!
//! let ctx = SparseContext::new(backend)?;
//! let a = SpMatDescriptor::new(&ctx, &csr_view)?;
//! let x = DnVecDescriptor::new(&ctx, &x_view)?;
//! let (rows, cols, nnz) = a.get_size()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cuda`: cuSPARSE backend through cudarc
//!
//! Without `cuda`, the instrumented [`runtime::fake::FakeSparseBackend`] is
//! the only backend.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod context;
pub mod descriptor;
pub mod dtype;
pub mod error;
pub mod runtime;
pub mod tensor;

pub use context::{SparseContext, SparseContextBuilder};
pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::capability::{ComputeCapability, LibraryFeatures, LibraryVersion};
    pub use crate::context::SparseContext;
    pub use crate::descriptor::{
        CscDescriptor, CsrDescriptor, DnMatDescriptor, DnVecDescriptor, MatDescriptor,
        SpGemmDescriptor, SpMatDescriptor, SpSmDescriptor, SpSvDescriptor, SparseMatrixDescriptor,
    };
    pub use crate::dtype::DType;
    pub use crate::error::{Error, Result};
    pub use crate::runtime::SparseBackend;
    pub use crate::tensor::{CompressedView, DenseView, Layout, SparseFormat};

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::CudaSparseBackend;
}
