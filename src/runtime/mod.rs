//! Native sparse library backends
//!
//! The descriptor layer talks to the native library only through
//! [`SparseBackend`]: one method per native entry point, each returning the
//! raw status on failure.
//!
//! ```text
//! SparseBackend
//! ├── cuda::CudaSparseBackend (feature "cuda", cuSPARSE via cudarc)
//! └── fake::FakeSparseBackend (instrumented in-memory stand-in)
//! ```

pub mod fake;
pub mod types;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use types::{
    CompressedArgs, DescriptorKind, DiagType, DnMatHandle, DnVecHandle, FillMode, IndexBase,
    IndexType, MatHandle, NativeResult, Order, RawHandle, SpGemmHandle, SpMatAttribute,
    SpMatHandle, SpSmHandle, SpSvHandle, Status, ValueType, to_native_index_type,
    to_native_value_type,
};

use crate::capability::{ComputeCapability, LibraryVersion};
use crate::error::Result;

/// The native sparse library API as seen by the descriptor layer
///
/// Every factory returns a handle that must be passed to exactly one
/// matching destructor. Implementations do no validation beyond what the
/// native library does; the descriptor layer validates first.
///
/// Device addresses are plain `u64` values, as tensor storage reports them.
pub trait SparseBackend: Send + Sync {
    /// Human-readable name of this backend
    fn name(&self) -> &'static str;

    /// Compute capability of the active device
    fn device_capability(&self) -> Result<ComputeCapability>;

    /// Version of the linked sparse library
    fn library_version(&self) -> Result<LibraryVersion>;

    // ------------------------------------------------------------------
    // Dense matrices
    // ------------------------------------------------------------------

    /// Create a dense matrix descriptor
    fn create_dn_mat(
        &self,
        rows: i64,
        cols: i64,
        ld: i64,
        values: u64,
        value_type: ValueType,
        order: Order,
    ) -> NativeResult<DnMatHandle>;

    /// Configure a dense matrix descriptor as a strided batch
    fn dn_mat_set_strided_batch(
        &self,
        descr: DnMatHandle,
        batch_count: i32,
        batch_stride: i64,
    ) -> NativeResult<()>;

    /// Destroy a dense matrix descriptor
    fn destroy_dn_mat(&self, descr: DnMatHandle) -> NativeResult<()>;

    // ------------------------------------------------------------------
    // Dense vectors
    // ------------------------------------------------------------------

    /// Create a dense vector descriptor
    fn create_dn_vec(&self, size: i64, values: u64, value_type: ValueType)
    -> NativeResult<DnVecHandle>;

    /// Destroy a dense vector descriptor
    fn destroy_dn_vec(&self, descr: DnVecHandle) -> NativeResult<()>;

    // ------------------------------------------------------------------
    // Sparse matrices
    // ------------------------------------------------------------------

    /// Create a CSR matrix descriptor
    fn create_csr(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle>;

    /// Create a CSC matrix descriptor
    fn create_csc(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle>;

    /// Configure a CSR descriptor as a strided batch
    fn csr_set_strided_batch(
        &self,
        descr: SpMatHandle,
        batch_count: i32,
        offsets_batch_stride: i64,
        columns_values_batch_stride: i64,
    ) -> NativeResult<()>;

    /// Repoint the buffers of a CSR descriptor
    fn csr_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        columns: u64,
        values: u64,
    ) -> NativeResult<()>;

    /// Repoint the buffers of a CSC descriptor
    fn csc_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        rows: u64,
        values: u64,
    ) -> NativeResult<()>;

    /// Read (rows, cols, nnz) back from a sparse matrix descriptor
    fn sp_mat_get_size(&self, descr: SpMatHandle) -> NativeResult<(i64, i64, i64)>;

    /// Set an attribute on a sparse matrix descriptor
    fn sp_mat_set_attribute(&self, descr: SpMatHandle, attribute: SpMatAttribute)
    -> NativeResult<()>;

    /// Destroy a sparse matrix descriptor
    fn destroy_sp_mat(&self, descr: SpMatHandle) -> NativeResult<()>;

    // ------------------------------------------------------------------
    // Operation workspaces
    // ------------------------------------------------------------------

    /// Create a triangular solve (vector) descriptor
    fn spsv_create_descr(&self) -> NativeResult<SpSvHandle>;

    /// Destroy a triangular solve (vector) descriptor
    fn spsv_destroy_descr(&self, descr: SpSvHandle) -> NativeResult<()>;

    /// Create a triangular solve (matrix) descriptor
    fn spsm_create_descr(&self) -> NativeResult<SpSmHandle>;

    /// Destroy a triangular solve (matrix) descriptor
    fn spsm_destroy_descr(&self, descr: SpSmHandle) -> NativeResult<()>;

    /// Create a sparse-sparse multiply descriptor
    fn spgemm_create_descr(&self) -> NativeResult<SpGemmHandle>;

    /// Destroy a sparse-sparse multiply descriptor
    fn spgemm_destroy_descr(&self, descr: SpGemmHandle) -> NativeResult<()>;

    /// Create a legacy matrix descriptor
    fn create_mat_descr(&self) -> NativeResult<MatHandle>;

    /// Destroy a legacy matrix descriptor
    fn destroy_mat_descr(&self, descr: MatHandle) -> NativeResult<()>;
}
