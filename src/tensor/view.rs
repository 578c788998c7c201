//! Non-owning views of device tensors
//!
//! Views carry what the descriptor layer needs to know about a tensor and
//! nothing more: a device address, an element type, and a layout. They never
//! own or free memory.

use super::layout::{Layout, Shape, leading_product};
use crate::dtype::DType;

/// Dense strided view of device memory
#[derive(Clone, Debug)]
pub struct DenseView {
    /// Base device address of the allocation the view lives in
    ptr: u64,
    dtype: DType,
    layout: Layout,
}

impl DenseView {
    /// Wrap existing device memory
    ///
    /// # Safety
    /// - `ptr` must be the base address of a device allocation large enough
    ///   to hold every element the layout addresses
    /// - The allocation must outlive every descriptor built from this view
    /// - `ptr + offset * dtype.size_in_bytes()` must not overflow `u64`
    pub unsafe fn from_raw_parts(ptr: u64, dtype: DType, layout: Layout) -> Self {
        Self { ptr, dtype, layout }
    }

    /// Device address of the first element (base address plus layout offset)
    #[inline]
    pub fn data_ptr(&self) -> u64 {
        let elem_bytes = self.dtype.size_in_bytes() as u64;
        let byte_offset = (self.layout.offset() as u64).wrapping_mul(elem_bytes);
        self.ptr.wrapping_add(byte_offset)
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Layout of the view
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Shape of the view
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Strides of the view, in elements
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Check if the view is contiguous (row-major)
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }
}

/// Compressed sparse storage formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SparseFormat {
    /// Compressed Sparse Row: offsets per row, column indices
    Csr,
    /// Compressed Sparse Column: offsets per column, row indices
    Csc,
}

impl SparseFormat {
    /// Short name for display
    pub const fn name(self) -> &'static str {
        match self {
            Self::Csr => "csr",
            Self::Csc => "csc",
        }
    }
}

/// View of a compressed sparse matrix (or stack of matrices)
///
/// For CSR, `compressed_indices` are the row offsets (`rows + 1` per batch)
/// and `plain_indices` the column indices (`nnz` per batch). CSC swaps the
/// roles of rows and columns. `values` holds `nnz` elements per batch.
///
/// Batched views have rank > 2; every sub-buffer then has one leading axis
/// per batch axis of the matrix.
#[derive(Clone, Debug)]
pub struct CompressedView {
    format: SparseFormat,
    shape: Shape,
    nnz: usize,
    compressed_indices: DenseView,
    plain_indices: DenseView,
    values: DenseView,
}

impl CompressedView {
    /// Assemble a compressed view from its buffers
    ///
    /// `nnz` is the number of stored elements per matrix.
    pub fn new(
        format: SparseFormat,
        shape: &[usize],
        nnz: usize,
        compressed_indices: DenseView,
        plain_indices: DenseView,
        values: DenseView,
    ) -> Self {
        Self {
            format,
            shape: shape.iter().copied().collect(),
            nnz,
            compressed_indices,
            plain_indices,
            values,
        }
    }

    /// CSR view from row offsets, column indices and values
    pub fn csr(
        shape: &[usize],
        nnz: usize,
        crow_indices: DenseView,
        col_indices: DenseView,
        values: DenseView,
    ) -> Self {
        Self::new(SparseFormat::Csr, shape, nnz, crow_indices, col_indices, values)
    }

    /// CSC view from column offsets, row indices and values
    pub fn csc(
        shape: &[usize],
        nnz: usize,
        ccol_indices: DenseView,
        row_indices: DenseView,
        values: DenseView,
    ) -> Self {
        Self::new(SparseFormat::Csc, shape, nnz, ccol_indices, row_indices, values)
    }

    /// Storage format
    #[inline]
    pub fn format(&self) -> SparseFormat {
        self.format
    }

    /// Logical shape, batch axes first
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Stored elements per matrix
    #[inline]
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Element type of the values
    #[inline]
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Number of matrices in the stack (product of the batch axes)
    pub fn batch_count(&self) -> usize {
        leading_product(&self.shape, 2)
    }

    /// Row offsets (CSR) or column offsets (CSC)
    #[inline]
    pub fn compressed_indices(&self) -> &DenseView {
        &self.compressed_indices
    }

    /// Column indices (CSR) or row indices (CSC)
    #[inline]
    pub fn plain_indices(&self) -> &DenseView {
        &self.plain_indices
    }

    /// Stored values
    #[inline]
    pub fn values(&self) -> &DenseView {
        &self.values
    }
}

/// Number of stacked buffers in an index or value buffer of a batched
/// compressed matrix: the product of every axis but the last
pub(crate) fn buffer_batch_count(buffer: &DenseView) -> usize {
    leading_product(buffer.shape(), 1)
}
