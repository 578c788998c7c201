//! Sparse matrix descriptors
//!
//! [`SpMatDescriptor`] is a tagged union over the supported compressed
//! formats. The operations every format shares (live size query, buffer
//! repointing, triangular annotations) are exposed through
//! [`SparseMatrixDescriptor`], implemented by each variant and by the union.

use super::Descriptor;
use crate::context::SparseContext;
use crate::error::{Error, NativeResultExt, Result, int_cast};
use crate::runtime::{
    CompressedArgs, DiagType, FillMode, IndexBase, SpMatAttribute, SpMatHandle,
    to_native_index_type, to_native_value_type,
};
use crate::tensor::{CompressedView, DenseView, SparseFormat, buffer_batch_count};

/// Operations shared by every sparse matrix descriptor
pub trait SparseMatrixDescriptor {
    /// The raw handle, for passing into native calls
    fn descriptor(&self) -> SpMatHandle;

    /// Storage format of the described matrix
    fn format(&self) -> SparseFormat;

    /// (rows, cols, nnz) as the native descriptor currently reports them
    ///
    /// Always read back from the library, never cached: native calls may
    /// change these between queries.
    fn get_size(&self) -> Result<(i64, i64, i64)>;

    /// Point the descriptor at the buffers of another view
    ///
    /// The descriptor is not rebuilt. The caller guarantees the new view has
    /// the shape, nnz and dtypes the descriptor was created with; this is the
    /// cheap path for reusing one sparsity pattern across many solves.
    fn set_tensor(&mut self, input: &CompressedView) -> Result<()>;

    /// Mark the matrix as upper (`true`) or lower (`false`) triangular for
    /// triangular solves
    fn set_fill_mode(&mut self, upper: bool) -> Result<()>;

    /// Mark the diagonal as implicit ones (`true`) or stored (`false`) for
    /// triangular solves
    fn set_diag_type(&mut self, unit: bool) -> Result<()>;
}

/// Owned sparse matrix handle plus the context it was built in
#[derive(Debug)]
struct SpMatCore {
    inner: Descriptor<SpMatHandle>,
    ctx: SparseContext,
}

impl SpMatCore {
    fn own(ctx: &SparseContext, raw: SpMatHandle) -> Self {
        Self {
            inner: ctx.own(raw, |backend, descr| backend.destroy_sp_mat(descr)),
            ctx: ctx.clone(),
        }
    }

    fn get_size(&self) -> Result<(i64, i64, i64)> {
        let features = self.ctx.features();
        features.require(features.spmat_queries, "sparse matrix size query")?;
        self.ctx
            .backend()
            .sp_mat_get_size(self.inner.descriptor())
            .or_native("sp_mat_get_size")
    }

    fn set_attribute(&mut self, attribute: SpMatAttribute) -> Result<()> {
        let features = self.ctx.features();
        features.require(features.spsv, "sparse matrix triangular attributes")?;
        self.ctx
            .backend()
            .sp_mat_set_attribute(self.inner.descriptor_mut(), attribute)
            .or_native("sp_mat_set_attribute")
    }

    fn set_fill_mode(&mut self, upper: bool) -> Result<()> {
        let fill_mode = if upper {
            FillMode::Upper
        } else {
            FillMode::Lower
        };
        self.set_attribute(SpMatAttribute::FillMode(fill_mode))
    }

    fn set_diag_type(&mut self, unit: bool) -> Result<()> {
        let diag_type = if unit {
            DiagType::Unit
        } else {
            DiagType::NonUnit
        };
        self.set_attribute(SpMatAttribute::DiagType(diag_type))
    }
}

fn check_format(input: &CompressedView, expected: SparseFormat) {
    crate::invariant!(
        input.format() == expected,
        "expected a {} view, got {}",
        expected.name(),
        input.format().name()
    );
}

fn check_buffers_contiguous(input: &CompressedView) {
    let buffers: [(&str, &DenseView); 3] = [
        ("compressed indices", input.compressed_indices()),
        ("plain indices", input.plain_indices()),
        ("values", input.values()),
    ];
    for (name, buffer) in buffers {
        crate::invariant!(
            buffer.is_contiguous(),
            "{} {name} must be contiguous, got {:?}",
            input.format().name(),
            buffer.layout()
        );
    }
}

/// Validate every buffer of a batched view against the matrix batch count
fn check_batch_counts(input: &CompressedView) -> usize {
    let ndim = input.ndim();
    let batch_count = input.batch_count();
    let buffers: [(&str, &DenseView); 3] = [
        ("compressed indices", input.compressed_indices()),
        ("plain indices", input.plain_indices()),
        ("values", input.values()),
    ];
    for (name, buffer) in buffers {
        crate::invariant!(
            buffer.ndim() == ndim - 1,
            "batched {} {name} must have rank {}, got {:?}",
            input.format().name(),
            ndim - 1,
            buffer.shape()
        );
        let buffer_count = buffer_batch_count(buffer);
        crate::invariant!(
            buffer_count == batch_count,
            "batch count mismatch: matrix has {batch_count}, {name} has {buffer_count}"
        );
    }
    batch_count
}

/// Distance between consecutive batch entries of a contiguous buffer
fn trailing_len(buffer: &DenseView) -> usize {
    buffer.shape().last().copied().unwrap_or(1)
}

fn compressed_args(input: &CompressedView, rows: usize, cols: usize) -> Result<CompressedArgs> {
    let offsets = input.compressed_indices();
    let indices = input.plain_indices();
    let values = input.values();

    let offsets_type = to_native_index_type(offsets.dtype());
    let indices_type = to_native_index_type(indices.dtype());
    let value_type = to_native_value_type(values.dtype())?;

    Ok(CompressedArgs {
        rows: rows as i64,
        cols: cols as i64,
        nnz: input.nnz() as i64,
        offsets: offsets.data_ptr(),
        indices: indices.data_ptr(),
        values: values.data_ptr(),
        offsets_type,
        indices_type,
        index_base: IndexBase::Zero,
        value_type,
    })
}

fn matrix_dims(input: &CompressedView) -> (usize, usize) {
    let ndim = input.ndim();
    crate::invariant!(
        ndim >= 2,
        "{} descriptor needs rank >= 2, got shape {:?}",
        input.format().name(),
        input.shape()
    );
    (input.shape()[ndim - 2], input.shape()[ndim - 1])
}

/// Compressed Sparse Row matrix descriptor
///
/// Rank > 2 views become a strided batch: every row-offset array, column
/// index array and value array is one row of its buffer.
#[derive(Debug)]
pub struct CsrDescriptor {
    core: SpMatCore,
}

impl CsrDescriptor {
    /// Describe a (possibly batched) CSR view
    ///
    /// Index dtypes must be `I32` or `I64`, all three buffers contiguous, and
    /// batched buffers must agree on the batch count. All of this is checked
    /// before the first native call.
    ///
    /// # Panics
    /// On any of the contract violations above.
    pub fn new(ctx: &SparseContext, input: &CompressedView) -> Result<Self> {
        check_format(input, SparseFormat::Csr);
        let (rows, cols) = matrix_dims(input);
        check_buffers_contiguous(input);

        let batch = if input.ndim() > 2 {
            let batch_count = check_batch_counts(input);
            let features = ctx.features();
            features.require(features.csr_batching, "batched CSR descriptors")?;
            let offsets_stride = trailing_len(input.compressed_indices()) as i64;
            let columns_values_stride = trailing_len(input.values()) as i64;
            Some((
                int_cast(batch_count, "batch_count")?,
                offsets_stride,
                columns_values_stride,
            ))
        } else {
            None
        };

        let args = compressed_args(input, rows, cols)?;
        ctx.check_supported(input.dtype())?;

        let raw = ctx.backend().create_csr(&args).or_native("create_csr")?;
        let core = SpMatCore::own(ctx, raw);

        if let Some((batch_count, offsets_stride, columns_values_stride)) = batch {
            ctx.backend()
                .csr_set_strided_batch(
                    core.inner.descriptor(),
                    batch_count,
                    offsets_stride,
                    columns_values_stride,
                )
                .or_native("csr_set_strided_batch")?;
        }

        tracing::debug!(
            rows,
            cols,
            nnz = input.nnz(),
            dtype = %input.dtype(),
            index_type = ?args.offsets_type,
            batch = ?batch,
            "created csr descriptor"
        );

        Ok(Self { core })
    }

    /// The raw handle, for native calls that modify the descriptor
    #[inline]
    pub fn descriptor_mut(&mut self) -> SpMatHandle {
        self.core.inner.descriptor_mut()
    }

    /// Release the descriptor now instead of on drop
    pub fn destroy(self) {
        self.core.inner.destroy();
    }
}

impl SparseMatrixDescriptor for CsrDescriptor {
    fn descriptor(&self) -> SpMatHandle {
        self.core.inner.descriptor()
    }

    fn format(&self) -> SparseFormat {
        SparseFormat::Csr
    }

    fn get_size(&self) -> Result<(i64, i64, i64)> {
        self.core.get_size()
    }

    fn set_tensor(&mut self, input: &CompressedView) -> Result<()> {
        let features = self.core.ctx.features();
        features.require(features.spmat_queries, "sparse matrix pointer update")?;
        check_format(input, SparseFormat::Csr);
        check_buffers_contiguous(input);

        let descr = self.core.inner.descriptor_mut();
        self.core
            .ctx
            .backend()
            .csr_set_pointers(
                descr,
                input.compressed_indices().data_ptr(),
                input.plain_indices().data_ptr(),
                input.values().data_ptr(),
            )
            .or_native("csr_set_pointers")
    }

    fn set_fill_mode(&mut self, upper: bool) -> Result<()> {
        self.core.set_fill_mode(upper)
    }

    fn set_diag_type(&mut self, unit: bool) -> Result<()> {
        self.core.set_diag_type(unit)
    }
}

/// Compressed Sparse Column matrix descriptor
///
/// The native library has no strided batches for CSC, so only rank-2 views
/// are accepted.
#[derive(Debug)]
pub struct CscDescriptor {
    core: SpMatCore,
}

impl CscDescriptor {
    /// Describe a rank-2 CSC view
    ///
    /// # Panics
    /// On non-contiguous buffers or index dtypes other than `I32`/`I64`.
    pub fn new(ctx: &SparseContext, input: &CompressedView) -> Result<Self> {
        check_format(input, SparseFormat::Csc);
        let (rows, cols) = matrix_dims(input);
        check_buffers_contiguous(input);

        if input.ndim() > 2 {
            return Err(Error::invalid_argument(
                "input",
                format!("batched CSC matrices are not supported, got shape {:?}", input.shape()),
            ));
        }

        let args = compressed_args(input, rows, cols)?;
        ctx.check_supported(input.dtype())?;

        let raw = ctx.backend().create_csc(&args).or_native("create_csc")?;
        let core = SpMatCore::own(ctx, raw);

        tracing::debug!(
            rows,
            cols,
            nnz = input.nnz(),
            dtype = %input.dtype(),
            "created csc descriptor"
        );

        Ok(Self { core })
    }

    /// The raw handle, for native calls that modify the descriptor
    #[inline]
    pub fn descriptor_mut(&mut self) -> SpMatHandle {
        self.core.inner.descriptor_mut()
    }

    /// Release the descriptor now instead of on drop
    pub fn destroy(self) {
        self.core.inner.destroy();
    }
}

impl SparseMatrixDescriptor for CscDescriptor {
    fn descriptor(&self) -> SpMatHandle {
        self.core.inner.descriptor()
    }

    fn format(&self) -> SparseFormat {
        SparseFormat::Csc
    }

    fn get_size(&self) -> Result<(i64, i64, i64)> {
        self.core.get_size()
    }

    fn set_tensor(&mut self, input: &CompressedView) -> Result<()> {
        let features = self.core.ctx.features();
        features.require(features.spmat_queries, "sparse matrix pointer update")?;
        check_format(input, SparseFormat::Csc);
        check_buffers_contiguous(input);

        let descr = self.core.inner.descriptor_mut();
        self.core
            .ctx
            .backend()
            .csc_set_pointers(
                descr,
                input.compressed_indices().data_ptr(),
                input.plain_indices().data_ptr(),
                input.values().data_ptr(),
            )
            .or_native("csc_set_pointers")
    }

    fn set_fill_mode(&mut self, upper: bool) -> Result<()> {
        self.core.set_fill_mode(upper)
    }

    fn set_diag_type(&mut self, unit: bool) -> Result<()> {
        self.core.set_diag_type(unit)
    }
}

/// Sparse matrix descriptor in any supported format
#[derive(Debug)]
pub enum SpMatDescriptor {
    /// Compressed Sparse Row
    Csr(CsrDescriptor),
    /// Compressed Sparse Column
    Csc(CscDescriptor),
}

impl SpMatDescriptor {
    /// Describe `input` in whatever format it is stored in
    pub fn new(ctx: &SparseContext, input: &CompressedView) -> Result<Self> {
        match input.format() {
            SparseFormat::Csr => CsrDescriptor::new(ctx, input).map(Self::Csr),
            SparseFormat::Csc => CscDescriptor::new(ctx, input).map(Self::Csc),
        }
    }

    /// Release the descriptor now instead of on drop
    pub fn destroy(self) {
        match self {
            Self::Csr(descr) => descr.destroy(),
            Self::Csc(descr) => descr.destroy(),
        }
    }

    fn as_dyn(&self) -> &dyn SparseMatrixDescriptor {
        match self {
            Self::Csr(descr) => descr,
            Self::Csc(descr) => descr,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn SparseMatrixDescriptor {
        match self {
            Self::Csr(descr) => descr,
            Self::Csc(descr) => descr,
        }
    }
}

impl From<CsrDescriptor> for SpMatDescriptor {
    fn from(descr: CsrDescriptor) -> Self {
        Self::Csr(descr)
    }
}

impl From<CscDescriptor> for SpMatDescriptor {
    fn from(descr: CscDescriptor) -> Self {
        Self::Csc(descr)
    }
}

impl SparseMatrixDescriptor for SpMatDescriptor {
    fn descriptor(&self) -> SpMatHandle {
        self.as_dyn().descriptor()
    }

    fn format(&self) -> SparseFormat {
        self.as_dyn().format()
    }

    fn get_size(&self) -> Result<(i64, i64, i64)> {
        self.as_dyn().get_size()
    }

    fn set_tensor(&mut self, input: &CompressedView) -> Result<()> {
        self.as_dyn_mut().set_tensor(input)
    }

    fn set_fill_mode(&mut self, upper: bool) -> Result<()> {
        self.as_dyn_mut().set_fill_mode(upper)
    }

    fn set_diag_type(&mut self, unit: bool) -> Result<()> {
        self.as_dyn_mut().set_diag_type(unit)
    }
}
