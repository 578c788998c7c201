//! Dense matrix and vector descriptors

use super::Descriptor;
use crate::context::SparseContext;
use crate::error::{NativeResultExt, Result, int_cast};
use crate::runtime::{DnMatHandle, DnVecHandle, Order, to_native_value_type};
use crate::tensor::DenseView;

/// Dense matrix descriptor built from a strided view
///
/// The last two axes are the matrix; any leading axes form a strided batch.
/// The view must be BLAS-compatible in row-major or column-major order.
#[derive(Debug)]
pub struct DnMatDescriptor {
    inner: Descriptor<DnMatHandle>,
    order: Order,
}

impl DnMatDescriptor {
    /// Describe `input` as a (possibly batched) dense matrix
    ///
    /// # Panics
    /// If `input` has rank < 2 or is neither row-major nor column-major
    /// compatible.
    pub fn new(ctx: &SparseContext, input: &DenseView) -> Result<Self> {
        let ndim = input.ndim();
        crate::invariant!(
            ndim >= 2,
            "dense matrix descriptor needs rank >= 2, got rank {ndim}"
        );

        let layout = input.layout();
        let shape = input.shape();
        let strides = input.strides();
        let rows = shape[ndim - 2];
        let cols = shape[ndim - 1];

        let is_row_major = layout.is_blas_row_major();
        let is_col_major = layout.is_blas_col_major();
        crate::invariant!(
            is_row_major || is_col_major,
            "expected either row or column major contiguous input, got {layout:?}"
        );

        // degenerate shapes can satisfy both; row-major wins
        let (leading_dimension, order) = if is_row_major {
            (strides[ndim - 2], Order::Row)
        } else {
            (strides[ndim - 1], Order::Col)
        };

        let value_type = to_native_value_type(input.dtype())?;
        ctx.check_supported(input.dtype())?;

        let batch = if ndim > 2 {
            let batch_count = int_cast(layout.batch_count(), "batch_count")?;
            // rank > 3 views are fully contiguous, but a size-1 batch axis
            // may carry any stride
            let batch_stride = if ndim == 3 {
                strides[0] as i64
            } else {
                (rows * cols) as i64
            };
            Some((batch_count, batch_stride))
        } else {
            None
        };

        let raw = ctx
            .backend()
            .create_dn_mat(
                rows as i64,
                cols as i64,
                leading_dimension as i64,
                input.data_ptr(),
                value_type,
                order,
            )
            .or_native("create_dn_mat")?;
        let inner = ctx.own(raw, |backend, descr| backend.destroy_dn_mat(descr));

        if let Some((batch_count, batch_stride)) = batch {
            ctx.backend()
                .dn_mat_set_strided_batch(inner.descriptor(), batch_count, batch_stride)
                .or_native("dn_mat_set_strided_batch")?;
        }

        tracing::debug!(
            rows,
            cols,
            ld = leading_dimension,
            ?order,
            dtype = %input.dtype(),
            batch = ?batch,
            "created dense matrix descriptor"
        );

        Ok(Self { inner, order })
    }

    /// The raw handle, for passing into native calls
    #[inline]
    pub fn descriptor(&self) -> DnMatHandle {
        self.inner.descriptor()
    }

    /// The raw handle, for native calls that modify the descriptor
    #[inline]
    pub fn descriptor_mut(&mut self) -> DnMatHandle {
        self.inner.descriptor_mut()
    }

    /// Storage order the descriptor was created with
    #[inline]
    pub fn order(&self) -> Order {
        self.order
    }

    /// Release the descriptor now instead of on drop
    pub fn destroy(self) {
        self.inner.destroy();
    }
}

/// Dense vector descriptor
///
/// The native library has no batched vectors; describe several right-hand
/// sides as a [`DnMatDescriptor`] instead.
#[derive(Debug)]
pub struct DnVecDescriptor {
    inner: Descriptor<DnVecHandle>,
}

impl DnVecDescriptor {
    /// Describe `input` as a dense vector
    ///
    /// # Panics
    /// Unless `input` is rank 1 or an `n x 1` column, contiguous and
    /// non-overlapping.
    pub fn new(ctx: &SparseContext, input: &DenseView) -> Result<Self> {
        let ndim = input.ndim();
        crate::invariant!(
            ndim == 1 || (ndim == 2 && input.shape()[1] == 1),
            "dense vector descriptor needs rank 1 or an n x 1 matrix, got shape {:?}",
            input.shape()
        );
        crate::invariant!(
            input.is_contiguous() && input.layout().is_non_overlapping_and_dense(),
            "dense vector descriptor needs contiguous input, got {:?}",
            input.layout()
        );

        let value_type = to_native_value_type(input.dtype())?;
        ctx.check_supported(input.dtype())?;

        let size = input.numel();
        let raw = ctx
            .backend()
            .create_dn_vec(size as i64, input.data_ptr(), value_type)
            .or_native("create_dn_vec")?;
        let inner = ctx.own(raw, |backend, descr| backend.destroy_dn_vec(descr));

        tracing::debug!(size, dtype = %input.dtype(), "created dense vector descriptor");

        Ok(Self { inner })
    }

    /// The raw handle, for passing into native calls
    #[inline]
    pub fn descriptor(&self) -> DnVecHandle {
        self.inner.descriptor()
    }

    /// The raw handle, for native calls that modify the descriptor
    #[inline]
    pub fn descriptor_mut(&mut self) -> DnVecHandle {
        self.inner.descriptor_mut()
    }

    /// Release the descriptor now instead of on drop
    pub fn destroy(self) {
        self.inner.destroy();
    }
}
