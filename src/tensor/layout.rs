//! Strided layout of a tensor view and the layout predicates descriptors need

use smallvec::SmallVec;
use std::fmt;

/// Ranks up to this many live inline; batched matrices rarely exceed it
const STACK_DIMS: usize = 4;

/// Extent of every axis
pub type Shape = SmallVec<[usize; STACK_DIMS]>;

/// Distance between neighbours along every axis, in elements (not bytes)
pub type Strides = SmallVec<[isize; STACK_DIMS]>;

/// Shape, strides and element offset of a view into device memory
///
/// Element `[i0, .., in]` lives at `offset + sum(ik * strides[k])`, counted
/// in elements from the start of the allocation.
///
/// Besides the plain geometry this type answers the layout questions the
/// sparse library cares about: plain contiguity, dense packing, and whether
/// the trailing two axes form a BLAS-style row-major or column-major matrix.
#[derive(Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Strides,
    offset: usize,
}

impl Layout {
    /// Packed row-major layout of `shape`, starting at element 0
    ///
    /// # Example
    /// ```
    /// use spdesc::tensor::Layout;
    /// let layout = Layout::contiguous(&[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[12, 4, 1]);
    /// ```
    pub fn contiguous(shape: &[usize]) -> Self {
        let mut strides: Strides = smallvec::smallvec![0; shape.len()];
        let mut next = 1isize;
        for (stride, &extent) in strides.iter_mut().zip(shape).rev() {
            *stride = next;
            next *= extent.max(1) as isize;
        }
        Self {
            shape: shape.into(),
            strides,
            offset: 0,
        }
    }

    /// Arbitrary strided layout
    ///
    /// # Panics
    /// If `shape` and `strides` differ in length.
    pub fn new(shape: &[usize], strides: &[isize], offset: usize) -> Self {
        assert_eq!(
            shape.len(),
            strides.len(),
            "layout needs one stride per axis"
        );
        Self {
            shape: shape.into(),
            strides: strides.into(),
            offset,
        }
    }

    /// Extent of every axis
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Stride of every axis, in elements
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Offset of the first element, in elements
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Rank
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of addressed elements
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if memory is contiguous in row-major order
    ///
    /// Size-1 dimensions may carry any stride. The offset does not matter:
    /// a view starting in the middle of an allocation can still be contiguous.
    pub fn is_contiguous(&self) -> bool {
        if self.elem_count() == 0 {
            return true;
        }

        let mut expected = 1isize;
        for (&size, &stride) in self.shape.iter().zip(self.strides.iter()).rev() {
            if size == 1 {
                continue;
            }
            if stride != expected {
                return false;
            }
            expected *= size as isize;
        }
        true
    }

    /// Check that every element has a distinct address and the addresses
    /// fill a dense block, in any axis order
    pub fn is_non_overlapping_and_dense(&self) -> bool {
        if self.elem_count() == 0 {
            return true;
        }

        let mut dims: SmallVec<[(usize, isize); STACK_DIMS]> = self
            .shape
            .iter()
            .copied()
            .zip(self.strides.iter().copied())
            .filter(|&(size, _)| size != 1)
            .collect();
        dims.sort_by_key(|&(_, stride)| stride);

        let mut expected = 1isize;
        for (size, stride) in dims {
            if stride != expected {
                return false;
            }
            expected *= size as isize;
        }
        true
    }

    /// Whether the trailing two axes form a matrix a BLAS-style routine can
    /// read in row-major order
    ///
    /// Rank 2 and 3 only need a unit column stride and a leading dimension of
    /// at least `max(1, cols)`; rank 3 additionally needs batches that do not
    /// overlap. Higher ranks must be fully contiguous.
    pub fn is_blas_row_major(&self) -> bool {
        let ndim = self.ndim();
        if ndim < 2 {
            return false;
        }
        if ndim > 3 {
            return self.is_contiguous();
        }

        let rows = self.shape[ndim - 2] as isize;
        let cols = self.shape[ndim - 1] as isize;
        let leading_dimension = self.strides[ndim - 2];
        let batch_stride_compatible =
            ndim == 2 || self.strides[ndim - 3] >= leading_dimension * rows;

        self.strides[ndim - 1] == 1 && leading_dimension >= cols.max(1) && batch_stride_compatible
    }

    /// Column-major counterpart of [`Layout::is_blas_row_major`]
    pub fn is_blas_col_major(&self) -> bool {
        let ndim = self.ndim();
        if ndim < 2 {
            return false;
        }
        if ndim > 3 {
            return self.transpose_last().is_contiguous();
        }

        let rows = self.shape[ndim - 2] as isize;
        let cols = self.shape[ndim - 1] as isize;
        let leading_dimension = self.strides[ndim - 1];
        let batch_stride_compatible =
            ndim == 2 || self.strides[ndim - 3] >= leading_dimension * cols;

        self.strides[ndim - 2] == 1 && leading_dimension >= rows.max(1) && batch_stride_compatible
    }

    /// Number of matrices in a stack: the product of every axis but the last two
    ///
    /// Returns 1 for rank < 3.
    pub fn batch_count(&self) -> usize {
        leading_product(&self.shape, 2)
    }

    /// The same memory with the two trailing (matrix) axes swapped
    ///
    /// Layouts of rank < 2 are returned unchanged.
    pub fn transpose_last(&self) -> Self {
        let mut swapped = self.clone();
        let ndim = self.ndim();
        if ndim >= 2 {
            swapped.shape.swap(ndim - 2, ndim - 1);
            swapped.strides.swap(ndim - 2, ndim - 1);
        }
        swapped
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("shape", &self.shape.as_slice())
            .field("strides", &self.strides.as_slice())
            .field("offset", &self.offset)
            .finish()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.shape.as_slice(), self.strides.as_slice())
    }
}

/// Product of every axis of `shape` except the last `trailing` ones
///
/// Empty products are 1, so shapes with no leading axes count as one entry.
pub(crate) fn leading_product(shape: &[usize], trailing: usize) -> usize {
    shape[..shape.len().saturating_sub(trailing)].iter().product()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_layout() {
        let layout = Layout::contiguous(&[2, 3, 4]);
        assert_eq!(layout.shape(), &[2, 3, 4]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.elem_count(), 24);
        assert!(layout.is_contiguous());
        assert!(layout.is_non_overlapping_and_dense());
    }

    #[test]
    fn test_offset_does_not_break_contiguity() {
        let layout = Layout::new(&[3, 4], &[4, 1], 8);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn test_transpose_is_dense_but_not_contiguous() {
        let layout = Layout::contiguous(&[2, 3, 4]);
        let transposed = layout.transpose_last();
        assert_eq!(transposed.shape(), &[2, 4, 3]);
        assert_eq!(transposed.strides(), &[12, 1, 4]);
        assert!(!transposed.is_contiguous());
        assert!(transposed.is_non_overlapping_and_dense());
    }

    #[test]
    fn test_broadcast_stride_overlaps() {
        let layout = Layout::new(&[3, 4], &[0, 1], 0);
        assert!(!layout.is_non_overlapping_and_dense());
    }

    #[test]
    fn test_blas_row_major() {
        assert!(Layout::contiguous(&[3, 4]).is_blas_row_major());
        assert!(!Layout::contiguous(&[3, 4]).is_blas_col_major());

        // padded rows are still row-major with a wider leading dimension
        assert!(Layout::new(&[3, 4], &[8, 1], 0).is_blas_row_major());

        // overlapping batches are rejected
        assert!(!Layout::new(&[2, 3, 4], &[4, 4, 1], 0).is_blas_row_major());
        assert!(Layout::contiguous(&[2, 3, 4]).is_blas_row_major());
    }

    #[test]
    fn test_blas_col_major() {
        let col = Layout::contiguous(&[4, 3]).transpose_last();
        assert!(col.is_blas_col_major());
        assert!(!col.is_blas_row_major());

        let batched = Layout::contiguous(&[5, 2, 4, 3]).transpose_last();
        assert!(batched.is_blas_col_major());
        assert!(!batched.is_blas_row_major());
    }

    #[test]
    fn test_neither_major() {
        // every other column of a 4x8 matrix
        let strided = Layout::new(&[4, 4], &[8, 2], 0);
        assert!(!strided.is_blas_row_major());
        assert!(!strided.is_blas_col_major());
    }

    #[test]
    fn test_leading_product() {
        assert_eq!(leading_product(&[2, 3, 4], 2), 2);
        assert_eq!(leading_product(&[2, 3, 4], 1), 6);
        assert_eq!(leading_product(&[4], 2), 1);
        assert_eq!(leading_product(&[], 1), 1);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(Layout::contiguous(&[3, 4]).batch_count(), 1);
        assert_eq!(Layout::contiguous(&[2, 3, 4]).batch_count(), 2);
        assert_eq!(Layout::contiguous(&[5, 2, 3, 4]).batch_count(), 10);
    }
}
