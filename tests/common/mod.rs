//! Common test utilities
#![allow(dead_code)]

use spdesc::capability::{ComputeCapability, LibraryVersion};
use spdesc::dtype::DType;
use spdesc::runtime::fake::FakeSparseBackend;
use spdesc::tensor::{CompressedView, DenseView, Layout};
use spdesc::SparseContext;
use std::sync::Arc;

/// Library version with every optional feature
pub const RECENT: LibraryVersion = LibraryVersion::new(12, 5, 0);

/// Create a fake backend and a context resolved from it
pub fn fake_context(
    capability: impl Into<ComputeCapability>,
    version: LibraryVersion,
) -> (Arc<FakeSparseBackend>, SparseContext) {
    let backend = Arc::new(FakeSparseBackend::new(capability, version));
    let ctx = SparseContext::new(backend.clone()).expect("fake backend always resolves");
    (backend, ctx)
}

/// Ampere-class device with a recent library
pub fn default_context() -> (Arc<FakeSparseBackend>, SparseContext) {
    fake_context((8, 6), RECENT)
}

/// Upload `data` and view it with an arbitrary layout
pub fn strided<T: bytemuck::Pod>(
    backend: &FakeSparseBackend,
    data: &[T],
    dtype: DType,
    shape: &[usize],
    strides: &[isize],
    offset: usize,
) -> DenseView {
    let ptr = backend.upload(data);
    // SAFETY: fake allocations live as long as the backend
    unsafe { DenseView::from_raw_parts(ptr, dtype, Layout::new(shape, strides, offset)) }
}

/// Upload `data` and view it as a contiguous tensor
pub fn dense<T: bytemuck::Pod>(
    backend: &FakeSparseBackend,
    data: &[T],
    dtype: DType,
    shape: &[usize],
) -> DenseView {
    let ptr = backend.upload(data);
    // SAFETY: fake allocations live as long as the backend
    unsafe { DenseView::from_raw_parts(ptr, dtype, Layout::contiguous(shape)) }
}

/// Zeroed f32 buffer of `len` elements
pub fn zeros_f32(backend: &FakeSparseBackend, len: usize) -> DenseView {
    dense(backend, &vec![0.0f32; len], DType::F32, &[len])
}

/// Row offsets of the 4x4 example matrix
///
/// ```text
/// [[1, 0, 2, 0],
///  [0, 3, 0, 0],
///  [4, 0, 5, 0],
///  [0, 0, 0, 6]]
/// ```
pub const EXAMPLE_CROW: [i32; 5] = [0, 2, 3, 5, 6];

/// Column indices of the 4x4 example matrix
pub const EXAMPLE_COL: [i32; 6] = [0, 2, 1, 0, 2, 3];

/// Values of the 4x4 example matrix
pub const EXAMPLE_VALUES: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

/// The 4x4 example matrix as a CSR view with `values`
pub fn example_csr_with(backend: &FakeSparseBackend, values: &[f32]) -> CompressedView {
    CompressedView::csr(
        &[4, 4],
        6,
        dense(backend, &EXAMPLE_CROW, DType::I32, &[5]),
        dense(backend, &EXAMPLE_COL, DType::I32, &[6]),
        dense(backend, values, DType::F32, &[6]),
    )
}

/// The 4x4 example matrix as an f32 CSR view with i32 indices
pub fn example_csr(backend: &FakeSparseBackend) -> CompressedView {
    example_csr_with(backend, &EXAMPLE_VALUES)
}

/// `batch` copies of the 4x4 example matrix as a batched CSR view
pub fn batched_example_csr(backend: &FakeSparseBackend, batch: usize) -> CompressedView {
    let crow: Vec<i32> = EXAMPLE_CROW.repeat(batch);
    let col: Vec<i32> = EXAMPLE_COL.repeat(batch);
    let values: Vec<f32> = EXAMPLE_VALUES.repeat(batch);
    CompressedView::csr(
        &[batch, 4, 4],
        6,
        dense(backend, &crow, DType::I32, &[batch, 5]),
        dense(backend, &col, DType::I32, &[batch, 6]),
        dense(backend, &values, DType::F32, &[batch, 6]),
    )
}

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Extract the message of a caught panic
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        String::new()
    }
}
