//! Sparse matrix descriptors: CSR, CSC, and the shared operations

mod common;

use common::{
    EXAMPLE_COL, EXAMPLE_CROW, EXAMPLE_VALUES, RECENT, assert_allclose_f32, batched_example_csr,
    default_context, dense, example_csr, example_csr_with, fake_context, panic_message, strided,
    zeros_f32,
};
use spdesc::capability::LibraryVersion;
use spdesc::descriptor::{
    CscDescriptor, CsrDescriptor, DnVecDescriptor, MatDescriptor, SpGemmDescriptor,
    SpMatDescriptor, SpSmDescriptor, SpSvDescriptor, SparseMatrixDescriptor,
};
use spdesc::dtype::DType;
use spdesc::runtime::fake::FakeSparseBackend;
use spdesc::runtime::{DescriptorKind, DiagType, FillMode, IndexType, Status, ValueType};
use spdesc::tensor::{CompressedView, DenseView, SparseFormat};
use spdesc::{Error, SparseContext};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// `y = A x` through the fake reference kernel
fn multiply(
    backend: &FakeSparseBackend,
    ctx: &SparseContext,
    a: &impl SparseMatrixDescriptor,
    x: &[f32],
) -> Vec<f32> {
    let x_view = dense(backend, x, DType::F32, &[x.len()]);
    let y_view: DenseView = zeros_f32(backend, 4);
    let x_descr = DnVecDescriptor::new(ctx, &x_view).unwrap();
    let y_descr = DnVecDescriptor::new(ctx, &y_view).unwrap();
    backend
        .spmv(a.descriptor(), x_descr.descriptor(), y_descr.descriptor())
        .unwrap();
    backend.download(y_view.data_ptr(), 4)
}

/// The 4x4 example matrix stored column-wise
fn example_csc(backend: &FakeSparseBackend) -> CompressedView {
    CompressedView::csc(
        &[4, 4],
        6,
        dense(backend, &[0i32, 2, 3, 5, 6], DType::I32, &[5]),
        dense(backend, &[0i32, 2, 1, 0, 2, 3], DType::I32, &[6]),
        dense(backend, &[1.0f32, 4.0, 3.0, 2.0, 5.0, 6.0], DType::F32, &[6]),
    )
}

#[test]
fn test_csr_descriptor_reports_size() {
    let (backend, ctx) = default_context();
    let descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();

    assert_eq!(descr.format(), SparseFormat::Csr);
    assert_eq!(descr.get_size().unwrap(), (4, 4, 6));

    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.args.offsets_type, IndexType::I32);
    assert_eq!(state.args.indices_type, IndexType::I32);
    assert_eq!(state.args.value_type, ValueType::R_32F);
    assert_eq!(state.batch, None);
}

#[test]
fn test_csr_multiply() {
    let (backend, ctx) = default_context();
    let descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();

    let y = multiply(&backend, &ctx, &descr, &[1.0, 2.0, 3.0, 4.0]);
    assert_allclose_f32(&y, &[7.0, 6.0, 19.0, 24.0], 1e-6, 0.0, "A x");
}

#[test]
fn test_set_tensor_repoints_without_rebuilding() {
    let (backend, ctx) = default_context();
    let mut descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();
    let handle = descr.descriptor();

    let doubled: Vec<f32> = EXAMPLE_VALUES.iter().map(|v| v * 2.0).collect();
    let replacement = example_csr_with(&backend, &doubled);
    descr.set_tensor(&replacement).unwrap();

    assert_eq!(descr.descriptor(), handle);
    assert_eq!(backend.created(DescriptorKind::SpMat), 1);
    assert!(backend.calls().contains(&"csr_set_pointers"));
    assert_eq!(
        backend.sp_mat(handle).unwrap().args.values,
        replacement.values().data_ptr()
    );
    assert_eq!(descr.get_size().unwrap(), (4, 4, 6));

    let y = multiply(&backend, &ctx, &descr, &[1.0, 2.0, 3.0, 4.0]);
    assert_allclose_f32(&y, &[14.0, 12.0, 38.0, 48.0], 1e-6, 0.0, "2A x");
}

#[test]
fn test_size_is_read_back_from_library() {
    let (backend, ctx) = default_context();
    let descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();

    descr.get_size().unwrap();
    descr.get_size().unwrap();
    let queries = backend
        .calls()
        .into_iter()
        .filter(|call| *call == "sp_mat_get_size")
        .count();
    assert_eq!(queries, 2);

    backend.fail_next("sp_mat_get_size", Status::InternalError);
    let err = descr.get_size().unwrap_err();
    assert_eq!(err.status(), Some(Status::InternalError));
}

#[test]
fn test_64bit_indices() {
    let (backend, ctx) = default_context();
    let crow: Vec<i64> = EXAMPLE_CROW.iter().map(|&i| i64::from(i)).collect();
    let col: Vec<i64> = EXAMPLE_COL.iter().map(|&i| i64::from(i)).collect();
    let view = CompressedView::csr(
        &[4, 4],
        6,
        dense(&backend, &crow, DType::I64, &[5]),
        dense(&backend, &col, DType::I64, &[6]),
        dense(&backend, &EXAMPLE_VALUES, DType::F32, &[6]),
    );

    let descr = CsrDescriptor::new(&ctx, &view).unwrap();
    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.args.offsets_type, IndexType::I64);
    assert_eq!(state.args.indices_type, IndexType::I64);

    let y = multiply(&backend, &ctx, &descr, &[1.0, 1.0, 1.0, 1.0]);
    assert_allclose_f32(&y, &[3.0, 3.0, 9.0, 6.0], 1e-6, 0.0, "A 1");
}

#[test]
fn test_batched_csr_strides() {
    let (backend, ctx) = default_context();
    let descr = CsrDescriptor::new(&ctx, &batched_example_csr(&backend, 3)).unwrap();

    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.batch, Some((3, 5, 6)));
    assert_eq!((state.args.rows, state.args.cols, state.args.nnz), (4, 4, 6));
}

#[test]
fn test_batch_count_mismatch_panics_before_native_calls() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[3, 4, 4],
        6,
        dense(&backend, &EXAMPLE_CROW.repeat(3), DType::I32, &[3, 5]),
        dense(&backend, &EXAMPLE_COL.repeat(3), DType::I32, &[3, 6]),
        dense(&backend, &EXAMPLE_VALUES.repeat(2), DType::F32, &[2, 6]),
    );

    let payload =
        catch_unwind(AssertUnwindSafe(|| CsrDescriptor::new(&ctx, &view))).unwrap_err();
    let message = panic_message(payload);
    assert!(message.contains("batch count mismatch"), "got: {message}");
    assert!(backend.calls().is_empty());
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_column_index_batch_count_mismatch_panics() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[3, 4, 4],
        6,
        dense(&backend, &EXAMPLE_CROW.repeat(3), DType::I32, &[3, 5]),
        dense(&backend, &EXAMPLE_COL.repeat(2), DType::I32, &[2, 6]),
        dense(&backend, &EXAMPLE_VALUES.repeat(3), DType::F32, &[3, 6]),
    );

    let payload =
        catch_unwind(AssertUnwindSafe(|| CsrDescriptor::new(&ctx, &view))).unwrap_err();
    let message = panic_message(payload);
    assert!(
        message.contains("batch count mismatch: matrix has 3, plain indices has 2"),
        "got: {message}"
    );
    assert!(backend.calls().is_empty());
    assert_eq!(backend.live_handles(), 0);
}

#[test]
fn test_batched_csr_strides_ignore_unit_batch_axis() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[2, 1, 4, 4],
        6,
        strided(&backend, &EXAMPLE_CROW.repeat(2), DType::I32, &[2, 1, 5], &[5, 3, 1], 0),
        strided(&backend, &EXAMPLE_COL.repeat(2), DType::I32, &[2, 1, 6], &[6, 1, 1], 0),
        strided(&backend, &EXAMPLE_VALUES.repeat(2), DType::F32, &[2, 1, 6], &[6, 9, 1], 0),
    );

    let descr = CsrDescriptor::new(&ctx, &view).unwrap();
    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.batch, Some((2, 5, 6)));
}

#[test]
fn test_batched_buffer_rank_mismatch_panics() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[2, 4, 4],
        6,
        dense(&backend, &EXAMPLE_CROW.repeat(2), DType::I32, &[10]),
        dense(&backend, &EXAMPLE_COL.repeat(2), DType::I32, &[2, 6]),
        dense(&backend, &EXAMPLE_VALUES.repeat(2), DType::F32, &[2, 6]),
    );

    let payload =
        catch_unwind(AssertUnwindSafe(|| CsrDescriptor::new(&ctx, &view))).unwrap_err();
    assert!(panic_message(payload).contains("invariant violation"));
    assert!(backend.calls().is_empty());
}

#[test]
fn test_invalid_index_dtype_panics_before_native_calls() {
    let (backend, ctx) = default_context();
    let crow: Vec<i16> = EXAMPLE_CROW.iter().map(|&i| i as i16).collect();
    let view = CompressedView::csr(
        &[4, 4],
        6,
        dense(&backend, &crow, DType::I16, &[5]),
        dense(&backend, &EXAMPLE_COL, DType::I32, &[6]),
        dense(&backend, &EXAMPLE_VALUES, DType::F32, &[6]),
    );

    let payload =
        catch_unwind(AssertUnwindSafe(|| CsrDescriptor::new(&ctx, &view))).unwrap_err();
    let message = panic_message(payload);
    assert!(message.contains("cannot convert type i16"), "got: {message}");
    assert!(backend.calls().is_empty());
}

#[test]
fn test_non_contiguous_values_panic() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[4, 4],
        6,
        dense(&backend, &EXAMPLE_CROW, DType::I32, &[5]),
        dense(&backend, &EXAMPLE_COL, DType::I32, &[6]),
        strided(&backend, &[0.0f32; 12], DType::F32, &[6], &[2], 0),
    );

    let payload =
        catch_unwind(AssertUnwindSafe(|| CsrDescriptor::new(&ctx, &view))).unwrap_err();
    assert!(panic_message(payload).contains("must be contiguous"));
    assert!(backend.calls().is_empty());
}

#[test]
fn test_unsupported_value_dtype() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csr(
        &[4, 4],
        6,
        dense(&backend, &EXAMPLE_CROW, DType::I32, &[5]),
        dense(&backend, &EXAMPLE_COL, DType::I32, &[6]),
        dense(&backend, &[0i64; 6], DType::I64, &[6]),
    );

    let err = CsrDescriptor::new(&ctx, &view).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedDType {
            dtype: DType::I64,
            ..
        }
    ));
    assert!(backend.calls().is_empty());
}

#[test]
#[should_panic(expected = "expected a csr view")]
fn test_csr_rejects_csc_view() {
    let (backend, ctx) = default_context();
    let _ = CsrDescriptor::new(&ctx, &example_csc(&backend));
}

#[test]
fn test_triangular_attributes() {
    let (backend, ctx) = default_context();
    let mut descr = SpMatDescriptor::new(&ctx, &example_csr(&backend)).unwrap();

    descr.set_fill_mode(true).unwrap();
    descr.set_diag_type(false).unwrap();
    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.fill_mode, Some(FillMode::Upper));
    assert_eq!(state.diag_type, Some(DiagType::NonUnit));

    descr.set_fill_mode(false).unwrap();
    descr.set_diag_type(true).unwrap();
    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.fill_mode, Some(FillMode::Lower));
    assert_eq!(state.diag_type, Some(DiagType::Unit));
}

#[test]
fn test_csc_descriptor() {
    let (backend, ctx) = default_context();
    let view = example_csc(&backend);

    let mut descr = SpMatDescriptor::new(&ctx, &view).unwrap();
    assert!(matches!(descr, SpMatDescriptor::Csc(_)));
    assert_eq!(descr.format(), SparseFormat::Csc);
    assert_eq!(descr.get_size().unwrap(), (4, 4, 6));

    let replacement = example_csc(&backend);
    descr.set_tensor(&replacement).unwrap();
    let state = backend.sp_mat(descr.descriptor()).unwrap();
    assert_eq!(state.format, SparseFormat::Csc);
    assert_eq!(state.args.indices, replacement.plain_indices().data_ptr());
    assert_eq!(
        backend.calls(),
        vec!["create_csc", "sp_mat_get_size", "csc_set_pointers"]
    );
}

#[test]
fn test_batched_csc_is_rejected() {
    let (backend, ctx) = default_context();
    let view = CompressedView::csc(
        &[2, 4, 4],
        6,
        dense(&backend, &[0i32; 10], DType::I32, &[2, 5]),
        dense(&backend, &[0i32; 12], DType::I32, &[2, 6]),
        dense(&backend, &[0.0f32; 12], DType::F32, &[2, 6]),
    );

    let err = CscDescriptor::new(&ctx, &view).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { arg: "input", .. }));
    assert!(backend.calls().is_empty());
}

#[test]
fn test_pre_generic_library_gates_queries_and_batching() {
    let (backend, ctx) = fake_context((7, 0), LibraryVersion::new(10, 2, 0));

    let err = CsrDescriptor::new(&ctx, &batched_example_csr(&backend, 2)).unwrap_err();
    assert!(matches!(err, Error::FeatureUnavailable { .. }));
    assert!(backend.calls().is_empty());

    let mut descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();
    assert!(matches!(
        descr.get_size(),
        Err(Error::FeatureUnavailable { .. })
    ));
    assert!(matches!(
        descr.set_tensor(&example_csr(&backend)),
        Err(Error::FeatureUnavailable { .. })
    ));
    assert!(SpGemmDescriptor::new(&ctx).is_err());
    assert!(MatDescriptor::new(&ctx).is_ok());
    assert_eq!(backend.calls(), vec!["create_csr", "create_mat_descr", "destroy_mat_descr"]);
}

#[test]
fn test_triangular_solve_support_by_version() {
    let (backend, ctx) = fake_context((8, 0), LibraryVersion::new(11, 4, 0));
    let mut descr = CsrDescriptor::new(&ctx, &example_csr(&backend)).unwrap();
    let err = descr.set_fill_mode(true).unwrap_err();
    match err {
        Error::FeatureUnavailable { version, .. } => {
            assert_eq!(version, LibraryVersion::new(11, 4, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(descr.set_diag_type(true).is_err());
    assert!(SpSvDescriptor::new(&ctx).is_err());

    let (_, ctx) = fake_context((8, 0), LibraryVersion::new(11, 6, 0));
    assert!(SpSvDescriptor::new(&ctx).is_ok());
    assert!(SpSmDescriptor::new(&ctx).is_err());

    let (_, ctx) = fake_context((8, 0), LibraryVersion::new(11, 7, 1));
    assert!(SpSmDescriptor::new(&ctx).is_ok());

    let (_, ctx) = fake_context((8, 0), RECENT);
    assert!(SpSvDescriptor::new(&ctx).is_ok());
    assert!(SpSmDescriptor::new(&ctx).is_ok());
    assert!(SpGemmDescriptor::new(&ctx).is_ok());
}
