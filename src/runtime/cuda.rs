//! cuSPARSE backend
//!
//! Thin translation from [`SparseBackend`] calls onto the cuSPARSE generic
//! API through cudarc's raw bindings. Every call is forwarded as-is; status
//! codes come back as [`Status`].

use super::types::{
    CompressedArgs, DiagType, DnMatHandle, DnVecHandle, FillMode, IndexBase, IndexType,
    MatHandle, NativeResult, Order, RawHandle, SpGemmHandle, SpMatAttribute, SpMatHandle,
    SpSmHandle, SpSvHandle, Status, ValueType,
};
use super::SparseBackend;
use crate::capability::{ComputeCapability, LibraryVersion};
use crate::error::{Error, Result};
use cudarc::cusparse::sys::*;
use cudarc::driver::CudaStream;
use cudarc::driver::sys::CUdevice_attribute;
use std::ffi::c_void;
use std::ptr::null_mut;
use std::sync::Arc;

#[inline]
fn check(status: cusparseStatus_t) -> NativeResult<()> {
    Status::check(status as i32)
}

fn value_type(value_type: ValueType) -> cudaDataType {
    match value_type {
        ValueType::R_16F => cudaDataType::CUDA_R_16F,
        ValueType::R_16BF => cudaDataType::CUDA_R_16BF,
        ValueType::R_32F => cudaDataType::CUDA_R_32F,
        ValueType::R_64F => cudaDataType::CUDA_R_64F,
        ValueType::C_32F => cudaDataType::CUDA_C_32F,
        ValueType::C_64F => cudaDataType::CUDA_C_64F,
        ValueType::R_8I => cudaDataType::CUDA_R_8I,
        ValueType::R_8U => cudaDataType::CUDA_R_8U,
        ValueType::R_32I => cudaDataType::CUDA_R_32I,
    }
}

fn index_type(index_type: IndexType) -> cusparseIndexType_t {
    match index_type {
        IndexType::I32 => cusparseIndexType_t::CUSPARSE_INDEX_32I,
        IndexType::I64 => cusparseIndexType_t::CUSPARSE_INDEX_64I,
    }
}

fn index_base(base: IndexBase) -> cusparseIndexBase_t {
    match base {
        IndexBase::Zero => cusparseIndexBase_t::CUSPARSE_INDEX_BASE_ZERO,
        IndexBase::One => cusparseIndexBase_t::CUSPARSE_INDEX_BASE_ONE,
    }
}

fn order(order: Order) -> cusparseOrder_t {
    match order {
        Order::Row => cusparseOrder_t::CUSPARSE_ORDER_ROW,
        Order::Col => cusparseOrder_t::CUSPARSE_ORDER_COL,
    }
}

#[inline]
fn ptr(addr: u64) -> *mut c_void {
    addr as *mut c_void
}

/// cuSPARSE handle bound to one CUDA stream
///
/// The handle is created on construction and destroyed on drop. Descriptors
/// themselves are not tied to the handle; only the version query uses it.
pub struct CudaSparseBackend {
    handle: cusparseHandle_t,
    stream: Arc<CudaStream>,
    ordinal: usize,
}

impl CudaSparseBackend {
    /// Create a cuSPARSE handle on `stream`
    pub fn new(stream: Arc<CudaStream>) -> Result<Self> {
        let ordinal = stream.context().ordinal();
        stream.context().bind_to_thread()?;
        unsafe {
            let mut handle = null_mut();
            check(cusparseCreate(&mut handle)).map_err(|s| Error::native("cusparseCreate", s))?;

            let backend = Self {
                handle,
                stream,
                ordinal,
            };
            check(cusparseSetStream(
                backend.handle,
                backend.stream.cu_stream() as cudaStream_t,
            ))
            .map_err(|s| Error::native("cusparseSetStream", s))?;

            tracing::debug!(device = ordinal, "cusparse handle created");
            Ok(backend)
        }
    }

    /// The raw cuSPARSE handle, for issuing operations
    #[inline]
    pub fn handle(&self) -> cusparseHandle_t {
        self.handle
    }

    /// The stream the handle is bound to
    #[inline]
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }
}

impl Drop for CudaSparseBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = cusparseDestroy(self.handle);
        }
    }
}

// SAFETY: cusparse calls are ordered by the stream the handle is bound to
unsafe impl Send for CudaSparseBackend {}
unsafe impl Sync for CudaSparseBackend {}

impl SparseBackend for CudaSparseBackend {
    fn name(&self) -> &'static str {
        "cusparse"
    }

    fn device_capability(&self) -> Result<ComputeCapability> {
        let device = cudarc::driver::result::device::get(self.ordinal as i32)?;
        let major = unsafe {
            cudarc::driver::result::device::get_attribute(
                device,
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR,
            )
        }?;
        let minor = unsafe {
            cudarc::driver::result::device::get_attribute(
                device,
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR,
            )
        }?;
        Ok(ComputeCapability::new(major as u32, minor as u32))
    }

    fn library_version(&self) -> Result<LibraryVersion> {
        let mut version = 0;
        unsafe { check(cusparseGetVersion(self.handle, &mut version)) }
            .map_err(|s| Error::native("cusparseGetVersion", s))?;
        Ok(LibraryVersion::from_code(version as u32))
    }

    fn create_dn_mat(
        &self,
        rows: i64,
        cols: i64,
        ld: i64,
        values: u64,
        ty: ValueType,
        storage: Order,
    ) -> NativeResult<DnMatHandle> {
        let mut descr = null_mut();
        unsafe {
            check(cusparseCreateDnMat(
                &mut descr,
                rows,
                cols,
                ld,
                ptr(values),
                value_type(ty),
                order(storage),
            ))?;
        }
        Ok(DnMatHandle::from_ptr(descr as *mut c_void))
    }

    fn dn_mat_set_strided_batch(
        &self,
        descr: DnMatHandle,
        batch_count: i32,
        batch_stride: i64,
    ) -> NativeResult<()> {
        unsafe {
            check(cusparseDnMatSetStridedBatch(
                descr.as_ptr() as _,
                batch_count,
                batch_stride,
            ))
        }
    }

    fn destroy_dn_mat(&self, descr: DnMatHandle) -> NativeResult<()> {
        unsafe { check(cusparseDestroyDnMat(descr.as_ptr() as _)) }
    }

    fn create_dn_vec(&self, size: i64, values: u64, ty: ValueType) -> NativeResult<DnVecHandle> {
        let mut descr = null_mut();
        unsafe {
            check(cusparseCreateDnVec(
                &mut descr,
                size,
                ptr(values),
                value_type(ty),
            ))?;
        }
        Ok(DnVecHandle::from_ptr(descr as *mut c_void))
    }

    fn destroy_dn_vec(&self, descr: DnVecHandle) -> NativeResult<()> {
        unsafe { check(cusparseDestroyDnVec(descr.as_ptr() as _)) }
    }

    fn create_csr(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle> {
        let mut descr = null_mut();
        unsafe {
            check(cusparseCreateCsr(
                &mut descr,
                args.rows,
                args.cols,
                args.nnz,
                ptr(args.offsets),
                ptr(args.indices),
                ptr(args.values),
                index_type(args.offsets_type),
                index_type(args.indices_type),
                index_base(args.index_base),
                value_type(args.value_type),
            ))?;
        }
        Ok(SpMatHandle::from_ptr(descr as *mut c_void))
    }

    fn create_csc(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle> {
        let mut descr = null_mut();
        unsafe {
            check(cusparseCreateCsc(
                &mut descr,
                args.rows,
                args.cols,
                args.nnz,
                ptr(args.offsets),
                ptr(args.indices),
                ptr(args.values),
                index_type(args.offsets_type),
                index_type(args.indices_type),
                index_base(args.index_base),
                value_type(args.value_type),
            ))?;
        }
        Ok(SpMatHandle::from_ptr(descr as *mut c_void))
    }

    fn csr_set_strided_batch(
        &self,
        descr: SpMatHandle,
        batch_count: i32,
        offsets_batch_stride: i64,
        columns_values_batch_stride: i64,
    ) -> NativeResult<()> {
        unsafe {
            check(cusparseCsrSetStridedBatch(
                descr.as_ptr() as _,
                batch_count,
                offsets_batch_stride,
                columns_values_batch_stride,
            ))
        }
    }

    fn csr_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        columns: u64,
        values: u64,
    ) -> NativeResult<()> {
        unsafe {
            check(cusparseCsrSetPointers(
                descr.as_ptr() as _,
                ptr(offsets),
                ptr(columns),
                ptr(values),
            ))
        }
    }

    fn csc_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        rows: u64,
        values: u64,
    ) -> NativeResult<()> {
        unsafe {
            check(cusparseCscSetPointers(
                descr.as_ptr() as _,
                ptr(offsets),
                ptr(rows),
                ptr(values),
            ))
        }
    }

    fn sp_mat_get_size(&self, descr: SpMatHandle) -> NativeResult<(i64, i64, i64)> {
        let (mut rows, mut cols, mut nnz) = (0i64, 0i64, 0i64);
        unsafe {
            check(cusparseSpMatGetSize(
                descr.as_ptr() as _,
                &mut rows,
                &mut cols,
                &mut nnz,
            ))?;
        }
        Ok((rows, cols, nnz))
    }

    fn sp_mat_set_attribute(
        &self,
        descr: SpMatHandle,
        attribute: SpMatAttribute,
    ) -> NativeResult<()> {
        unsafe {
            match attribute {
                SpMatAttribute::FillMode(fill_mode) => {
                    let mut value = match fill_mode {
                        FillMode::Lower => cusparseFillMode_t::CUSPARSE_FILL_MODE_LOWER,
                        FillMode::Upper => cusparseFillMode_t::CUSPARSE_FILL_MODE_UPPER,
                    };
                    check(cusparseSpMatSetAttribute(
                        descr.as_ptr() as _,
                        cusparseSpMatAttribute_t::CUSPARSE_SPMAT_FILL_MODE,
                        &mut value as *mut _ as *mut c_void,
                        std::mem::size_of_val(&value),
                    ))
                }
                SpMatAttribute::DiagType(diag_type) => {
                    let mut value = match diag_type {
                        DiagType::NonUnit => cusparseDiagType_t::CUSPARSE_DIAG_TYPE_NON_UNIT,
                        DiagType::Unit => cusparseDiagType_t::CUSPARSE_DIAG_TYPE_UNIT,
                    };
                    check(cusparseSpMatSetAttribute(
                        descr.as_ptr() as _,
                        cusparseSpMatAttribute_t::CUSPARSE_SPMAT_DIAG_TYPE,
                        &mut value as *mut _ as *mut c_void,
                        std::mem::size_of_val(&value),
                    ))
                }
            }
        }
    }

    fn destroy_sp_mat(&self, descr: SpMatHandle) -> NativeResult<()> {
        unsafe { check(cusparseDestroySpMat(descr.as_ptr() as _)) }
    }

    fn spsv_create_descr(&self) -> NativeResult<SpSvHandle> {
        let mut descr = null_mut();
        unsafe { check(cusparseSpSV_createDescr(&mut descr))? };
        Ok(SpSvHandle::from_ptr(descr as *mut c_void))
    }

    fn spsv_destroy_descr(&self, descr: SpSvHandle) -> NativeResult<()> {
        unsafe { check(cusparseSpSV_destroyDescr(descr.as_ptr() as _)) }
    }

    fn spsm_create_descr(&self) -> NativeResult<SpSmHandle> {
        let mut descr = null_mut();
        unsafe { check(cusparseSpSM_createDescr(&mut descr))? };
        Ok(SpSmHandle::from_ptr(descr as *mut c_void))
    }

    fn spsm_destroy_descr(&self, descr: SpSmHandle) -> NativeResult<()> {
        unsafe { check(cusparseSpSM_destroyDescr(descr.as_ptr() as _)) }
    }

    fn spgemm_create_descr(&self) -> NativeResult<SpGemmHandle> {
        let mut descr = null_mut();
        unsafe { check(cusparseSpGEMM_createDescr(&mut descr))? };
        Ok(SpGemmHandle::from_ptr(descr as *mut c_void))
    }

    fn spgemm_destroy_descr(&self, descr: SpGemmHandle) -> NativeResult<()> {
        unsafe { check(cusparseSpGEMM_destroyDescr(descr.as_ptr() as _)) }
    }

    fn create_mat_descr(&self) -> NativeResult<MatHandle> {
        let mut descr = null_mut();
        unsafe { check(cusparseCreateMatDescr(&mut descr))? };
        Ok(MatHandle::from_ptr(descr as *mut c_void))
    }

    fn destroy_mat_descr(&self, descr: MatHandle) -> NativeResult<()> {
        unsafe { check(cusparseDestroyMatDescr(descr.as_ptr() as _)) }
    }
}
