//! Instrumented in-memory sparse backend
//!
//! `FakeSparseBackend` stands in for the native library wherever a GPU is not
//! available. It does what the descriptor layer needs to be checked against:
//!
//! - counts factory and destructor calls per [`DescriptorKind`] and keeps the
//!   live handle set, so leaks and double releases are observable
//! - records every native call by name, in order
//! - fails any native call on demand ([`FakeSparseBackend::fail_next`])
//! - reports whatever compute capability and library version it was built with
//! - owns a fake device memory and runs a reference CSR x dense vector
//!   product that reads whatever buffers the descriptors point to *now*
//!
//! Releasing an unknown or already released handle returns
//! [`Status::InvalidValue`] and is counted in
//! [`FakeSparseBackend::rejected_releases`].

use super::types::{
    CompressedArgs, DescriptorKind, DiagType, DnMatHandle, DnVecHandle, FillMode, IndexBase,
    IndexType, MatHandle, NativeResult, Order, RawHandle, SpGemmHandle, SpMatAttribute,
    SpMatHandle, SpSmHandle, SpSvHandle, Status, ValueType,
};
use super::SparseBackend;
use crate::capability::{ComputeCapability, LibraryVersion};
use crate::error::Result;
use crate::tensor::SparseFormat;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ffi::c_void;

/// First fake device address handed out by [`FakeSparseBackend::upload`]
const MEMORY_BASE: u64 = 0x7f00_0000_0000;

/// Gap left between fake allocations so overruns hit unmapped memory
const ALLOCATION_GAP: u64 = 0x1000;

/// State of a fake dense matrix descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct FakeDnMat {
    /// Rows of one matrix
    pub rows: i64,
    /// Columns of one matrix
    pub cols: i64,
    /// Leading dimension
    pub ld: i64,
    /// Device address of the values
    pub values: u64,
    /// Element type
    pub value_type: ValueType,
    /// Storage order
    pub order: Order,
    /// (batch count, batch stride), once configured
    pub batch: Option<(i32, i64)>,
}

/// State of a fake dense vector descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct FakeDnVec {
    /// Number of elements
    pub size: i64,
    /// Device address of the values
    pub values: u64,
    /// Element type
    pub value_type: ValueType,
}

/// State of a fake sparse matrix descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct FakeSpMat {
    /// Storage format
    pub format: SparseFormat,
    /// Arguments of the factory call, pointers updated by `set_pointers`
    pub args: CompressedArgs,
    /// (batch count, offsets stride, columns/values stride), once configured
    pub batch: Option<(i32, i64, i64)>,
    /// Triangle annotation, once set
    pub fill_mode: Option<FillMode>,
    /// Diagonal annotation, once set
    pub diag_type: Option<DiagType>,
}

#[derive(Clone, Debug)]
enum FakeObject {
    DnMat(FakeDnMat),
    DnVec(FakeDnVec),
    SpMat(FakeSpMat),
    Workspace(DescriptorKind),
}

impl FakeObject {
    fn kind(&self) -> DescriptorKind {
        match self {
            Self::DnMat(_) => DescriptorKind::DnMat,
            Self::DnVec(_) => DescriptorKind::DnVec,
            Self::SpMat(_) => DescriptorKind::SpMat,
            Self::Workspace(kind) => *kind,
        }
    }
}

struct FakeState {
    capability: ComputeCapability,
    version: LibraryVersion,
    next_handle: usize,
    objects: HashMap<usize, FakeObject>,
    created: BTreeMap<DescriptorKind, usize>,
    destroyed: BTreeMap<DescriptorKind, usize>,
    rejected_releases: usize,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, Status>,
    memory: BTreeMap<u64, Vec<u8>>,
    next_addr: u64,
}

impl FakeState {
    /// Log a call and consume a pending injected failure for it
    fn enter(&mut self, call: &'static str) -> NativeResult<()> {
        self.calls.push(call);
        match self.failures.remove(call) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn insert<H: RawHandle>(&mut self, object: FakeObject) -> H {
        // handles look like aligned heap pointers
        self.next_handle += 1;
        let addr = self.next_handle << 4;
        *self.created.entry(object.kind()).or_default() += 1;
        self.objects.insert(addr, object);
        H::from_ptr(addr as *mut c_void)
    }

    fn remove<H: RawHandle>(&mut self, handle: H) -> NativeResult<()> {
        let addr = handle.as_ptr() as usize;
        match self.objects.get(&addr) {
            Some(object) if object.kind() == H::KIND => {
                self.objects.remove(&addr);
                *self.destroyed.entry(H::KIND).or_default() += 1;
                Ok(())
            }
            _ => {
                self.rejected_releases += 1;
                Err(Status::InvalidValue)
            }
        }
    }

    fn dn_mat_mut(&mut self, handle: DnMatHandle) -> NativeResult<&mut FakeDnMat> {
        match self.objects.get_mut(&(handle.as_ptr() as usize)) {
            Some(FakeObject::DnMat(mat)) => Ok(mat),
            _ => Err(Status::InvalidValue),
        }
    }

    fn dn_vec(&self, handle: DnVecHandle) -> NativeResult<&FakeDnVec> {
        match self.objects.get(&(handle.as_ptr() as usize)) {
            Some(FakeObject::DnVec(vec)) => Ok(vec),
            _ => Err(Status::InvalidValue),
        }
    }

    fn sp_mat_mut(&mut self, handle: SpMatHandle) -> NativeResult<&mut FakeSpMat> {
        match self.objects.get_mut(&(handle.as_ptr() as usize)) {
            Some(FakeObject::SpMat(mat)) => Ok(mat),
            _ => Err(Status::InvalidValue),
        }
    }

    /// Bytes `[addr, addr + len)` of one fake allocation
    fn bytes(&self, addr: u64, len: usize) -> NativeResult<&[u8]> {
        let (&base, data) = self
            .memory
            .range(..=addr)
            .next_back()
            .ok_or(Status::MappingError)?;
        let start = (addr - base) as usize;
        data.get(start..start + len).ok_or(Status::MappingError)
    }

    fn bytes_mut(&mut self, addr: u64, len: usize) -> NativeResult<&mut [u8]> {
        let (&base, data) = self
            .memory
            .range_mut(..=addr)
            .next_back()
            .ok_or(Status::MappingError)?;
        let start = (addr - base) as usize;
        data.get_mut(start..start + len).ok_or(Status::MappingError)
    }

    fn read_indices(&self, addr: u64, count: usize, index_type: IndexType) -> NativeResult<Vec<usize>> {
        let raw: Vec<i64> = match index_type {
            IndexType::I32 => {
                let bytes = self.bytes(addr, count * 4)?;
                bytemuck::pod_collect_to_vec::<u8, i32>(bytes)
                    .into_iter()
                    .map(i64::from)
                    .collect()
            }
            IndexType::I64 => bytemuck::pod_collect_to_vec::<u8, i64>(self.bytes(addr, count * 8)?),
        };
        raw.into_iter()
            .map(|index| usize::try_from(index).map_err(|_| Status::InvalidValue))
            .collect()
    }

    fn read_values(&self, addr: u64, count: usize, value_type: ValueType) -> NativeResult<Vec<f64>> {
        let width = value_width(value_type)?;
        let bytes = self.bytes(addr, count * width)?;
        let values = match value_type {
            ValueType::R_64F => bytemuck::pod_collect_to_vec::<u8, f64>(bytes),
            ValueType::R_32F => bytemuck::pod_collect_to_vec::<u8, f32>(bytes)
                .into_iter()
                .map(f64::from)
                .collect(),
            ValueType::R_16F => bytemuck::pod_collect_to_vec::<u8, u16>(bytes)
                .into_iter()
                .map(|bits| half::f16::from_bits(bits).to_f64())
                .collect(),
            ValueType::R_16BF => bytemuck::pod_collect_to_vec::<u8, u16>(bytes)
                .into_iter()
                .map(|bits| half::bf16::from_bits(bits).to_f64())
                .collect(),
            ValueType::R_32I => bytemuck::pod_collect_to_vec::<u8, i32>(bytes)
                .into_iter()
                .map(f64::from)
                .collect(),
            ValueType::R_8I => bytes.iter().map(|&b| f64::from(b as i8)).collect(),
            ValueType::R_8U => bytes.iter().map(|&b| f64::from(b)).collect(),
            ValueType::C_32F | ValueType::C_64F => return Err(Status::NotSupported),
        };
        Ok(values)
    }

    fn write_values(&mut self, addr: u64, values: &[f64], value_type: ValueType) -> NativeResult<()> {
        let encoded: Vec<u8> = match value_type {
            ValueType::R_64F => bytemuck::cast_slice(values).to_vec(),
            ValueType::R_32F => {
                let narrowed: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                bytemuck::cast_slice(&narrowed).to_vec()
            }
            ValueType::R_16F => {
                let bits: Vec<u16> = values
                    .iter()
                    .map(|&v| half::f16::from_f64(v).to_bits())
                    .collect();
                bytemuck::cast_slice(&bits).to_vec()
            }
            ValueType::R_16BF => {
                let bits: Vec<u16> = values
                    .iter()
                    .map(|&v| half::bf16::from_f64(v).to_bits())
                    .collect();
                bytemuck::cast_slice(&bits).to_vec()
            }
            _ => return Err(Status::NotSupported),
        };
        self.bytes_mut(addr, encoded.len())?.copy_from_slice(&encoded);
        Ok(())
    }
}

fn value_width(value_type: ValueType) -> NativeResult<usize> {
    match value_type {
        ValueType::R_64F => Ok(8),
        ValueType::R_32F | ValueType::R_32I => Ok(4),
        ValueType::R_16F | ValueType::R_16BF => Ok(2),
        ValueType::R_8I | ValueType::R_8U => Ok(1),
        ValueType::C_32F | ValueType::C_64F => Err(Status::NotSupported),
    }
}

/// Instrumented stand-in for the native sparse library
pub struct FakeSparseBackend {
    state: Mutex<FakeState>,
}

impl FakeSparseBackend {
    /// Create a backend reporting the given device capability and library version
    pub fn new(capability: impl Into<ComputeCapability>, version: LibraryVersion) -> Self {
        Self {
            state: Mutex::new(FakeState {
                capability: capability.into(),
                version,
                next_handle: 0,
                objects: HashMap::new(),
                created: BTreeMap::new(),
                destroyed: BTreeMap::new(),
                rejected_releases: 0,
                calls: Vec::new(),
                failures: HashMap::new(),
                memory: BTreeMap::new(),
                next_addr: MEMORY_BASE,
            }),
        }
    }

    /// Make the next call to `call` fail with `status`
    ///
    /// `call` is the native entry point name, e.g. `"create_csr"`.
    pub fn fail_next(&self, call: &'static str, status: Status) {
        self.state.lock().failures.insert(call, status);
    }

    /// Factory calls that succeeded for `kind`
    pub fn created(&self, kind: DescriptorKind) -> usize {
        self.state.lock().created.get(&kind).copied().unwrap_or(0)
    }

    /// Destructor calls that succeeded for `kind`
    pub fn destroyed(&self, kind: DescriptorKind) -> usize {
        self.state.lock().destroyed.get(&kind).copied().unwrap_or(0)
    }

    /// Total successful factory calls
    pub fn total_created(&self) -> usize {
        self.state.lock().created.values().sum()
    }

    /// Total successful destructor calls
    pub fn total_destroyed(&self) -> usize {
        self.state.lock().destroyed.values().sum()
    }

    /// Handles created and not yet released
    pub fn live_handles(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Destructor calls on unknown or already released handles
    pub fn rejected_releases(&self) -> usize {
        self.state.lock().rejected_releases
    }

    /// Every native call made so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Current state of a dense matrix descriptor
    pub fn dn_mat(&self, handle: DnMatHandle) -> Option<FakeDnMat> {
        match self.state.lock().objects.get(&(handle.as_ptr() as usize)) {
            Some(FakeObject::DnMat(mat)) => Some(mat.clone()),
            _ => None,
        }
    }

    /// Current state of a dense vector descriptor
    pub fn dn_vec(&self, handle: DnVecHandle) -> Option<FakeDnVec> {
        self.state.lock().dn_vec(handle).ok().cloned()
    }

    /// Current state of a sparse matrix descriptor
    pub fn sp_mat(&self, handle: SpMatHandle) -> Option<FakeSpMat> {
        match self.state.lock().objects.get(&(handle.as_ptr() as usize)) {
            Some(FakeObject::SpMat(mat)) => Some(mat.clone()),
            _ => None,
        }
    }

    /// Copy `data` into fresh fake device memory and return its address
    pub fn upload<T: bytemuck::Pod>(&self, data: &[T]) -> u64 {
        let bytes: Vec<u8> = bytemuck::cast_slice(data).to_vec();
        let mut state = self.state.lock();
        let addr = state.next_addr;
        // keep every allocation 16-byte aligned
        state.next_addr += (bytes.len() as u64).next_multiple_of(16) + ALLOCATION_GAP;
        state.memory.insert(addr, bytes);
        addr
    }

    /// Read `len` elements of `T` back from fake device memory
    ///
    /// # Panics
    /// If the range is not inside one allocation.
    pub fn download<T: bytemuck::Pod>(&self, addr: u64, len: usize) -> Vec<T> {
        let state = self.state.lock();
        let bytes = state
            .bytes(addr, len * std::mem::size_of::<T>())
            .unwrap_or_else(|status| panic!("download of {len} elements at {addr:#x}: {status}"));
        bytemuck::pod_collect_to_vec(bytes)
    }

    /// Reference `y = A x` for a CSR matrix and two dense vectors
    ///
    /// Reads the buffers the descriptors point to at call time, in each
    /// descriptor's value type. Batched or non-CSR matrices are rejected with
    /// [`Status::NotSupported`].
    pub fn spmv(&self, a: SpMatHandle, x: DnVecHandle, y: DnVecHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("spmv")?;

        let mat = match state.objects.get(&(a.as_ptr() as usize)) {
            Some(FakeObject::SpMat(mat)) => mat.clone(),
            _ => return Err(Status::InvalidValue),
        };
        if mat.format != SparseFormat::Csr || mat.batch.is_some() {
            return Err(Status::NotSupported);
        }
        let x_vec = state.dn_vec(x)?.clone();
        let y_vec = state.dn_vec(y)?.clone();

        let args = mat.args;
        if x_vec.size != args.cols || y_vec.size != args.rows {
            return Err(Status::InvalidValue);
        }

        let rows = args.rows as usize;
        let nnz = args.nnz as usize;
        let base = match args.index_base {
            IndexBase::Zero => 0,
            IndexBase::One => 1,
        };

        let offsets = state.read_indices(args.offsets, rows + 1, args.offsets_type)?;
        let columns = state.read_indices(args.indices, nnz, args.indices_type)?;
        let values = state.read_values(args.values, nnz, args.value_type)?;
        let xs = state.read_values(x_vec.values, x_vec.size as usize, x_vec.value_type)?;

        let mut ys = vec![0.0f64; rows];
        for (row, y_row) in ys.iter_mut().enumerate() {
            let start = offsets[row].checked_sub(base).ok_or(Status::InvalidValue)?;
            let end = offsets[row + 1].checked_sub(base).ok_or(Status::InvalidValue)?;
            if start > end || end > nnz {
                return Err(Status::InvalidValue);
            }
            for (&col, &value) in columns[start..end].iter().zip(&values[start..end]) {
                let col = col.checked_sub(base).ok_or(Status::InvalidValue)?;
                let x = xs.get(col).ok_or(Status::InvalidValue)?;
                *y_row += value * x;
            }
        }

        state.write_values(y_vec.values, &ys, y_vec.value_type)
    }
}

impl Default for FakeSparseBackend {
    /// An Ampere-class device with a recent library
    fn default() -> Self {
        Self::new((8, 6), LibraryVersion::new(12, 5, 0))
    }
}

impl SparseBackend for FakeSparseBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn device_capability(&self) -> Result<ComputeCapability> {
        Ok(self.state.lock().capability)
    }

    fn library_version(&self) -> Result<LibraryVersion> {
        Ok(self.state.lock().version)
    }

    fn create_dn_mat(
        &self,
        rows: i64,
        cols: i64,
        ld: i64,
        values: u64,
        value_type: ValueType,
        order: Order,
    ) -> NativeResult<DnMatHandle> {
        let mut state = self.state.lock();
        state.enter("create_dn_mat")?;
        Ok(state.insert(FakeObject::DnMat(FakeDnMat {
            rows,
            cols,
            ld,
            values,
            value_type,
            order,
            batch: None,
        })))
    }

    fn dn_mat_set_strided_batch(
        &self,
        descr: DnMatHandle,
        batch_count: i32,
        batch_stride: i64,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("dn_mat_set_strided_batch")?;
        state.dn_mat_mut(descr)?.batch = Some((batch_count, batch_stride));
        Ok(())
    }

    fn destroy_dn_mat(&self, descr: DnMatHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("destroy_dn_mat")?;
        state.remove(descr)
    }

    fn create_dn_vec(
        &self,
        size: i64,
        values: u64,
        value_type: ValueType,
    ) -> NativeResult<DnVecHandle> {
        let mut state = self.state.lock();
        state.enter("create_dn_vec")?;
        Ok(state.insert(FakeObject::DnVec(FakeDnVec {
            size,
            values,
            value_type,
        })))
    }

    fn destroy_dn_vec(&self, descr: DnVecHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("destroy_dn_vec")?;
        state.remove(descr)
    }

    fn create_csr(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle> {
        let mut state = self.state.lock();
        state.enter("create_csr")?;
        Ok(state.insert(FakeObject::SpMat(FakeSpMat {
            format: SparseFormat::Csr,
            args: *args,
            batch: None,
            fill_mode: None,
            diag_type: None,
        })))
    }

    fn create_csc(&self, args: &CompressedArgs) -> NativeResult<SpMatHandle> {
        let mut state = self.state.lock();
        state.enter("create_csc")?;
        Ok(state.insert(FakeObject::SpMat(FakeSpMat {
            format: SparseFormat::Csc,
            args: *args,
            batch: None,
            fill_mode: None,
            diag_type: None,
        })))
    }

    fn csr_set_strided_batch(
        &self,
        descr: SpMatHandle,
        batch_count: i32,
        offsets_batch_stride: i64,
        columns_values_batch_stride: i64,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("csr_set_strided_batch")?;
        let mat = state.sp_mat_mut(descr)?;
        if mat.format != SparseFormat::Csr {
            return Err(Status::InvalidValue);
        }
        mat.batch = Some((batch_count, offsets_batch_stride, columns_values_batch_stride));
        Ok(())
    }

    fn csr_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        columns: u64,
        values: u64,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("csr_set_pointers")?;
        let mat = state.sp_mat_mut(descr)?;
        if mat.format != SparseFormat::Csr {
            return Err(Status::InvalidValue);
        }
        mat.args.offsets = offsets;
        mat.args.indices = columns;
        mat.args.values = values;
        Ok(())
    }

    fn csc_set_pointers(
        &self,
        descr: SpMatHandle,
        offsets: u64,
        rows: u64,
        values: u64,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("csc_set_pointers")?;
        let mat = state.sp_mat_mut(descr)?;
        if mat.format != SparseFormat::Csc {
            return Err(Status::InvalidValue);
        }
        mat.args.offsets = offsets;
        mat.args.indices = rows;
        mat.args.values = values;
        Ok(())
    }

    fn sp_mat_get_size(&self, descr: SpMatHandle) -> NativeResult<(i64, i64, i64)> {
        let mut state = self.state.lock();
        state.enter("sp_mat_get_size")?;
        let mat = state.sp_mat_mut(descr)?;
        Ok((mat.args.rows, mat.args.cols, mat.args.nnz))
    }

    fn sp_mat_set_attribute(
        &self,
        descr: SpMatHandle,
        attribute: SpMatAttribute,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("sp_mat_set_attribute")?;
        let mat = state.sp_mat_mut(descr)?;
        match attribute {
            SpMatAttribute::FillMode(fill_mode) => mat.fill_mode = Some(fill_mode),
            SpMatAttribute::DiagType(diag_type) => mat.diag_type = Some(diag_type),
        }
        Ok(())
    }

    fn destroy_sp_mat(&self, descr: SpMatHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("destroy_sp_mat")?;
        state.remove(descr)
    }

    fn spsv_create_descr(&self) -> NativeResult<SpSvHandle> {
        let mut state = self.state.lock();
        state.enter("spsv_create_descr")?;
        Ok(state.insert(FakeObject::Workspace(DescriptorKind::SpSv)))
    }

    fn spsv_destroy_descr(&self, descr: SpSvHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("spsv_destroy_descr")?;
        state.remove(descr)
    }

    fn spsm_create_descr(&self) -> NativeResult<SpSmHandle> {
        let mut state = self.state.lock();
        state.enter("spsm_create_descr")?;
        Ok(state.insert(FakeObject::Workspace(DescriptorKind::SpSm)))
    }

    fn spsm_destroy_descr(&self, descr: SpSmHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("spsm_destroy_descr")?;
        state.remove(descr)
    }

    fn spgemm_create_descr(&self) -> NativeResult<SpGemmHandle> {
        let mut state = self.state.lock();
        state.enter("spgemm_create_descr")?;
        Ok(state.insert(FakeObject::Workspace(DescriptorKind::SpGemm)))
    }

    fn spgemm_destroy_descr(&self, descr: SpGemmHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("spgemm_destroy_descr")?;
        state.remove(descr)
    }

    fn create_mat_descr(&self) -> NativeResult<MatHandle> {
        let mut state = self.state.lock();
        state.enter("create_mat_descr")?;
        Ok(state.insert(FakeObject::Workspace(DescriptorKind::Mat)))
    }

    fn destroy_mat_descr(&self, descr: MatHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter("destroy_mat_descr")?;
        state.remove(descr)
    }
}
