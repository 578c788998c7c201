//! Native tags and raw handles of the sparse library API

use crate::dtype::DType;
use crate::error::{Error, Result};
use std::ffi::c_void;
use std::fmt;

/// Non-success status reported by a native call
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Status {
    /// Library was not initialized
    NotInitialized,
    /// Resource allocation failed inside the library
    AllocFailed,
    /// An unsupported value or parameter was passed
    InvalidValue,
    /// The device lacks a feature the call needs
    ArchMismatch,
    /// Access to device memory failed
    MappingError,
    /// A device program failed to execute
    ExecutionFailed,
    /// Internal library failure
    InternalError,
    /// The matrix type is not supported by this call
    MatrixTypeNotSupported,
    /// A zero pivot was found
    ZeroPivot,
    /// The operation or data type combination is not supported
    NotSupported,
    /// Not enough resources for the computation
    InsufficientResources,
    /// A status code this crate does not know
    Other(i32),
}

/// Native code for success
pub const STATUS_SUCCESS: i32 = 0;

impl Status {
    /// Translate a native status code; `None` for success
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            STATUS_SUCCESS => return None,
            1 => Self::NotInitialized,
            2 => Self::AllocFailed,
            3 => Self::InvalidValue,
            4 => Self::ArchMismatch,
            5 => Self::MappingError,
            6 => Self::ExecutionFailed,
            7 => Self::InternalError,
            8 => Self::MatrixTypeNotSupported,
            9 => Self::ZeroPivot,
            10 => Self::NotSupported,
            11 => Self::InsufficientResources,
            other => Self::Other(other),
        };
        Some(status)
    }

    /// Native status code
    pub fn code(self) -> i32 {
        match self {
            Self::NotInitialized => 1,
            Self::AllocFailed => 2,
            Self::InvalidValue => 3,
            Self::ArchMismatch => 4,
            Self::MappingError => 5,
            Self::ExecutionFailed => 6,
            Self::InternalError => 7,
            Self::MatrixTypeNotSupported => 8,
            Self::ZeroPivot => 9,
            Self::NotSupported => 10,
            Self::InsufficientResources => 11,
            Self::Other(code) => code,
        }
    }

    /// Convert a raw status code into a native result
    #[inline]
    pub fn check(code: i32) -> NativeResult<()> {
        match Self::from_code(code) {
            None => Ok(()),
            Some(status) => Err(status),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotInitialized => "not initialized",
            Self::AllocFailed => "allocation failed",
            Self::InvalidValue => "invalid value",
            Self::ArchMismatch => "architecture mismatch",
            Self::MappingError => "mapping error",
            Self::ExecutionFailed => "execution failed",
            Self::InternalError => "internal error",
            Self::MatrixTypeNotSupported => "matrix type not supported",
            Self::ZeroPivot => "zero pivot",
            Self::NotSupported => "not supported",
            Self::InsufficientResources => "insufficient resources",
            Self::Other(_) => "unknown status",
        };
        write!(f, "{name} (status {})", self.code())
    }
}

/// Result of a raw native call
pub type NativeResult<T> = std::result::Result<T, Status>;

/// Native element-type tags
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ValueType {
    /// f16
    R_16F,
    /// bf16
    R_16BF,
    /// f32
    R_32F,
    /// f64
    R_64F,
    /// complex f32
    C_32F,
    /// complex f64
    C_64F,
    /// i8
    R_8I,
    /// u8
    R_8U,
    /// i32
    R_32I,
}

/// Map a tensor element type onto the native value tag
pub fn to_native_value_type(dtype: DType) -> Result<ValueType> {
    match dtype {
        DType::F16 => Ok(ValueType::R_16F),
        DType::BF16 => Ok(ValueType::R_16BF),
        DType::F32 => Ok(ValueType::R_32F),
        DType::F64 => Ok(ValueType::R_64F),
        DType::Complex64 => Ok(ValueType::C_32F),
        DType::Complex128 => Ok(ValueType::C_64F),
        DType::I8 => Ok(ValueType::R_8I),
        DType::U8 => Ok(ValueType::R_8U),
        DType::I32 => Ok(ValueType::R_32I),
        other => Err(Error::unsupported_dtype(other, "sparse descriptor values")),
    }
}

/// Native index-width tags
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 32-bit signed indices
    I32,
    /// 64-bit signed indices
    I64,
}

/// Map an index element type onto the native index tag
///
/// # Panics
/// On any dtype other than `I32` or `I64`. Callers validate index dtypes
/// before reaching the descriptor layer.
pub fn to_native_index_type(dtype: DType) -> IndexType {
    crate::invariant!(
        dtype.is_sparse_index(),
        "cannot convert type {dtype} to a sparse index type"
    );
    if dtype == DType::I32 {
        IndexType::I32
    } else {
        IndexType::I64
    }
}

/// Base of stored indices
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexBase {
    /// Indices start at 0
    Zero,
    /// Indices start at 1
    One,
}

/// Storage order of a dense matrix
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Order {
    /// Row-major
    Row,
    /// Column-major
    Col,
}

/// Which triangle of a sparse matrix is referenced
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FillMode {
    /// Lower triangle
    Lower,
    /// Upper triangle
    Upper,
}

/// Whether the diagonal is stored or implicitly one
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiagType {
    /// Diagonal entries are read from the matrix
    NonUnit,
    /// Diagonal entries are assumed to be one
    Unit,
}

/// Attributes settable on a sparse matrix descriptor
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpMatAttribute {
    /// Triangle used by triangular solves
    FillMode(FillMode),
    /// Diagonal convention used by triangular solves
    DiagType(DiagType),
}

/// Arguments of a compressed (CSR/CSC) descriptor factory
///
/// For CSR, `offsets` has `rows + 1` entries and `indices` are column
/// indices; for CSC, `offsets` has `cols + 1` entries and `indices` are row
/// indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressedArgs {
    /// Rows of one matrix
    pub rows: i64,
    /// Columns of one matrix
    pub cols: i64,
    /// Stored elements of one matrix
    pub nnz: i64,
    /// Device address of the offsets
    pub offsets: u64,
    /// Device address of the plain indices
    pub indices: u64,
    /// Device address of the values
    pub values: u64,
    /// Width of the offsets
    pub offsets_type: IndexType,
    /// Width of the plain indices
    pub indices_type: IndexType,
    /// Base of every stored index
    pub index_base: IndexBase,
    /// Element type of the values
    pub value_type: ValueType,
}

/// The kinds of native descriptor this crate owns
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorKind {
    /// Dense matrix
    DnMat,
    /// Dense vector
    DnVec,
    /// Sparse matrix (any format)
    SpMat,
    /// Triangular solve (vector) workspace
    SpSv,
    /// Triangular solve (matrix) workspace
    SpSm,
    /// Sparse-sparse multiply workspace
    SpGemm,
    /// Legacy generic matrix descriptor
    Mat,
}

impl DescriptorKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 7] = [
        Self::DnMat,
        Self::DnVec,
        Self::SpMat,
        Self::SpSv,
        Self::SpSm,
        Self::SpGemm,
        Self::Mat,
    ];

    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::DnMat => "dense matrix",
            Self::DnVec => "dense vector",
            Self::SpMat => "sparse matrix",
            Self::SpSv => "spsv",
            Self::SpSm => "spsm",
            Self::SpGemm => "spgemm",
            Self::Mat => "matrix",
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw, nullable native handle
pub trait RawHandle: Copy + fmt::Debug + 'static {
    /// Kind of descriptor the handle refers to
    const KIND: DescriptorKind;

    /// Wrap a raw pointer returned by a native factory
    fn from_ptr(ptr: *mut c_void) -> Self;

    /// The raw pointer to pass into native calls
    fn as_ptr(self) -> *mut c_void;

    /// Check for the null handle
    #[inline]
    fn is_null(self) -> bool {
        self.as_ptr().is_null()
    }
}

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(*mut c_void);

        impl $name {
            /// The null handle
            pub const fn null() -> Self {
                Self(std::ptr::null_mut())
            }
        }

        impl RawHandle for $name {
            const KIND: DescriptorKind = DescriptorKind::$kind;

            #[inline]
            fn from_ptr(ptr: *mut c_void) -> Self {
                Self(ptr)
            }

            #[inline]
            fn as_ptr(self) -> *mut c_void {
                self.0
            }
        }
    };
}

raw_handle!(
    /// Raw dense matrix descriptor
    DnMatHandle => DnMat
);
raw_handle!(
    /// Raw dense vector descriptor
    DnVecHandle => DnVec
);
raw_handle!(
    /// Raw sparse matrix descriptor
    SpMatHandle => SpMat
);
raw_handle!(
    /// Raw triangular solve (vector) descriptor
    SpSvHandle => SpSv
);
raw_handle!(
    /// Raw triangular solve (matrix) descriptor
    SpSmHandle => SpSm
);
raw_handle!(
    /// Raw sparse-sparse multiply descriptor
    SpGemmHandle => SpGemm
);
raw_handle!(
    /// Raw legacy matrix descriptor
    MatHandle => Mat
);
