//! Element types of the tensors a descriptor can describe
//!
//! `DType` is the runtime tag a tensor view carries. The descriptor layer
//! maps it onto the native value and index tags in [`crate::runtime::types`];
//! not every `DType` has a native counterpart.

use std::fmt;

/// Element type reported by a tensor view
///
/// Discriminants are grouped by family (floats from 0, signed integers from
/// 10, unsigned from 20, bool at 30, complex from 40) and never reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// f64
    F64 = 0,
    /// f32
    F32 = 1,
    /// IEEE half precision
    F16 = 2,
    /// bfloat16
    BF16 = 3,

    /// i64
    I64 = 10,
    /// i32
    I32 = 11,
    /// i16
    I16 = 12,
    /// i8
    I8 = 13,

    /// u8
    U8 = 23,

    /// One byte per element, 0 or 1
    Bool = 30,

    /// Interleaved (re, im) pair of f32
    Complex64 = 40,
    /// Interleaved (re, im) pair of f64
    Complex128 = 41,
}

impl DType {
    /// Bytes per element; used to turn element offsets into addresses
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::Complex128 => 16,
            Self::F64 | Self::I64 | Self::Complex64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 | Self::I16 => 2,
            Self::I8 | Self::U8 | Self::Bool => 1,
        }
    }

    /// 16-bit float types, which older devices cannot run sparse kernels on
    #[inline]
    pub const fn is_reduced_precision(self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }

    /// Widths the native library accepts for sparse offsets and indices
    #[inline]
    pub const fn is_sparse_index(self) -> bool {
        matches!(self, Self::I32 | Self::I64)
    }

    /// Lowercase name as used in messages ("f16", "c64", ...)
    pub const fn name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::I16 => "i16",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::Bool => "bool",
            Self::Complex64 => "c64",
            Self::Complex128 => "c128",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
