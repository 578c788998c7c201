//! Error types for spdesc
//!
//! Two kinds of failure exist in this crate:
//!
//! - **Recoverable** conditions are returned as [`Error`]: the device cannot
//!   handle an element type, the native library rejected a call, or the
//!   linked library is too old for a requested feature.
//! - **Contract violations** by the caller (malformed layout, wrong index
//!   dtype, mismatched batch counts) abort through [`invariant!`]. They
//!   signal a bug in the calling kernel, not a runtime condition.

use crate::capability::{ComputeCapability, LibraryVersion};
use crate::dtype::DType;
use crate::runtime::Status;
use thiserror::Error;

/// Result type alias using spdesc's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by descriptor construction and descriptor operations
#[derive(Error, Debug)]
pub enum Error {
    /// The active device is too old for the element type
    #[error(
        "Sparse operations with tensors of {dtype} type are not supported on devices with compute capability < {required} (current: {actual})"
    )]
    HardwareUnsupported {
        /// The offending element type
        dtype: DType,
        /// Minimum compute capability for this type
        required: ComputeCapability,
        /// Compute capability of the active device
        actual: ComputeCapability,
    },

    /// A native library call returned a non-success status
    #[error("{call} failed: {status}")]
    Native {
        /// Name of the failing native entry point
        call: &'static str,
        /// Status reported by the library
        status: Status,
    },

    /// The element type has no native equivalent
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// The linked library does not provide the requested descriptor operation
    #[error("{feature} is not available with sparse library {version}")]
    FeatureUnavailable {
        /// The missing feature
        feature: &'static str,
        /// Version of the linked library
        version: LibraryVersion,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// CUDA driver error while querying the device
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),
}

impl Error {
    /// Create a native status error
    pub fn native(call: &'static str, status: Status) -> Self {
        Self::Native { call, status }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// The native status, if this error came from a native call
    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Native { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Extension for turning a native status into a crate error tagged with the
/// name of the native call
pub(crate) trait NativeResultExt<T> {
    fn or_native(self, call: &'static str) -> Result<T>;
}

impl<T> NativeResultExt<T> for std::result::Result<T, Status> {
    #[inline]
    fn or_native(self, call: &'static str) -> Result<T> {
        self.map_err(|status| Error::native(call, status))
    }
}

/// Abort on a broken caller contract
///
/// Always checked, in release builds too. The panic message starts with
/// `invariant violation:`.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("invariant violation: {}", format_args!($($arg)+));
        }
    };
}

/// Convert a count to the native 32-bit integer type
pub(crate) fn int_cast(value: usize, arg: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        Error::invalid_argument(arg, format!("{value} does not fit in a 32-bit integer"))
    })
}
