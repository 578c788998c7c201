//! Hardware and library capability gating
//!
//! Two things decide whether a descriptor can be built: the compute
//! capability of the active device (some element types are only handled by
//! newer hardware) and the version of the linked sparse library (some
//! descriptor operations only exist in newer releases). Both are resolved
//! once, when a [`crate::SparseContext`] is created.

use crate::dtype::DType;
use crate::error::{Error, Result};
use std::fmt;

/// Compute capability of a device: an ordered (major, minor) version
///
/// # Examples
/// - (5, 3): Tegra X1 (first with native f16)
/// - (7, 5): Turing (RTX 20xx, T4)
/// - (8, 0): Ampere (A100)
/// - (9, 0): Hopper (H100)
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComputeCapability {
    /// Major revision
    pub major: u32,
    /// Minor revision
    pub minor: u32,
}

impl ComputeCapability {
    /// Create a compute capability from its revisions
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl From<(u32, u32)> for ComputeCapability {
    fn from((major, minor): (u32, u32)) -> Self {
        Self::new(major, minor)
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Minimum compute capability for f16 sparse operations
pub const F16_MIN_CAPABILITY: ComputeCapability = ComputeCapability::new(5, 3);

/// Minimum compute capability for bf16 sparse operations
pub const BF16_MIN_CAPABILITY: ComputeCapability = ComputeCapability::new(8, 0);

/// Check that the device can run sparse operations on `dtype`
///
/// f16 needs capability 5.3. bf16 needs 8.0, but only when the library
/// handles bf16 at all (`features.bf16`); otherwise the library rejects the
/// type on its own. Every other type passes.
pub fn check_supported(
    dtype: DType,
    capability: ComputeCapability,
    features: &LibraryFeatures,
) -> Result<()> {
    if !dtype.is_reduced_precision() {
        return Ok(());
    }
    let required = match dtype {
        DType::F16 => F16_MIN_CAPABILITY,
        DType::BF16 if features.bf16 => BF16_MIN_CAPABILITY,
        _ => return Ok(()),
    };

    if capability < required {
        return Err(Error::HardwareUnsupported {
            dtype,
            required,
            actual: capability,
        });
    }
    Ok(())
}

/// Version of the linked sparse library
///
/// Encoded natively as `major * 1000 + minor * 100 + patch`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibraryVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Patch level
    pub patch: u32,
}

impl LibraryVersion {
    /// Create a version from its parts
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Decode the native integer encoding
    pub const fn from_code(code: u32) -> Self {
        Self::new(code / 1000, (code % 1000) / 100, code % 100)
    }

    /// Native integer encoding
    pub const fn code(self) -> u32 {
        self.major * 1000 + self.minor * 100 + self.patch
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// First release with bf16, strided CSR batches, live size queries,
/// pointer updates and SpGEMM workspaces
pub const GENERIC_API_VERSION: LibraryVersion = LibraryVersion::new(11, 0, 0);

/// First release with triangular solves against a vector
pub const SPSV_VERSION: LibraryVersion = LibraryVersion::new(11, 5, 0);

/// First release with triangular solves against a matrix
pub const SPSM_VERSION: LibraryVersion = LibraryVersion::new(11, 7, 1);

/// Descriptor operations the linked library provides
///
/// Resolved once from the library version; gated operations branch on these
/// flags and report [`Error::FeatureUnavailable`] when unset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LibraryFeatures {
    /// Version the flags were derived from
    pub version: LibraryVersion,
    /// bf16 values are understood (and capability-gated)
    pub bf16: bool,
    /// Strided batches of CSR matrices
    pub csr_batching: bool,
    /// `get_size` and `set_tensor` on sparse descriptors
    pub spmat_queries: bool,
    /// Sparse-sparse multiply workspaces
    pub spgemm: bool,
    /// Triangular solve (vector) workspaces and the fill-mode / diag-type
    /// attributes they consume
    pub spsv: bool,
    /// Triangular solve (matrix) workspaces
    pub spsm: bool,
}

impl LibraryFeatures {
    /// Derive the feature set of a library release
    pub fn for_version(version: LibraryVersion) -> Self {
        let generic = version >= GENERIC_API_VERSION;
        Self {
            version,
            bf16: generic,
            csr_batching: generic,
            spmat_queries: generic,
            spgemm: generic,
            spsv: version >= SPSV_VERSION,
            spsm: version >= SPSM_VERSION,
        }
    }

    /// Fail with [`Error::FeatureUnavailable`] unless `available`
    pub(crate) fn require(&self, available: bool, feature: &'static str) -> Result<()> {
        if available {
            return Ok(());
        }
        tracing::warn!(feature, version = %self.version, "sparse library feature unavailable");
        Err(Error::FeatureUnavailable {
            feature,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest() -> LibraryFeatures {
        LibraryFeatures::for_version(LibraryVersion::new(12, 5, 0))
    }

    #[test]
    fn test_capability_ordering() {
        assert!(ComputeCapability::new(5, 2) < ComputeCapability::new(5, 3));
        assert!(ComputeCapability::new(7, 5) < ComputeCapability::new(8, 0));
        assert!(ComputeCapability::new(10, 0) > ComputeCapability::new(9, 9));
        assert_eq!(ComputeCapability::from((8, 6)).to_string(), "8.6");
    }

    #[test]
    fn test_f16_gate() {
        let features = latest();
        assert!(check_supported(DType::F16, ComputeCapability::new(5, 3), &features).is_ok());
        let err = check_supported(DType::F16, ComputeCapability::new(5, 2), &features).unwrap_err();
        match err {
            Error::HardwareUnsupported {
                dtype,
                required,
                actual,
            } => {
                assert_eq!(dtype, DType::F16);
                assert_eq!(required, ComputeCapability::new(5, 3));
                assert_eq!(actual, ComputeCapability::new(5, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bf16_gate() {
        let features = latest();
        assert!(check_supported(DType::BF16, ComputeCapability::new(8, 0), &features).is_ok());
        assert!(check_supported(DType::BF16, ComputeCapability::new(7, 5), &features).is_err());
    }

    #[test]
    fn test_bf16_gate_skipped_without_library_support() {
        let old = LibraryFeatures::for_version(LibraryVersion::new(10, 2, 0));
        assert!(!old.bf16);
        assert!(check_supported(DType::BF16, ComputeCapability::new(6, 0), &old).is_ok());
    }

    #[test]
    fn test_other_types_always_pass() {
        let features = latest();
        for dtype in [
            DType::F64,
            DType::F32,
            DType::I32,
            DType::I8,
            DType::Complex64,
            DType::Complex128,
        ] {
            assert!(check_supported(dtype, ComputeCapability::new(3, 0), &features).is_ok());
        }
    }

    #[test]
    fn test_version_code_roundtrip() {
        let version = LibraryVersion::from_code(11710);
        assert_eq!(version, LibraryVersion::new(11, 7, 10));
        assert_eq!(version.code(), 11710);
        assert_eq!(LibraryVersion::from_code(12502).to_string(), "12.5.2");
    }

    #[test]
    fn test_feature_thresholds() {
        let f = LibraryFeatures::for_version(LibraryVersion::new(11, 0, 0));
        assert!(f.bf16 && f.csr_batching && f.spmat_queries && f.spgemm);
        assert!(!f.spsv && !f.spsm);

        let f = LibraryFeatures::for_version(LibraryVersion::new(11, 6, 0));
        assert!(f.spsv && !f.spsm);

        let f = LibraryFeatures::for_version(LibraryVersion::new(12, 0, 0));
        assert!(f.spsv && f.spsm);
    }

    #[test]
    fn test_require_reports_version() {
        let f = LibraryFeatures::for_version(LibraryVersion::new(10, 1, 0));
        let err = f.require(f.spsv, "triangular solve").unwrap_err();
        assert!(matches!(
            err,
            Error::FeatureUnavailable {
                feature: "triangular solve",
                ..
            }
        ));
    }
}
