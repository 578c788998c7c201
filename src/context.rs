//! Sparse context: a backend plus the facts resolved about it once

use crate::capability::{self, ComputeCapability, LibraryFeatures, LibraryVersion};
use crate::descriptor::Descriptor;
use crate::dtype::DType;
use crate::error::Result;
use crate::runtime::{NativeResult, RawHandle, SparseBackend};
use std::fmt;
use std::sync::Arc;

/// Shared entry point for building descriptors
///
/// Holds the backend together with the compute capability of the active
/// device and the feature set of the linked library. Both are resolved when
/// the context is built and never re-queried; descriptors consult them for
/// capability gating and feature gating.
///
/// Cloning is cheap (the backend is reference counted).
#[derive(Clone)]
pub struct SparseContext {
    backend: Arc<dyn SparseBackend>,
    capability: ComputeCapability,
    features: LibraryFeatures,
}

impl SparseContext {
    /// Create a context, querying capability and library version from the backend
    pub fn new(backend: Arc<dyn SparseBackend>) -> Result<Self> {
        Self::builder(backend).build()
    }

    /// Start building a context with optional overrides
    pub fn builder(backend: Arc<dyn SparseBackend>) -> SparseContextBuilder {
        SparseContextBuilder {
            backend,
            capability: None,
            version: None,
            features: None,
        }
    }

    /// The native backend
    #[inline]
    pub fn backend(&self) -> &dyn SparseBackend {
        self.backend.as_ref()
    }

    /// Compute capability of the active device
    #[inline]
    pub fn capability(&self) -> ComputeCapability {
        self.capability
    }

    /// Features of the linked library
    #[inline]
    pub fn features(&self) -> &LibraryFeatures {
        &self.features
    }

    /// Capability gate for `dtype` on the active device
    pub fn check_supported(&self, dtype: DType) -> Result<()> {
        capability::check_supported(dtype, self.capability, &self.features)
    }

    /// Take ownership of a freshly created native handle
    ///
    /// The returned wrapper calls `destroy` on this context's backend exactly
    /// once.
    pub(crate) fn own<H: RawHandle>(
        &self,
        raw: H,
        destroy: fn(&dyn SparseBackend, H) -> NativeResult<()>,
    ) -> Descriptor<H> {
        let backend = Arc::clone(&self.backend);
        Descriptor::create(raw, move |handle| destroy(backend.as_ref(), handle))
    }
}

impl fmt::Debug for SparseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseContext")
            .field("backend", &self.backend.name())
            .field("capability", &self.capability)
            .field("features", &self.features)
            .finish()
    }
}

/// Builder for [`SparseContext`]
///
/// Anything not set explicitly is queried from the backend on `build`.
pub struct SparseContextBuilder {
    backend: Arc<dyn SparseBackend>,
    capability: Option<ComputeCapability>,
    version: Option<LibraryVersion>,
    features: Option<LibraryFeatures>,
}

impl SparseContextBuilder {
    /// Pin the compute capability instead of querying the device
    pub fn capability(mut self, capability: impl Into<ComputeCapability>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    /// Pin the library version instead of querying the library
    pub fn library_version(mut self, version: LibraryVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// Use an explicit feature set, overriding the version-derived one
    pub fn features(mut self, features: LibraryFeatures) -> Self {
        self.features = Some(features);
        self
    }

    /// Resolve everything and build the context
    pub fn build(self) -> Result<SparseContext> {
        let capability = match self.capability {
            Some(capability) => capability,
            None => self.backend.device_capability()?,
        };
        let features = match (self.features, self.version) {
            (Some(features), _) => features,
            (None, Some(version)) => LibraryFeatures::for_version(version),
            (None, None) => LibraryFeatures::for_version(self.backend.library_version()?),
        };

        tracing::debug!(
            backend = self.backend.name(),
            %capability,
            version = %features.version,
            "sparse context ready"
        );

        Ok(SparseContext {
            backend: self.backend,
            capability,
            features,
        })
    }
}
