//! Accelerator bindings: the host/device copy primitives
//!
//! The adapters never touch accelerator memory themselves. They ask an
//! [`AcceleratorBinding`] whether a buffer is host- or device-resident and
//! to copy it across. Two bindings ship with the crate:
//!
//! - [`SimulatedDevice`]: host RAM standing in for device memory (always available)
//! - `CudaDevice`: NVIDIA GPUs through `cudarc` (feature `cuda`)

mod simulated;

#[cfg(feature = "cuda")]
mod cuda;

pub use simulated::SimulatedDevice;

#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;

use crate::buffer::{Buffer, DeviceHandle, Storage};
use crate::error::{Error, Result};
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Capability interface supplied by an accelerator binding.
///
/// Conversions take the buffer by value and hand back the converted buffer.
/// Converting a buffer that is already in the target space returns it
/// unchanged, without copying.
pub trait AcceleratorBinding: Send + Sync {
    /// Human-readable binding name (e.g. `cuda:0`)
    fn name(&self) -> &str;

    fn is_host(&self, buf: &Buffer) -> bool {
        matches!(buf.storage(), Storage::Host(_))
    }

    fn is_device(&self, buf: &Buffer) -> bool {
        matches!(buf.storage(), Storage::Device(_))
    }

    /// Copy a host buffer into device memory
    fn to_device(&self, buf: Buffer) -> Result<Buffer>;

    /// Copy a device buffer back to host memory. The device allocation stays
    /// alive until [`AcceleratorBinding::release`].
    fn to_host(&self, buf: Buffer) -> Result<Buffer>;

    /// Free a device allocation made by this binding
    fn release(&self, handle: &DeviceHandle) -> Result<()>;
}

/// Which binding [`open_binding`] should create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceleratorKind {
    /// Host-memory stand-in (always available)
    Simulated,
    /// CUDA device 0 (requires the `cuda` feature)
    Cuda,
}

impl AcceleratorKind {
    /// Read `HYPERSETI_ACCELERATOR` (`simulated` or `cuda`), defaulting to
    /// [`AcceleratorKind::Simulated`] when unset or unrecognised.
    pub fn from_env() -> Self {
        match env::var("HYPERSETI_ACCELERATOR") {
            Ok(value) => Self::parse(&value).unwrap_or_else(|| {
                tracing::warn!(value = %value, "unknown HYPERSETI_ACCELERATOR, using simulated device");
                Self::Simulated
            }),
            Err(_) => Self::Simulated,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simulated" | "sim" | "host" => Some(Self::Simulated),
            "cuda" | "gpu" => Some(Self::Cuda),
            _ => None,
        }
    }
}

/// Create a binding of the requested kind.
///
/// # Errors
///
/// [`Error::BackendUnavailable`] when CUDA is requested but not compiled in
/// or no device can be opened.
#[tracing::instrument]
pub fn open_binding(kind: AcceleratorKind) -> Result<Arc<dyn AcceleratorBinding>> {
    match kind {
        AcceleratorKind::Simulated => Ok(Arc::new(SimulatedDevice::new())),
        #[cfg(feature = "cuda")]
        AcceleratorKind::Cuda => Ok(Arc::new(CudaDevice::new(0)?)),
        #[cfg(not(feature = "cuda"))]
        AcceleratorKind::Cuda => Err(Error::BackendUnavailable(
            "CUDA support not compiled in (enable the `cuda` feature)".to_string(),
        )),
    }
}

/// Open the binding selected by `HYPERSETI_ACCELERATOR`.
pub fn open_default_binding() -> Result<Arc<dyn AcceleratorBinding>> {
    open_binding(AcceleratorKind::from_env())
}

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// Unique id stamped into every [`DeviceHandle`] a binding creates
pub(crate) fn next_binding_id() -> u64 {
    NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed)
}

/// Reject device handles minted by another binding instance
pub(crate) fn check_owner(binding: u64, handle: &DeviceHandle) -> Result<()> {
    if handle.binding() != binding {
        return Err(Error::ForeignAllocation {
            owner: handle.binding(),
            binding,
        });
    }
    Ok(())
}
