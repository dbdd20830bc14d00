//! Error types for hyperseti-core

use std::fmt;

/// Result type for hyperseti-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by buffers, bindings and the kernel adapters.
///
/// Apart from [`Error::Validation`], which the dispatcher raises itself, every
/// variant reaches the caller exactly as the failing collaborator produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A reserved adapter option carried an unsupported value
    #[error("validation error: {0}")]
    Validation(String),

    /// Failure reported by a wrapped kernel
    #[error("kernel '{kernel}' failed: {message}")]
    Kernel { kernel: String, message: String },

    /// Structured array has no axis with this name
    #[error("structured array has no '{0}' axis")]
    MissingAxis(String),

    /// Invalid structured-array or buffer shape
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Buffer size mismatch
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Element type mismatch
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Host data was requested from a device-resident buffer
    #[error("buffer is device-resident; copy it to host first")]
    NotOnHost,

    /// Device buffer belongs to another accelerator binding
    #[error("device buffer belongs to binding {owner}, not {binding}")]
    ForeignAllocation { owner: u64, binding: u64 },

    /// Device handle is unknown to the binding (already released)
    #[error("invalid device handle: {0}")]
    InvalidDeviceHandle(u64),

    /// Copy primitive failed inside the accelerator binding
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Requested accelerator is not compiled in or not present
    #[error("accelerator backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl Error {
    /// Create a kernel failure attributed to `kernel`
    pub fn kernel(kernel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Kernel {
            kernel: kernel.into(),
            message: message.to_string(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a transfer error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }
}
