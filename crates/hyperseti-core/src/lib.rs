//! # hyperseti-core - kernel adapters for the drift-search pipeline
//!
//! Search kernels (dedoppler, boxcar, hit finding) want raw buffers in
//! accelerator memory and a flat metadata mapping. Callers usually hold host
//! arrays with axis scales attached. This crate bridges the two with two
//! independent wrappers:
//!
//! - [`on_device`]: copies host buffer arguments to the device, and moves result
//!   buffers to the space named by the `return_space` keyword (`"cpu"`/`"gpu"`)
//! - [`with_metadata`]: replaces a [`StructuredArray`] first argument with its
//!   buffer and passes `dt`, `t0`, `df`, `f0` plus its attributes as `metadata`
//!
//! Both wrappers are [`Kernel`]s, so they nest in either order.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use hyperseti_core::{kernel_fn, on_device, Args, Buffer, CallResult, Kernel, MemorySpace, SimulatedDevice, Value};
//!
//! let binding = Arc::new(SimulatedDevice::new());
//! let wrapped = on_device(
//!     kernel_fn("passthrough", |args: Args| Ok(CallResult::Sequence(args.positional))),
//!     binding,
//! );
//!
//! let out = wrapped.call(
//!     Args::new()
//!         .arg(Buffer::vector(&[1.0f32, 2.0, 3.0]))
//!         .arg(0.5)
//!         .kwarg("return_space", "cpu"),
//! )?;
//!
//! let values = out.into_sequence().unwrap();
//! assert_eq!(values[0].as_buffer().unwrap().space(), MemorySpace::Host);
//! assert_eq!(values[1], Value::Scalar(0.5));
//! # Ok::<(), hyperseti_core::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`buffer`] - host/device tagged buffers
//! - [`binding`] - accelerator copy primitives (simulated, CUDA)
//! - [`structured`] - axis-aware arrays
//! - [`dispatch`] - memory-space dispatcher
//! - [`metadata`] - metadata extraction adapter

pub mod binding;
pub mod buffer;
pub mod dispatch;
pub mod error;
pub mod kernel;
pub mod metadata;
pub mod structured;
pub mod value;

pub use binding::{open_binding, open_default_binding, AcceleratorBinding, AcceleratorKind, SimulatedDevice};
pub use buffer::{Buffer, DType, DeviceHandle, Element, MemorySpace, Storage};
pub use dispatch::{on_device, OnDevice, ReturnSpace, RETURN_SPACE_KWARG};
pub use error::{Error, Result};
pub use kernel::{kernel_fn, FnKernel, Kernel};
pub use metadata::{derive_metadata, with_metadata, WithMetadata, METADATA_KWARG};
pub use structured::{AxisDescriptor, StructuredArray, FREQUENCY_AXIS, TIME_AXIS};
pub use value::{Args, Attrs, CallResult, MetadataMapping, Value};

#[cfg(feature = "cuda")]
pub use binding::CudaDevice;
