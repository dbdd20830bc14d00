//! The kernel abstraction the adapters wrap
//!
//! A kernel is any named computation taking [`Args`] and producing a
//! [`CallResult`]. The adapters in [`crate::dispatch`] and [`crate::metadata`]
//! are kernels themselves, so wrappers stack in any order:
//!
//! ```text
//! use hyperseti_core::{kernel_fn, on_device, with_metadata, SimulatedDevice};
//!
//! let dedoppler = kernel_fn("dedoppler", |args| { /* ... */ });
//! let wrapped = with_metadata(on_device(dedoppler, Arc::new(SimulatedDevice::new())));
//! let result = wrapped.call(Args::new().arg(data_array).kwarg("return_space", "cpu"))?;
//! ```

use crate::error::Result;
use crate::value::{Args, CallResult};
use std::fmt;
use std::sync::Arc;

/// A named numeric computation
pub trait Kernel {
    /// Name used in log events
    fn name(&self) -> &str;

    /// Run the computation
    fn call(&self, args: Args) -> Result<CallResult>;
}

impl<K: Kernel + ?Sized> Kernel for Box<K> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn call(&self, args: Args) -> Result<CallResult> {
        (**self).call(args)
    }
}

impl<K: Kernel + ?Sized> Kernel for Arc<K> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn call(&self, args: Args) -> Result<CallResult> {
        (**self).call(args)
    }
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn call(&self, args: Args) -> Result<CallResult> {
        (**self).call(args)
    }
}

/// Kernel built from a closure, see [`kernel_fn`]
pub struct FnKernel<F> {
    name: String,
    func: F,
}

impl<F> Kernel for FnKernel<F>
where
    F: Fn(Args) -> Result<CallResult>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Args) -> Result<CallResult> {
        (self.func)(args)
    }
}

impl<F> fmt::Debug for FnKernel<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnKernel").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Name a closure as a kernel
pub fn kernel_fn<F>(name: impl Into<String>, func: F) -> FnKernel<F>
where
    F: Fn(Args) -> Result<CallResult>,
{
    FnKernel {
        name: name.into(),
        func,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::value::Value;

    #[test]
    fn closure_kernel_runs() {
        let count = kernel_fn("count_args", |args: Args| Ok(Value::Int(args.positional.len() as i64).into()));
        assert_eq!(count.name(), "count_args");
        let out = count.call(Args::new().arg(1.0).arg(2.0)).unwrap();
        assert_eq!(out, CallResult::Single(Value::Int(2)));
    }

    #[test]
    fn boxed_and_shared_kernels_delegate() {
        let failing = kernel_fn("failing", |_| Err(Error::kernel("failing", "boom")));
        let shared: Arc<dyn Kernel> = Arc::new(failing);
        let boxed: Box<dyn Kernel> = Box::new(Arc::clone(&shared));
        assert_eq!(boxed.name(), "failing");
        assert!(matches!(boxed.call(Args::new()), Err(Error::Kernel { .. })));
    }
}
