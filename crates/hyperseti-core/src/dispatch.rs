//! Memory-space dispatch around a kernel
//!
//! [`on_device`] wraps a kernel so callers can hand it host buffers: every
//! host-resident positional [`Buffer`] is copied to the device before the
//! kernel runs. The wrapper also understands one reserved keyword,
//! `return_space`, which moves buffers in the result to `"cpu"` (host) or
//! `"gpu"` (device) memory after the kernel returns.
//!
//! ## Result normalization
//!
//! ```text
//! return_space   kernel output             returned
//! ------------   -----------------------   ------------------------------------
//! (absent)       anything                  unchanged
//! "gpu"/"cpu"    Single(value)             value converted if it is a buffer
//! "gpu"/"cpu"    Sequence of length 1      unchanged (treated like a single value)
//! "gpu"/"cpu"    Sequence of length != 1   each buffer element converted, order kept
//! ```
//!
//! A one-element sequence is handled like a bare value, and a sequence is not
//! itself a buffer, so `[buf]` comes back as-is even when `buf` sits in the
//! wrong space. Downstream kernels depend on this; keep it.
//!
//! ## Device copies
//!
//! Copies made for arguments belong to the call. When the call returns, each
//! copy is released unless the caller gets it back as a buffer in the output.
//! This holds for failed calls too, and for copies that `return_space="cpu"`
//! brings back to the host. Device buffers the caller passed in, or the
//! kernel allocated itself, are never released here.

use crate::binding::AcceleratorBinding;
use crate::buffer::{Buffer, DeviceHandle, MemorySpace};
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::value::{Args, CallResult, Value};
use hyperseti_tracing::performance::PerformanceSpan;
use std::fmt;
use std::sync::Arc;
use tracing::Dispatch;

/// Reserved keyword selecting where result buffers end up
pub const RETURN_SPACE_KWARG: &str = "return_space";

/// Requested placement of result buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnSpace {
    /// `"cpu"`: host memory
    Cpu,
    /// `"gpu"`: device memory
    Gpu,
}

impl ReturnSpace {
    /// Parse the `return_space` keyword value.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for anything but the text values `"cpu"` and `"gpu"`.
    pub fn parse(value: &Value) -> Result<Self> {
        match value.as_text() {
            Some("cpu") => Ok(Self::Cpu),
            Some("gpu") => Ok(Self::Gpu),
            Some(other) => Err(Error::Validation(format!(
                "{RETURN_SPACE_KWARG} must be 'cpu' or 'gpu', got '{other}'"
            ))),
            None => Err(Error::Validation(format!(
                "{RETURN_SPACE_KWARG} must be 'cpu' or 'gpu', got a {}",
                value.type_name()
            ))),
        }
    }

    /// Memory space result buffers are moved to
    pub fn target(self) -> MemorySpace {
        match self {
            ReturnSpace::Cpu => MemorySpace::Host,
            ReturnSpace::Gpu => MemorySpace::Device,
        }
    }

    /// Keyword value this variant parses from
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnSpace::Cpu => "cpu",
            ReturnSpace::Gpu => "gpu",
        }
    }
}

impl fmt::Display for ReturnSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel wrapper that places arguments on the device, see [`on_device`]
pub struct OnDevice<K> {
    kernel: K,
    binding: Arc<dyn AcceleratorBinding>,
    dispatch: Option<Dispatch>,
}

/// Wrap `kernel` so host buffers passed positionally are moved to the
/// device through `binding`, and `return_space` is honoured on the result.
pub fn on_device<K: Kernel>(kernel: K, binding: Arc<dyn AcceleratorBinding>) -> OnDevice<K> {
    OnDevice {
        kernel,
        binding,
        dispatch: None,
    }
}

impl<K: Kernel> OnDevice<K> {
    /// Send this wrapper's log events to `dispatch` instead of the
    /// process-wide subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Binding used for every conversion
    pub fn binding(&self) -> &Arc<dyn AcceleratorBinding> {
        &self.binding
    }

    /// The wrapped kernel
    pub fn inner(&self) -> &K {
        &self.kernel
    }

    /// Unwrap, returning the kernel
    pub fn into_inner(self) -> K {
        self.kernel
    }

    fn dispatch_call(&self, mut args: Args) -> Result<CallResult> {
        let name = self.kernel.name();

        let return_space = args
            .take_kwarg(RETURN_SPACE_KWARG)
            .map(|value| ReturnSpace::parse(&value))
            .transpose()?;
        if let Some(space) = return_space {
            tracing::debug!(kernel = name, return_space = %space, "<{}> Return space requested: {}", name, space);
        }

        let mut copies = ArgCopies::new(self.binding.as_ref(), name);
        let positional = std::mem::take(&mut args.positional);
        args.positional = positional
            .into_iter()
            .enumerate()
            .map(|(idx, arg)| match arg {
                Value::Buffer(buf) if self.binding.is_host(&buf) => {
                    tracing::info!(kernel = name, arg = idx, "<{}> Converting arg {} to device", name, idx);
                    let copy = self.binding.to_device(buf)?;
                    copies.track(&copy);
                    Ok(Value::Buffer(copy))
                }
                other => Ok(other),
            })
            .collect::<Result<Vec<_>>>()?;

        let output = {
            let _perf = PerformanceSpan::new(name, None);
            self.kernel.call(args)?
        };

        let output = match return_space {
            None => output,
            Some(space) => self.normalize(output, space.target())?,
        };
        copies.keep_returned(&output);
        Ok(output)
    }

    fn normalize(&self, output: CallResult, target: MemorySpace) -> Result<CallResult> {
        let name = self.kernel.name();
        match output {
            CallResult::Single(Value::Buffer(buf)) if self.needs_move(&buf, target) => {
                tracing::info!(kernel = name, "<{}> Converting output to {}", name, target);
                Ok(CallResult::Single(Value::Buffer(self.convert(buf, target)?)))
            }
            single @ CallResult::Single(_) => Ok(single),
            CallResult::Sequence(values) if values.len() == 1 => Ok(CallResult::Sequence(values)),
            CallResult::Sequence(values) => values
                .into_iter()
                .enumerate()
                .map(|(idx, item)| match item {
                    Value::Buffer(buf) if self.needs_move(&buf, target) => {
                        tracing::info!(kernel = name, output = idx, "<{}> Converting output {} to {}", name, idx, target);
                        self.convert(buf, target).map(Value::Buffer)
                    }
                    other => Ok(other),
                })
                .collect::<Result<Vec<_>>>()
                .map(CallResult::Sequence),
        }
    }

    fn needs_move(&self, buf: &Buffer, target: MemorySpace) -> bool {
        match target {
            MemorySpace::Device => self.binding.is_host(buf),
            MemorySpace::Host => self.binding.is_device(buf),
        }
    }

    fn convert(&self, buf: Buffer, target: MemorySpace) -> Result<Buffer> {
        match target {
            MemorySpace::Device => self.binding.to_device(buf),
            MemorySpace::Host => self.binding.to_host(buf),
        }
    }
}

/// Device copies made for one call's arguments, released on drop unless
/// handed back to the caller
struct ArgCopies<'a> {
    binding: &'a dyn AcceleratorBinding,
    kernel: &'a str,
    handles: Vec<DeviceHandle>,
}

impl<'a> ArgCopies<'a> {
    fn new(binding: &'a dyn AcceleratorBinding, kernel: &'a str) -> Self {
        Self {
            binding,
            kernel,
            handles: Vec::new(),
        }
    }

    fn track(&mut self, buf: &Buffer) {
        if let Some(handle) = buf.device_handle() {
            self.handles.push(*handle);
        }
    }

    /// Stop tracking copies that appear in `output`; the caller owns those now.
    fn keep_returned(&mut self, output: &CallResult) {
        let mut returned = Vec::new();
        for value in output.values() {
            collect_handles(value, &mut returned);
        }
        self.handles.retain(|handle| !returned.contains(handle));
    }
}

impl Drop for ArgCopies<'_> {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = self.binding.release(&handle) {
                tracing::warn!(kernel = self.kernel, error = %e, "<{}> Failed to release argument copy", self.kernel);
            }
        }
    }
}

fn collect_handles(value: &Value, out: &mut Vec<DeviceHandle>) {
    match value {
        Value::Buffer(buf) => out.extend(buf.device_handle().copied()),
        Value::Structured(array) => out.extend(array.data().device_handle().copied()),
        Value::List(items) => items.iter().for_each(|item| collect_handles(item, out)),
        _ => {}
    }
}

impl<K: Kernel> Kernel for OnDevice<K> {
    fn name(&self) -> &str {
        self.kernel.name()
    }

    fn call(&self, args: Args) -> Result<CallResult> {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || self.dispatch_call(args)),
            None => self.dispatch_call(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SimulatedDevice;
    use crate::kernel::kernel_fn;

    #[test]
    fn parses_return_space() {
        assert_eq!(ReturnSpace::parse(&Value::from("cpu")).unwrap(), ReturnSpace::Cpu);
        assert_eq!(ReturnSpace::parse(&Value::from("gpu")).unwrap().target(), MemorySpace::Device);
        assert!(matches!(ReturnSpace::parse(&Value::from("GPU")), Err(Error::Validation(_))));
        assert!(matches!(ReturnSpace::parse(&Value::Int(1)), Err(Error::Validation(_))));
    }

    #[test]
    fn reserved_keyword_never_reaches_kernel() {
        let kernel = kernel_fn("echo_kwargs", |args: Args| {
            assert!(args.get(RETURN_SPACE_KWARG).is_none());
            Ok(Value::Int(args.keyword.len() as i64).into())
        });
        let wrapped = on_device(kernel, Arc::new(SimulatedDevice::new()));
        let out = wrapped
            .call(Args::new().kwarg("boxcar_size", 2i64).kwarg(RETURN_SPACE_KWARG, "cpu"))
            .unwrap();
        assert_eq!(out, CallResult::Single(Value::Int(1)));
    }

    #[test]
    fn invalid_return_space_skips_kernel() {
        let kernel = kernel_fn("must_not_run", |_| panic!("kernel should not run"));
        let wrapped = on_device(kernel, Arc::new(SimulatedDevice::new()));
        let err = wrapped.call(Args::new().kwarg(RETURN_SPACE_KWARG, "tpu")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
