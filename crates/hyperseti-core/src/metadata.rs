//! Split structured arrays into raw data plus a metadata mapping
//!
//! Search kernels work on plain buffers and read sampling information from a
//! `metadata` keyword. [`with_metadata`] lets callers pass a
//! [`StructuredArray`] instead: the array's buffer replaces it as the first
//! positional argument and its attributes, plus the derived
//!
//! - `dt = time.units * time.val_step`
//! - `t0 = time.time_start`
//! - `df = frequency.units * frequency.val_step`
//! - `f0 = frequency.units * frequency.val_start`
//!
//! are passed as `metadata`.
//!
//! When the first argument is anything else the kernel receives the call
//! untouched and **no** `metadata` keyword is added. Kernels that always read
//! `metadata` must have it supplied by their caller in that case.

use crate::error::Result;
use crate::kernel::Kernel;
use crate::structured::StructuredArray;
use crate::value::{Args, CallResult, MetadataMapping, Value};

/// Keyword the derived mapping is passed under
pub const METADATA_KWARG: &str = "metadata";

/// Attributes of `array` plus `dt`, `t0`, `df` and `f0`.
///
/// Derived keys overwrite attributes of the same name.
///
/// # Errors
///
/// [`crate::Error::MissingAxis`] if the array lacks a time or frequency axis.
pub fn derive_metadata(array: &StructuredArray) -> Result<MetadataMapping> {
    let time = array.time()?;
    let frequency = array.frequency()?;

    let mut metadata = array.attrs().clone();
    metadata.insert("dt".to_string(), Value::Scalar(time.scaled_step()));
    metadata.insert("t0".to_string(), Value::Scalar(time.time_start()));
    metadata.insert("df".to_string(), Value::Scalar(frequency.scaled_step()));
    metadata.insert("f0".to_string(), Value::Scalar(frequency.scaled_start()));
    Ok(metadata)
}

/// Kernel wrapper that unpacks a structured first argument, see [`with_metadata`]
#[derive(Debug)]
pub struct WithMetadata<K> {
    kernel: K,
}

/// Wrap `kernel` so a [`StructuredArray`] first argument is replaced by its
/// buffer and a `metadata` keyword.
pub fn with_metadata<K: Kernel>(kernel: K) -> WithMetadata<K> {
    WithMetadata { kernel }
}

impl<K: Kernel> WithMetadata<K> {
    /// The wrapped kernel
    pub fn inner(&self) -> &K {
        &self.kernel
    }

    /// Unwrap, returning the kernel
    pub fn into_inner(self) -> K {
        self.kernel
    }
}

impl<K: Kernel> Kernel for WithMetadata<K> {
    fn name(&self) -> &str {
        self.kernel.name()
    }

    fn call(&self, mut args: Args) -> Result<CallResult> {
        let Some(Value::Structured(array)) = args.positional.first() else {
            return self.kernel.call(args);
        };
        let metadata = derive_metadata(array)?;
        tracing::debug!(
            kernel = self.kernel.name(),
            keys = metadata.len(),
            "<{}> Splitting metadata from structured array",
            self.kernel.name()
        );

        let first = std::mem::replace(&mut args.positional[0], Value::Metadata(MetadataMapping::new()));
        if let Value::Structured(array) = first {
            args.positional[0] = Value::Buffer(array.into_data());
        }
        args.keyword.insert(METADATA_KWARG.to_string(), Value::Metadata(metadata));

        self.kernel.call(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::structured::{AxisDescriptor, FREQUENCY_AXIS, TIME_AXIS};

    fn array() -> StructuredArray {
        StructuredArray::new(Buffer::from_slice(&[1.0f32; 4 * 8], &[4, 1, 8]).unwrap(), ["time", "beam_id", "frequency"])
            .unwrap()
            .with_axis(TIME_AXIS, AxisDescriptor::new(1.0, 18.253611008, 57650.78))
            .with_axis(FREQUENCY_AXIS, AxisDescriptor::new(1e6, -2.7939677238464355e-6, 8421.386717353016))
            .with_attr("source_name", "Voyager1")
            .with_attr("dt", "overwritten")
    }

    #[test]
    fn derived_keys_overwrite_attributes() {
        let metadata = derive_metadata(&array()).unwrap();
        assert_eq!(metadata.get("source_name").and_then(Value::as_text), Some("Voyager1"));
        assert_eq!(metadata.get("dt").and_then(Value::as_scalar), Some(18.253611008));
        assert_eq!(metadata.get("t0").and_then(Value::as_scalar), Some(57650.78));
        assert_eq!(metadata.len(), 5);
    }

    #[test]
    fn missing_time_axis_fails_before_kernel() {
        let bare = StructuredArray::new(Buffer::vector(&[0u8; 3]), ["frequency"])
            .unwrap()
            .with_axis(FREQUENCY_AXIS, AxisDescriptor::new(1.0, 1.0, 0.0));
        let kernel = crate::kernel::kernel_fn("must_not_run", |_| panic!("kernel should not run"));
        let err = with_metadata(kernel).call(Args::new().arg(bare)).unwrap_err();
        assert!(matches!(err, crate::Error::MissingAxis(ref axis) if axis == "time"));
    }
}
