//! Axis-aware arrays: a raw buffer plus dimension scales and attributes
//!
//! Filterbank data arrives as `(time, beam_id, frequency)` arrays whose time
//! and frequency dimensions are described by an [`AxisDescriptor`]
//! (`start + i * step`, both scaled by `units`).

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::value::{Attrs, Value};
use std::collections::BTreeMap;

/// Name of the time dimension
pub const TIME_AXIS: &str = "time";
/// Name of the frequency dimension
pub const FREQUENCY_AXIS: &str = "frequency";

/// Sampling of one dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisDescriptor {
    /// Scale factor to SI units (e.g. `1e6` for MHz)
    pub units: f64,
    /// Step between samples, in `units`
    pub val_step: f64,
    /// Value of the first sample, in `units`
    pub val_start: f64,
}

impl AxisDescriptor {
    pub const fn new(units: f64, val_step: f64, val_start: f64) -> Self {
        Self {
            units,
            val_step,
            val_start,
        }
    }

    /// Start of a time axis. Returned as stored, without applying `units`.
    pub fn time_start(&self) -> f64 {
        self.val_start
    }

    /// `units * val_step`
    pub fn scaled_step(&self) -> f64 {
        self.units * self.val_step
    }

    /// `units * val_start`
    pub fn scaled_start(&self) -> f64 {
        self.units * self.val_start
    }
}

/// Buffer plus dimension names, axis descriptors and free-form attributes
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredArray {
    data: Buffer,
    dims: Vec<String>,
    axes: BTreeMap<String, AxisDescriptor>,
    attrs: Attrs,
}

impl StructuredArray {
    /// Wrap `data` with one dimension name per axis of its shape.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidShape`] when the number of names differs from the
    /// buffer's rank.
    pub fn new<S: Into<String>>(data: Buffer, dims: impl IntoIterator<Item = S>) -> Result<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.ndim() {
            return Err(Error::InvalidShape(format!(
                "{} dimension names for data of shape {:?}",
                dims.len(),
                data.shape()
            )));
        }
        Ok(Self {
            data,
            dims,
            axes: BTreeMap::new(),
            attrs: Attrs::new(),
        })
    }

    /// Attach a scale to the named dimension
    pub fn with_axis(mut self, name: impl Into<String>, axis: AxisDescriptor) -> Self {
        self.axes.insert(name.into(), axis);
        self
    }

    /// Set one attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn data(&self) -> &Buffer {
        &self.data
    }

    pub fn into_data(self) -> Buffer {
        self.data
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        &mut self.attrs
    }

    /// Descriptor of the named axis, or [`Error::MissingAxis`].
    pub fn axis(&self, name: &str) -> Result<&AxisDescriptor> {
        self.axes.get(name).ok_or_else(|| Error::MissingAxis(name.to_string()))
    }

    pub fn time(&self) -> Result<&AxisDescriptor> {
        self.axis(TIME_AXIS)
    }

    pub fn frequency(&self) -> Result<&AxisDescriptor> {
        self.axis(FREQUENCY_AXIS)
    }
}
