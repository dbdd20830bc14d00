//! Dynamic argument and result values passed through kernels
//!
//! Kernels in a hyperseti pipeline take a mix of arrays, scalars and option
//! flags. [`Args`] carries them as positional and keyword [`Value`]s so the
//! adapters can inspect and rewrite arguments without knowing the kernel's
//! concrete signature.

use crate::buffer::Buffer;
use crate::structured::StructuredArray;
use std::collections::BTreeMap;

/// Free-form attribute mapping carried by a [`StructuredArray`]
pub type Attrs = BTreeMap<String, Value>;

/// Attributes plus the derived `dt`, `t0`, `df`, `f0` entries
pub type MetadataMapping = BTreeMap<String, Value>;

/// A single argument or result value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Buffer(Buffer),
    Structured(StructuredArray),
    Scalar(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Metadata(MetadataMapping),
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Buffer(_) => "buffer",
            Value::Structured(_) => "structured array",
            Value::Scalar(_) => "scalar",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Metadata(_) => "metadata",
            Value::List(_) => "list",
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Value::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_metadata(&self) -> Option<&MetadataMapping> {
        match self {
            Value::Metadata(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Value::Buffer(_))
    }
}

impl From<Buffer> for Value {
    fn from(buf: Buffer) -> Self {
        Value::Buffer(buf)
    }
}

impl From<StructuredArray> for Value {
    fn from(array: StructuredArray) -> Self {
        Value::Structured(array)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Positional and keyword arguments for one kernel call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any previous value
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// Remove and return a keyword argument
    pub fn take_kwarg(&mut self, name: &str) -> Option<Value> {
        self.keyword.remove(name)
    }
}

/// What a kernel returns: one value or an ordered sequence of values
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Single(Value),
    Sequence(Vec<Value>),
}

impl CallResult {
    /// The single value, if this is not a sequence
    pub fn into_single(self) -> Option<Value> {
        match self {
            CallResult::Single(v) => Some(v),
            CallResult::Sequence(_) => None,
        }
    }

    /// The sequence elements, if this is a sequence
    pub fn into_sequence(self) -> Option<Vec<Value>> {
        match self {
            CallResult::Sequence(values) => Some(values),
            CallResult::Single(_) => None,
        }
    }

    /// All values in order, a single value counting as one
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        match self {
            CallResult::Single(v) => std::slice::from_ref(v).iter(),
            CallResult::Sequence(values) => values.iter(),
        }
    }
}

impl From<Value> for CallResult {
    fn from(v: Value) -> Self {
        CallResult::Single(v)
    }
}

impl From<Buffer> for CallResult {
    fn from(buf: Buffer) -> Self {
        CallResult::Single(Value::Buffer(buf))
    }
}

impl From<Vec<Value>> for CallResult {
    fn from(values: Vec<Value>) -> Self {
        CallResult::Sequence(values)
    }
}
