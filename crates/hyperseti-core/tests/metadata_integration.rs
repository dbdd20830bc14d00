//! Integration tests for the metadata adapter and its composition with the
//! dispatcher

use hyperseti_core::{
    derive_metadata, kernel_fn, on_device, with_metadata, Args, AxisDescriptor, Buffer, CallResult, Error, Kernel,
    MemorySpace, SimulatedDevice, StructuredArray, Value, FREQUENCY_AXIS, METADATA_KWARG, RETURN_SPACE_KWARG,
    TIME_AXIS,
};
use std::sync::Arc;

fn waterfall() -> Buffer {
    let data: Vec<f32> = (0..32 * 64).map(|i| (i % 64) as f32).collect();
    Buffer::from_slice(&data, &[32, 1, 64]).unwrap()
}

fn data_array() -> StructuredArray {
    StructuredArray::new(waterfall(), ["time", "beam_id", "frequency"])
        .unwrap()
        .with_axis(TIME_AXIS, AxisDescriptor::new(1e-6, 1.0, 100.0))
        .with_axis(FREQUENCY_AXIS, AxisDescriptor::new(1e6, 0.5, 1000.0))
        .with_attr("source_name", "Voyager1")
        .with_attr("nchans", 64i64)
}

fn scalar(metadata: &Value, key: &str) -> f64 {
    metadata
        .as_metadata()
        .and_then(|m| m.get(key))
        .and_then(Value::as_scalar)
        .unwrap_or_else(|| panic!("missing scalar '{key}'"))
}

#[test]
fn derivation_is_exact() {
    let metadata = derive_metadata(&data_array()).unwrap();
    let metadata = Value::Metadata(metadata);

    assert_eq!(scalar(&metadata, "dt"), 1e-6);
    assert_eq!(scalar(&metadata, "t0"), 100.0);
    assert_eq!(scalar(&metadata, "df"), 5e5);
    assert_eq!(scalar(&metadata, "f0"), 1e9);
}

#[test]
fn structured_first_argument_is_split() -> hyperseti_core::Result<()> {
    let kernel = kernel_fn("dedoppler", |args: Args| {
        assert_eq!(args.positional[0], Value::Buffer(waterfall()));
        assert_eq!(args.positional[1], Value::Scalar(4.0));
        assert_eq!(args.get("boxcar_size"), Some(&Value::Int(1)));

        let metadata = args.get(METADATA_KWARG).and_then(Value::as_metadata).expect("metadata keyword");
        assert_eq!(metadata.get("source_name"), Some(&Value::from("Voyager1")));
        assert_eq!(metadata.get("nchans"), Some(&Value::Int(64)));
        assert_eq!(metadata.len(), 6);
        Ok(Value::Scalar(metadata["df"].as_scalar().unwrap_or_default()).into())
    });

    let out = with_metadata(kernel).call(Args::new().arg(data_array()).arg(4.0).kwarg("boxcar_size", 1i64))?;
    assert_eq!(out, CallResult::Single(Value::Scalar(5e5)));
    Ok(())
}

#[test]
fn plain_first_argument_gets_no_metadata() -> hyperseti_core::Result<()> {
    let kernel = kernel_fn("normalize", |args: Args| {
        if args.get(METADATA_KWARG).is_some() {
            return Err(Error::kernel("normalize", "unexpected metadata keyword"));
        }
        Ok(CallResult::Sequence(args.positional))
    });
    let wrapped = with_metadata(kernel);

    let out = wrapped.call(Args::new().arg(waterfall()).arg(data_array()))?;
    let values = out.into_sequence().expect("sequence");
    assert_eq!(values[0], Value::Buffer(waterfall()));
    assert_eq!(values[1], Value::Structured(data_array()));

    wrapped.call(Args::new())?;
    Ok(())
}

#[test]
fn caller_metadata_survives_without_structured_input() -> hyperseti_core::Result<()> {
    let kernel = kernel_fn("hitsearch", |args: Args| {
        Ok(args.get(METADATA_KWARG).cloned().expect("caller metadata").into())
    });
    let supplied = Value::Metadata([("df".to_string(), Value::Scalar(2.79))].into_iter().collect());

    let out = with_metadata(kernel).call(Args::new().arg(waterfall()).kwarg(METADATA_KWARG, supplied.clone()))?;
    assert_eq!(out, CallResult::Single(supplied));
    Ok(())
}

#[test]
fn missing_frequency_axis_propagates() {
    let malformed = StructuredArray::new(waterfall(), ["time", "beam_id", "frequency"])
        .unwrap()
        .with_axis(TIME_AXIS, AxisDescriptor::new(1.0, 18.0, 0.0));
    let kernel = kernel_fn("dedoppler", |_| Ok(Value::Bool(true).into()));

    let err = with_metadata(kernel).call(Args::new().arg(malformed)).unwrap_err();
    assert!(matches!(err, Error::MissingAxis(ref axis) if axis == "frequency"), "{err}");
}

#[test]
fn metadata_outside_dispatcher_sees_device_buffer() -> hyperseti_core::Result<()> {
    let kernel = kernel_fn("dedoppler", |args: Args| {
        assert_eq!(args.positional[0].as_buffer().map(Buffer::space), Some(MemorySpace::Device));
        assert!(args.get(METADATA_KWARG).is_some());
        Ok(CallResult::Sequence(vec![args.positional[0].clone(), Value::Scalar(1.0)]))
    });

    let wrapped = with_metadata(on_device(kernel, Arc::new(SimulatedDevice::new())));
    let out = wrapped.call(Args::new().arg(data_array()).kwarg(RETURN_SPACE_KWARG, "cpu"))?;

    let values = out.into_sequence().expect("sequence");
    assert_eq!(values[0], Value::Buffer(waterfall()));
    assert_eq!(wrapped.name(), "dedoppler");
    Ok(())
}

#[test]
fn metadata_inside_dispatcher_sees_host_buffer() -> hyperseti_core::Result<()> {
    let kernel = kernel_fn("dedoppler", |args: Args| {
        assert_eq!(args.positional[0].as_buffer().map(Buffer::space), Some(MemorySpace::Host));
        assert!(args.get(METADATA_KWARG).is_some());
        Ok(args.positional[0].clone().into())
    });

    let wrapped = on_device(with_metadata(kernel), Arc::new(SimulatedDevice::new()));
    let out = wrapped.call(Args::new().arg(data_array()).kwarg(RETURN_SPACE_KWARG, "gpu"))?;

    let value = out.into_single().expect("single value");
    assert_eq!(value.as_buffer().map(Buffer::space), Some(MemorySpace::Device));
    Ok(())
}
