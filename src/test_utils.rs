//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! Fixtures model a small plant: a boiler data set of built-in values and a pump data set
//! whose motor field is a structure type from the plant namespace.

#![cfg(any(test, feature = "benchmark"))]

use anyhow::Context;

use crate::schema::{
    DataSetMetadata, EnumDescription, FieldMetadata, Schema, SchemaBuilder, StructureDescription,
    StructureFieldDescription, TypeDescription, VALUE_RANK_ONE_DIMENSION,
};
use crate::types::{
    Array, BuiltInType, DataSet, DataValue, DateTime, ExtensionObject, FieldContent, NodeId, StatusCode,
    Structure, Value, Variant,
};

/// Namespace URI of the fixture types.
pub const PLANT_NAMESPACE: &str = "http://plant.example.com/UA/";

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn built_in(ty: BuiltInType) -> NodeId {
    NodeId::numeric("", u32::from(ty.id()))
}

pub fn motor_type_id() -> NodeId {
    NodeId::numeric(PLANT_NAMESPACE, 3001)
}

pub fn mode_type_id() -> NodeId {
    NodeId::numeric(PLANT_NAMESPACE, 3002)
}

/// `Motor { Speed: Double, Mode: Mode, Temperatures: Float[] }` plus the `Mode` enumeration.
pub fn motor_types() -> Vec<TypeDescription> {
    vec![
        TypeDescription::Structure(StructureDescription {
            data_type_id: motor_type_id(),
            name: "Motor".to_string(),
            fields: vec![
                StructureFieldDescription::scalar("Speed", built_in(BuiltInType::Double)),
                StructureFieldDescription::scalar("Mode", mode_type_id()),
                StructureFieldDescription::scalar("Temperatures", built_in(BuiltInType::Float))
                    .with_rank(VALUE_RANK_ONE_DIMENSION),
            ],
        }),
        TypeDescription::Enum(EnumDescription {
            data_type_id: mode_type_id(),
            name: "Mode".to_string(),
            symbols: vec!["Off".to_string(), "Auto".to_string(), "Manual".to_string()],
            is_option_set: false,
        }),
    ]
}

/// Boiler data set of built-in scalar and array fields.
pub fn boiler_metadata() -> DataSetMetadata {
    DataSetMetadata::new(Some("Boiler #1"))
        .with_field(FieldMetadata::built_in("Temperature", BuiltInType::Double))
        .with_field(FieldMetadata::built_in("Running", BuiltInType::Boolean))
        .with_field(FieldMetadata::built_in("Label", BuiltInType::String))
        .with_field(FieldMetadata::built_in("Samples", BuiltInType::Int32).with_rank(VALUE_RANK_ONE_DIMENSION))
        .with_field(FieldMetadata::built_in("LastChange", BuiltInType::DateTime))
}

/// Pump data set referencing the motor structure.
pub fn pump_metadata() -> DataSetMetadata {
    let mut metadata = DataSetMetadata::new(Some("Pump"))
        .with_field(FieldMetadata::built_in("Flow", BuiltInType::Float))
        .with_field(FieldMetadata::scalar("Motor", motor_type_id()));
    metadata.types = motor_types();
    metadata
}

/// Compile one fixture data set.
pub fn compile(metadata: &DataSetMetadata, content: FieldContent) -> anyhow::Result<Schema> {
    SchemaBuilder::new()
        .compile_data_set(metadata, content)
        .with_context(|| format!("compiling data set {}", metadata.record_name()))
}

/// Boiler sample number `n`, with status and timestamps when `content` asks for them.
pub fn boiler_sample(n: u32, content: FieldContent) -> DataSet {
    let samples = (0..n % 5).map(|i| Value::Int32(i as i32 * 10)).collect();
    let samples = Array::new(BuiltInType::Int32, samples).map(Variant::Array).unwrap_or_default();
    let changed = DateTime::from_unix_millis(1_700_000_000_000 + i64::from(n) * 1000);
    let wrap = |value: Variant| match content {
        FieldContent::RawData => DataValue::new(value),
        FieldContent::DataValue => DataValue {
            value,
            status: if n % 3 == 0 { StatusCode::UNCERTAIN } else { StatusCode::GOOD },
            source_timestamp: changed,
            source_picoseconds: (n % 10) as u16,
            server_timestamp: changed,
            server_picoseconds: 0,
        },
    };
    let label = if n % 4 == 0 { Variant::Null } else { Variant::from(format!("sample {n}")) };

    let mut data_set = DataSet::new(Some("Boiler #1".to_string()))
        .with_field("Temperature", wrap(Variant::from(80.0 + f64::from(n) * 0.25)))
        .with_field("Running", wrap(Variant::from(n % 2 == 0)))
        .with_field("Label", wrap(label))
        .with_field("Samples", wrap(samples))
        .with_field("LastChange", wrap(Variant::from(changed)));
    data_set.set_field_content(content);
    data_set
}

/// Pump sample number `n` in raw shape.
pub fn pump_sample(n: u32) -> DataSet {
    let temperatures = (0..3).map(|i| Value::Float(40.0 + i as f32 + n as f32)).collect();
    let motor = Structure::new()
        .with("Speed", 1450.0 + f64::from(n))
        .with("Mode", Variant::Scalar(Value::Enumeration((n % 3) as i32)))
        .with("Temperatures", Array::new(BuiltInType::Float, temperatures).map(Variant::Array).unwrap_or_default());
    DataSet::new(Some("Pump".to_string()))
        .with_field("Flow", DataValue::new(12.5f32))
        .with_field("Motor", DataValue::new(ExtensionObject::structure(motor_type_id(), motor)))
}
