//! Round trips through the validating codec using only the public API.

use anyhow::{Result, ensure};
use proptest::prelude::*;

use opcua_avro::binary::{BinaryReader, BinaryWriter};
use opcua_avro::schema::{
    BuiltInSchemas, DataSetMetadata, FieldMetadata, SchemaBuilder, VALUE_RANK_ONE_DIMENSION,
};
use opcua_avro::types::{Array, BuiltInType, DataSet, DataValue, DateTime, FieldContent, StatusCode, Value, Variant};
use opcua_avro::{CodecError, CodecOptions, SchemaDecoder, SchemaEncoder};

fn line_metadata() -> DataSetMetadata {
    DataSetMetadata::new(Some("Line/2"))
        .with_field(FieldMetadata::built_in("Speed", BuiltInType::Double))
        .with_field(FieldMetadata::built_in("Running", BuiltInType::Boolean))
        .with_field(FieldMetadata::built_in("Counts", BuiltInType::Int64).with_rank(VALUE_RANK_ONE_DIMENSION))
        .with_field(FieldMetadata::built_in("Operator", BuiltInType::String))
}

fn line_sample(speed: f64, running: bool, counts: Vec<i64>, operator: Option<String>) -> DataSet {
    let counts = Array::new(BuiltInType::Int64, counts.into_iter().map(Value::Int64).collect())
        .map(Variant::Array)
        .unwrap_or_default();
    DataSet::new(Some("Line/2".to_string()))
        .with_field("Speed", DataValue::new(speed))
        .with_field("Running", DataValue::new(running))
        .with_field("Counts", DataValue::new(counts))
        .with_field("Operator", DataValue::new(operator.map_or(Variant::Null, Variant::from)))
}

proptest! {
    #[test]
    fn prop_longs_survive_the_primitive_codec(values in prop::collection::vec(any::<i64>(), 1..64)) {
        let mut writer = BinaryWriter::new(Vec::new());
        for value in &values {
            writer.write_long(*value).unwrap();
        }
        let bytes = writer.into_inner();
        let mut reader = BinaryReader::new(bytes.as_slice());
        for value in &values {
            prop_assert_eq!(reader.read_long().unwrap(), *value);
        }
        prop_assert_eq!(reader.position(), bytes.len() as u64);
    }

    #[test]
    fn prop_raw_data_sets_round_trip(
        speed in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        running in any::<bool>(),
        counts in prop::collection::vec(any::<i64>(), 0..16),
        operator in prop::option::of("[a-zA-Z ]{0,12}")
    ) {
        let schema = SchemaBuilder::new().compile_data_set(&line_metadata(), FieldContent::RawData).unwrap();
        let data_set = line_sample(speed, running, counts, operator);

        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_data_set(&data_set).unwrap();
        encoder.finish_message().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
        let decoded = decoder.read_data_set().unwrap();
        decoder.finish_message().unwrap();
        prop_assert_eq!(decoded, data_set);
    }
}

#[test]
fn data_value_messages_keep_status_and_timestamps() -> Result<()> {
    let schema = SchemaBuilder::new().compile_data_set(&line_metadata(), FieldContent::DataValue)?;
    let mut data_set = line_sample(12.5, true, vec![1, 2, 3], None);
    let stamp = DateTime::from_unix_millis(1_700_000_000_123);
    for name in ["Speed", "Running", "Counts", "Operator"] {
        let value = data_set.get(name).map(|v| v.value.clone()).unwrap_or_default();
        let replaced = DataValue {
            value,
            status: StatusCode::UNCERTAIN,
            source_timestamp: stamp,
            source_picoseconds: 7,
            server_timestamp: stamp,
            server_picoseconds: 9,
        };
        data_set = rebuild_with(data_set, name, replaced);
    }
    data_set.set_field_content(FieldContent::DataValue);

    let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
    encoder.write_data_set(&data_set)?;
    let bytes = encoder.finish()?;

    let decoded = SchemaDecoder::new(bytes.as_slice(), schema).read_data_set()?;
    ensure!(decoded == data_set, "decoded {decoded:?}");
    ensure!(decoded.get("Speed").map(|v| v.status) == Some(StatusCode::UNCERTAIN));
    Ok(())
}

fn rebuild_with(data_set: DataSet, name: &str, value: DataValue) -> DataSet {
    let mut rebuilt = DataSet::new(data_set.name.clone());
    for field in data_set.fields() {
        let next = if field.name == name { value.clone() } else { field.value.clone() };
        rebuilt.push(field.name.clone(), next);
    }
    rebuilt
}

#[test]
fn many_messages_share_one_stream() -> Result<()> {
    let schema = SchemaBuilder::new().compile_data_set(&line_metadata(), FieldContent::RawData)?;
    let samples: Vec<DataSet> =
        (0..10).map(|n| line_sample(f64::from(n), n % 2 == 0, vec![i64::from(n); n as usize], None)).collect();

    let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
    for sample in &samples {
        encoder.write_data_set(sample)?;
        encoder.finish_message()?;
    }
    let bytes = encoder.finish()?;

    let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
    for sample in &samples {
        let decoded = decoder.read_data_set()?;
        decoder.finish_message()?;
        ensure!(&decoded == sample);
    }
    ensure!(decoder.position() == bytes.len() as u64);
    Ok(())
}

#[test]
fn oversized_strings_are_refused_on_decode() -> Result<()> {
    let mut registry = BuiltInSchemas::new();
    let schema = registry.get(BuiltInType::String);
    let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
    encoder.write_string(None, &"x".repeat(64))?;
    let bytes = encoder.finish()?;

    let options = CodecOptions { max_string_length: 16, ..CodecOptions::default() };
    let mut decoder = SchemaDecoder::with_options(bytes.as_slice(), schema, options);
    let error = decoder.read_string(None).unwrap_err();
    ensure!(matches!(error, CodecError::LimitExceeded { .. }), "{error}");
    Ok(())
}

#[test]
fn writing_the_wrong_type_leaves_the_stream_untouched() -> Result<()> {
    let schema = SchemaBuilder::new().compile_data_set(&line_metadata(), FieldContent::RawData)?;
    let bad = DataSet::new(Some("Line/2".to_string()))
        .with_field("Speed", DataValue::new("fast"))
        .with_field("Running", DataValue::new(true));

    let mut encoder = SchemaEncoder::new(Vec::new(), schema);
    let error = encoder.write_data_set(&bad).unwrap_err();
    ensure!(matches!(error, CodecError::Encoding { .. }), "{error}");
    ensure!(error.is_message_local());
    Ok(())
}

#[test]
fn variants_carry_their_own_type() -> Result<()> {
    let mut registry = BuiltInSchemas::new();
    let schema = registry.get(BuiltInType::Variant);
    let values = [
        Variant::Null,
        Variant::from(3.25f32),
        Variant::from("pressure"),
        Variant::Array(Array::new(BuiltInType::Boolean, vec![Value::Boolean(true), Value::Boolean(false)])?),
    ];

    let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
    for value in &values {
        encoder.write_variant(None, value)?;
        encoder.finish_message()?;
    }
    let bytes = encoder.finish()?;

    let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
    for value in &values {
        ensure!(&decoder.read_variant(None)? == value);
        decoder.finish_message()?;
    }
    Ok(())
}
