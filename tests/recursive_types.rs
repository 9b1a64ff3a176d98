//! Structures whose fields refer back to themselves or to each other.

use anyhow::{Result, bail, ensure};

use opcua_avro::schema::{
    DataSetMetadata, FieldMetadata, Schema, SchemaBuilder, StructureDescription, StructureFieldDescription,
    TypeDescription, parse, to_json_string,
};
use opcua_avro::types::{
    BuiltInType, DataSet, DataValue, ExtensionObject, ExtensionObjectBody, FieldContent, NodeId, Structure, Value,
    Variant,
};
use opcua_avro::{SchemaDecoder, SchemaEncoder};

const NAMESPACE: &str = "urn:plant:assets";

fn int32() -> NodeId {
    NodeId::numeric("", u32::from(BuiltInType::Int32.id()))
}

fn structure(id: u32, name: &str, fields: Vec<StructureFieldDescription>) -> TypeDescription {
    TypeDescription::Structure(StructureDescription {
        data_type_id: NodeId::numeric(NAMESPACE, id),
        name: name.to_string(),
        fields,
    })
}

fn tree_metadata() -> DataSetMetadata {
    DataSetMetadata::new(Some("Hierarchy"))
        .with_type(structure(
            7,
            "TreeNode",
            vec![
                StructureFieldDescription::scalar("Value", int32()),
                StructureFieldDescription::scalar("Child", NodeId::numeric(NAMESPACE, 7)),
            ],
        ))
        .with_field(FieldMetadata::scalar("Root", NodeId::numeric(NAMESPACE, 7)))
}

/// A chain of `TreeNode`s carrying `values`, outermost first.
fn chain(type_id: &NodeId, values: &[i32]) -> Variant {
    values.iter().rev().fold(Variant::Null, |child, value| {
        let node = Structure::new().with("Value", *value).with("Child", child);
        Variant::from(ExtensionObject::structure(type_id.clone(), node))
    })
}

/// Structure body of a decoded extension object field, `None` for a null field.
fn body(variant: &Variant) -> Result<Option<&Structure>> {
    match variant {
        Variant::Null => Ok(None),
        Variant::Scalar(Value::ExtensionObject(object)) => match &object.body {
            ExtensionObjectBody::Structure(body) => Ok(Some(body)),
            other => bail!("structure body still encoded: {other:?}"),
        },
        other => bail!("unexpected variant {other:?}"),
    }
}

fn int32_field(body: &Structure, name: &str) -> Result<i32> {
    match body.get(name) {
        Some(Variant::Scalar(Value::Int32(value))) => Ok(*value),
        other => bail!("{name} decoded as {other:?}"),
    }
}

/// Walk a decoded `TreeNode` chain back into its values.
fn unchain(mut variant: &Variant) -> Result<Vec<i32>> {
    let mut values = Vec::new();
    while let Some(node) = body(variant)? {
        values.push(int32_field(node, "Value")?);
        variant = node.get("Child").unwrap_or(&Variant::Null);
    }
    Ok(values)
}

fn round_trip(writer: Schema, reader: Schema, data_set: &DataSet) -> Result<DataSet> {
    let mut encoder = SchemaEncoder::new(Vec::new(), writer);
    encoder.write_data_set(data_set)?;
    let bytes = encoder.finish()?;
    let mut decoder = SchemaDecoder::new(bytes.as_slice(), reader);
    let decoded = decoder.read_data_set()?;
    decoder.finish_message()?;
    Ok(decoded)
}

fn root(data_set: &DataSet) -> Result<&Variant> {
    match data_set.get("Root") {
        Some(value) => Ok(&value.value),
        None => bail!("root field missing from {data_set:?}"),
    }
}

#[test]
fn self_referential_chain_round_trips() -> Result<()> {
    let schema = SchemaBuilder::new().compile_data_set(&tree_metadata(), FieldContent::RawData)?;
    let type_id = NodeId::numeric(NAMESPACE, 7);
    let data_set =
        DataSet::new(Some("Hierarchy".to_string())).with_field("Root", DataValue::new(chain(&type_id, &[1, 2, 3])));

    let decoded = round_trip(schema.clone(), schema, &data_set)?;
    ensure!(unchain(root(&decoded)?)? == vec![1, 2, 3]);
    Ok(())
}

#[test]
fn self_referential_chain_decodes_with_the_published_text() -> Result<()> {
    let schema = SchemaBuilder::new().compile_data_set(&tree_metadata(), FieldContent::RawData)?;
    let consumer = parse(&to_json_string(&schema))?;
    ensure!(to_json_string(&consumer) == to_json_string(&schema));

    let type_id = NodeId::numeric(NAMESPACE, 7);
    let data_set =
        DataSet::new(Some("Hierarchy".to_string())).with_field("Root", DataValue::new(chain(&type_id, &[4, 5])));

    let decoded = round_trip(schema, consumer, &data_set)?;
    ensure!(unchain(root(&decoded)?)? == vec![4, 5]);
    Ok(())
}

#[test]
fn mutually_recursive_schema_outlives_its_builder() -> Result<()> {
    // A { Value: Int32, Back: B } and B { Inner: A }; `One` finishes B first, so A's edge to B is a
    // back-reference that `Two` only reaches through the builder's memo.
    let types = [
        structure(
            1,
            "A",
            vec![
                StructureFieldDescription::scalar("Value", int32()),
                StructureFieldDescription::scalar("Back", NodeId::numeric(NAMESPACE, 2)),
            ],
        ),
        structure(2, "B", vec![StructureFieldDescription::scalar("Inner", NodeId::numeric(NAMESPACE, 1))]),
    ];
    let mut builder = SchemaBuilder::with_types(types);
    let one = DataSetMetadata::new(Some("One")).with_field(FieldMetadata::scalar("Root", NodeId::numeric(NAMESPACE, 2)));
    let two = DataSetMetadata::new(Some("Two")).with_field(FieldMetadata::scalar("Root", NodeId::numeric(NAMESPACE, 1)));
    let first = builder.compile_data_set(&one, FieldContent::RawData)?;
    let second = builder.compile_data_set(&two, FieldContent::RawData)?;
    drop(first);
    drop(builder);

    // A(10) -> B -> A(20) -> B -> null
    let a = NodeId::numeric(NAMESPACE, 1);
    let b = NodeId::numeric(NAMESPACE, 2);
    let link = |value: i32, next: Variant| {
        let b_body = Structure::new().with("Inner", next);
        let a_body = Structure::new().with("Value", value).with("Back", ExtensionObject::structure(b.clone(), b_body));
        Variant::from(ExtensionObject::structure(a.clone(), a_body))
    };
    let data_set = DataSet::new(Some("Two".to_string()))
        .with_field("Root", DataValue::new(link(10, link(20, Variant::Null))));

    let decoded = round_trip(second.clone(), second.clone(), &data_set)?;
    let mut values = Vec::new();
    let mut cursor = root(&decoded)?;
    while let Some(a_body) = body(cursor)? {
        values.push(int32_field(a_body, "Value")?);
        let Some(b_body) = body(a_body.get("Back").unwrap_or(&Variant::Null))? else { break };
        cursor = b_body.get("Inner").unwrap_or(&Variant::Null);
    }
    ensure!(values == vec![10, 20], "decoded {values:?}");

    let consumer = parse(&to_json_string(&second))?;
    round_trip(second, consumer, &data_set)?;
    Ok(())
}
