//! Schema-validating codecs
//!
//! [`SchemaDecoder`] and [`SchemaEncoder`] combine the primitive binary codec with a
//! [`SchemaTraverser`](crate::SchemaTraverser). Every typed operation follows the same contract:
//!
//! 1. ask the traverser for the node expected at this position (by field name, or by position
//!    when the name is `None`)
//! 2. check the node declares the type identity of the operation, e.g. `read_int32` expects
//!    `org.opcfoundation.ua.Int32`
//! 3. read or write the value, recursing into nested scopes for composites
//! 4. close the frame and check it is the one opened in step 1
//!
//! Generic `read_value`/`write_value` dispatch on whatever node the schema yields, which is
//! how data set fields and structure bodies are processed.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use opcua_avro::codec::{SchemaDecoder, SchemaEncoder};
//! use opcua_avro::schema::{BuiltInSchemas, Field, Name, RecordSchema, SchemaNode};
//! use opcua_avro::types::BuiltInType;
//!
//! let mut registry = BuiltInSchemas::new();
//! let fields = vec![
//!     Field::new("a", registry.get(BuiltInType::Int32)),
//!     Field::new("b", registry.get(BuiltInType::String)),
//! ];
//! let schema = Arc::new(SchemaNode::Record(RecordSchema::new(Name::new("R", None), fields).unwrap()));
//!
//! let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
//! encoder.write_record(None, |e| {
//!     e.write_int32(Some("a"), 42)?;
//!     e.write_string(Some("b"), "pump")
//! }).unwrap();
//! let bytes = encoder.finish().unwrap();
//!
//! let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
//! let (a, b) = decoder.read_record(None, |d| Ok((d.read_int32(Some("a"))?, d.read_string(Some("b"))?))).unwrap();
//! assert_eq!((a, b.as_str()), (42, "pump"));
//! ```

mod decoder;
mod encoder;

pub use decoder::SchemaDecoder;
pub use encoder::SchemaEncoder;

use crate::SchemaViolation;
use crate::schema::{BUILT_IN_NAMESPACE, PrimitiveKind, SchemaNode, identify};
use crate::types::{BuiltInType, Value, Variant};

/// Check that `node` declares the identity of built-in type `expected`.
pub(crate) fn expect_identity(node: &SchemaNode, expected: BuiltInType) -> Result<(), SchemaViolation> {
    if identify(node) == Some(expected) {
        return Ok(());
    }
    let expected_name = match expected {
        BuiltInType::Null => "null".to_string(),
        other => format!("{BUILT_IN_NAMESPACE}.{}", other.name()),
    };
    Err(SchemaViolation::new(format!(
        "type mismatch: operation expects {expected_name} but the schema declares {}",
        node.full_name()
    )))
}

/// Check that `node` is of the composite kind an operation opens.
pub(crate) fn expect_kind(node: &SchemaNode, kind: &str, matches: bool) -> Result<(), SchemaViolation> {
    if matches {
        Ok(())
    } else {
        Err(SchemaViolation::new(format!(
            "type mismatch: operation expects {kind} but the schema declares {}",
            node.full_name()
        )))
    }
}

/// Whether `node` is a `<Type>Matrix` record of dimensions and flattened elements.
pub(crate) fn is_matrix_record(node: &SchemaNode) -> bool {
    node.as_record().is_some_and(|record| {
        let fields = record.fields();
        record.name.name.ends_with("Matrix")
            && fields.len() == 2
            && fields[0].name == "Dimensions"
            && fields[1].name == "Body"
            && fields[1].schema.as_array_item().is_some()
    })
}

/// Built-in type of the values a wire primitive carries when no named type says otherwise.
pub(crate) fn primitive_value_type(kind: PrimitiveKind) -> BuiltInType {
    match kind {
        PrimitiveKind::Null => BuiltInType::Null,
        PrimitiveKind::Boolean => BuiltInType::Boolean,
        PrimitiveKind::Int => BuiltInType::Int32,
        PrimitiveKind::Long => BuiltInType::Int64,
        PrimitiveKind::Float => BuiltInType::Float,
        PrimitiveKind::Double => BuiltInType::Double,
        PrimitiveKind::Bytes => BuiltInType::ByteString,
        PrimitiveKind::String => BuiltInType::String,
    }
}

/// Built-in type of the scalar values a schema node produces.
pub(crate) fn element_type(node: &SchemaNode) -> BuiltInType {
    if let Some(ty) = identify(node) {
        return ty;
    }
    match node {
        SchemaNode::Record(_) => BuiltInType::ExtensionObject,
        SchemaNode::Enum(_) => BuiltInType::Enumeration,
        SchemaNode::Fixed(_) => BuiltInType::ByteString,
        node => node.primitive_kind().map_or(BuiltInType::Variant, primitive_value_type),
    }
}

/// Whether a wire primitive can carry `value` without loss of identity.
pub(crate) fn primitive_accepts(kind: PrimitiveKind, value: &Value) -> bool {
    matches!(
        (kind, value),
        (PrimitiveKind::Boolean, Value::Boolean(_))
            | (
                PrimitiveKind::Int,
                Value::SByte(_)
                    | Value::Byte(_)
                    | Value::Int16(_)
                    | Value::UInt16(_)
                    | Value::Int32(_)
                    | Value::Enumeration(_)
            )
            | (
                PrimitiveKind::Long,
                Value::UInt32(_) | Value::Int64(_) | Value::UInt64(_) | Value::DateTime(_) | Value::StatusCode(_)
            )
            | (PrimitiveKind::Float, Value::Float(_))
            | (PrimitiveKind::Double, Value::Double(_))
            | (PrimitiveKind::String, Value::String(_) | Value::XmlElement(_) | Value::Guid(_))
            | (PrimitiveKind::Bytes, Value::ByteString(_))
    )
}

/// Whether a value could be written against `node`, used to pick a union branch.
pub(crate) fn accepts(node: &SchemaNode, value: &Variant) -> bool {
    if let SchemaNode::Reference(reference) = node {
        return reference.upgrade().is_some_and(|target| accepts(&target, value));
    }
    match (identify(node), value) {
        (Some(BuiltInType::Variant), _) => return true,
        (Some(BuiltInType::Null), v) => return v.is_null(),
        (Some(ty), Variant::Scalar(v)) => return v.built_in_type() == ty,
        (Some(_), _) => return false,
        (None, _) => {}
    }
    match (node, value) {
        (SchemaNode::Null, v) => v.is_null(),
        (SchemaNode::Array(item), Variant::Array(array)) => {
            element_type(item) == array.element_type() || identify(item) == Some(BuiltInType::Variant)
        }
        (SchemaNode::Record(_), Variant::Matrix(matrix)) if is_matrix_record(node) => {
            node.as_record()
                .and_then(|r| r.fields()[1].schema.as_array_item().map(|item| element_type(item)))
                == Some(matrix.element_type())
        }
        (SchemaNode::Record(_), Variant::Scalar(Value::ExtensionObject(_))) => !is_matrix_record(node),
        (SchemaNode::Enum(_), Variant::Scalar(Value::Enumeration(_))) => true,
        (SchemaNode::Fixed(_), Variant::Scalar(Value::ByteString(_))) => true,
        (SchemaNode::Union(branches), v) => branches.iter().any(|b| accepts(b, v)),
        (node, Variant::Scalar(v)) => node.primitive_kind().is_some_and(|kind| primitive_accepts(kind, v)),
        _ => false,
    }
}
