//! Schema-validating encoder.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use super::{accepts, expect_identity, expect_kind, is_matrix_record, primitive_accepts};
use crate::binary::BinaryWriter;
use crate::schema::{
    DEFAULT_DATA_SET_NAME, PrimitiveKind, Schema, SchemaNode, escape_symbol, identify, is_data_value_record,
    resolve, variant_branch_index,
};
use crate::traverser::SchemaTraverser;
use crate::types::{
    BuiltInType, DataSet, DataValue, DateTime, DiagnosticInfo, ExpandedNodeId, ExtensionObject,
    ExtensionObjectBody, Identifier, LocalizedText, NodeId, QualifiedName, StatusCode, Value, Variant,
};
use crate::{CodecError, CodecOptions, Result, SchemaViolation};

/// Writes schema-validated values to a byte sink.
///
/// Every operation is checked against the schema before anything is written, so a rejected
/// value leaves no bytes behind for its own leaf. Composite writes that fail halfway leave a
/// partial message in the sink; callers that need all-or-nothing semantics encode into a
/// scratch buffer first, as the container writer does.
#[derive(Debug)]
pub struct SchemaEncoder<W> {
    writer: BinaryWriter<W>,
    traverser: SchemaTraverser,
    options: CodecOptions,
}

macro_rules! leaf_writers {
    ($($(#[$doc:meta])* $name:ident => $ty:ident($value:ident: $input:ty), |$writer:ident| $write:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, field: Option<&str>, $value: $input) -> Result<()> {
                self.validated(field, BuiltInType::$ty, |e| {
                    let $writer = &mut e.writer;
                    $write
                })
            }
        )*
    };
}

impl<W: Write> SchemaEncoder<W> {
    pub fn new(sink: W, schema: Schema) -> Self {
        Self::with_options(sink, schema, CodecOptions::default())
    }

    pub fn with_options(sink: W, schema: Schema, options: CodecOptions) -> Self {
        Self {
            writer: BinaryWriter::with_options(sink, &options),
            traverser: SchemaTraverser::with_max_depth(schema, options.max_nesting_depth),
            options,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.traverser.root()
    }

    pub fn traverser(&self) -> &SchemaTraverser {
        &self.traverser
    }

    pub fn bytes_written(&self) -> u64 {
        self.writer.bytes_written()
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.writer.get_mut()
    }

    /// Check the current message was written completely and rewind for the next one.
    pub fn finish_message(&mut self) -> Result<()> {
        if !self.traverser.is_complete() {
            let open = self.traverser.current().map_or_else(|| "nothing".to_string(), |n| n.full_name());
            return Err(CodecError::encoding(format!(
                "message of {} is incomplete, {open} is still open",
                self.traverser.root().full_name()
            )));
        }
        self.traverser.reset();
        Ok(())
    }

    /// Flush and return the sink. Fails while a scope is still open.
    pub fn finish(mut self) -> Result<W> {
        if let Some(open) = self.traverser.current() {
            return Err(CodecError::encoding(format!("cannot finish with {} still open", open.full_name())));
        }
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }

    leaf_writers! {
        write_boolean => Boolean(value: bool), |w| w.write_boolean(value);
        write_sbyte => SByte(value: i8), |w| w.write_int(value.into());
        write_byte => Byte(value: u8), |w| w.write_int(value.into());
        write_int16 => Int16(value: i16), |w| w.write_int(value.into());
        write_uint16 => UInt16(value: u16), |w| w.write_int(value.into());
        write_int32 => Int32(value: i32), |w| w.write_int(value);
        write_uint32 => UInt32(value: u32), |w| w.write_long(value.into());
        write_int64 => Int64(value: i64), |w| w.write_long(value);
        write_uint64 => UInt64(value: u64), |w| w.write_long(value as i64);
        write_float => Float(value: f32), |w| w.write_float(value);
        write_double => Double(value: f64), |w| w.write_double(value);
        write_string => String(value: &str), |w| w.write_string(value);
        write_date_time => DateTime(value: DateTime), |w| w.write_long(value.0);
        /// Guids travel in their hyphenated text form.
        write_guid => Guid(value: Uuid), |w| w.write_string(&value.to_string());
        write_byte_string => ByteString(value: &[u8]), |w| w.write_bytes(value);
        write_xml_element => XmlElement(value: &str), |w| w.write_string(value);
        write_status_code => StatusCode(value: StatusCode), |w| w.write_long(value.0.into());
        write_number => Number(value: &str), |w| w.write_string(value);
        write_integer => Integer(value: &str), |w| w.write_string(value);
        write_uinteger => UInteger(value: &str), |w| w.write_string(value);
    }

    /// Consume a null position. Nothing is written.
    pub fn write_null(&mut self, field: Option<&str>) -> Result<()> {
        self.validated(field, BuiltInType::Null, |_| Ok(()))
    }

    /// Write an enumeration ordinal against an enum schema or the Enumeration built-in.
    pub fn write_enumeration(&mut self, field: Option<&str>, value: i32) -> Result<()> {
        let node = self.advance(field)?;
        match node.as_enum() {
            Some(e) if value < 0 || value as usize >= e.symbols.len() => {
                return Err(CodecError::encoding(format!(
                    "enum ordinal {value} is out of range for {} with {} symbols",
                    e.name,
                    e.symbols.len()
                )));
            }
            Some(_) => {}
            None => expect_identity(&node, BuiltInType::Enumeration).map_err(violation)?,
        }
        self.writer.write_int(value)?;
        self.close(&node)
    }

    pub fn write_fixed(&mut self, field: Option<&str>, value: &[u8]) -> Result<()> {
        let node = self.advance(field)?;
        let size = match node.as_ref() {
            SchemaNode::Fixed(fixed) => fixed.size,
            _ => {
                expect_kind(&node, "a fixed", false).map_err(violation)?;
                0
            }
        };
        if value.len() != size {
            return Err(CodecError::encoding(format!(
                "{} holds {size} bytes, got {}",
                node.full_name(),
                value.len()
            )));
        }
        self.writer.write_fixed(value)?;
        self.close(&node)
    }

    /// Open a record scope, run `write` for its fields and close it again.
    pub fn write_record(&mut self, field: Option<&str>, write: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let node = self.advance(field)?;
        expect_kind(&node, "a record", node.as_record().is_some()).map_err(violation)?;
        write(self)?;
        self.close(&node)
    }

    /// Write `items` as one block followed by the terminating empty block.
    pub fn write_array<T>(
        &mut self,
        field: Option<&str>,
        items: &[T],
        mut item: impl FnMut(&mut Self, &T) -> Result<()>,
    ) -> Result<()> {
        let node = self.advance(field)?;
        expect_kind(&node, "an array", node.as_array_item().is_some()).map_err(violation)?;
        if items.len() > self.options.max_array_length {
            return Err(CodecError::limit_exceeded(
                "array",
                items.len() as u64,
                self.options.max_array_length as u64,
            ));
        }
        if !items.is_empty() {
            self.writer.write_long(items.len() as i64)?;
            for value in items {
                self.traverser.expect_item().map_err(violation)?;
                item(self, value)?;
            }
        }
        self.writer.write_long(0)?;
        trace!(node = %node.full_name(), items = items.len(), "array encoded");
        self.close(&node)
    }

    /// Write a union selector, then the selected branch through `write`.
    pub fn write_union(
        &mut self,
        field: Option<&str>,
        index: usize,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let node = self.advance(field)?;
        expect_kind(&node, "a union", node.as_union().is_some()).map_err(violation)?;
        self.traverser.select_branch(index as i64).map_err(violation)?;
        self.writer.write_long(index as i64)?;
        write(self)?;
        self.close(&node)
    }

    pub fn write_node_id(&mut self, field: Option<&str>, value: &NodeId) -> Result<()> {
        self.validated(field, BuiltInType::NodeId, |e| e.write_node_id_fields(value))
    }

    pub fn write_expanded_node_id(&mut self, field: Option<&str>, value: &ExpandedNodeId) -> Result<()> {
        self.validated(field, BuiltInType::ExpandedNodeId, |e| {
            e.write_node_id_fields(&value.node_id)?;
            e.write_string(Some("ServerUri"), &value.server_uri)
        })
    }

    pub fn write_qualified_name(&mut self, field: Option<&str>, value: &QualifiedName) -> Result<()> {
        self.validated(field, BuiltInType::QualifiedName, |e| {
            e.write_string(Some("Namespace"), &value.namespace_uri)?;
            e.write_string(Some("Name"), &value.name)
        })
    }

    pub fn write_localized_text(&mut self, field: Option<&str>, value: &LocalizedText) -> Result<()> {
        self.validated(field, BuiltInType::LocalizedText, |e| {
            e.write_string(Some("Locale"), &value.locale)?;
            e.write_string(Some("Text"), &value.text)
        })
    }

    /// Write an extension object in its generic encoded form, or as the record of its
    /// structure type when the schema declares one at this position.
    pub fn write_extension_object(&mut self, field: Option<&str>, value: &ExtensionObject) -> Result<()> {
        let node = self.peek(field)?;
        if identify(&node).is_none() && node.as_record().is_some() && !is_matrix_record(&node) {
            return self.write_structure(field, value);
        }
        let (encoding, branch) = match &value.body {
            ExtensionObjectBody::None => (0, 0),
            ExtensionObjectBody::Json(_) => (0, 1),
            ExtensionObjectBody::Xml(_) => (2, 2),
            ExtensionObjectBody::Binary(_) => (1, 3),
            ExtensionObjectBody::Structure(_) => {
                return Err(CodecError::encoding(format!(
                    "decoded structure body of {} needs a schema for its type at {}",
                    value.type_id,
                    node.full_name()
                )));
            }
        };
        self.validated(field, BuiltInType::ExtensionObject, |e| {
            e.write_node_id(Some("TypeId"), &value.type_id)?;
            e.write_enumeration(Some("Encoding"), encoding)?;
            e.write_union(Some("Body"), branch, |e| match &value.body {
                ExtensionObjectBody::Json(json) => e.write_string(None, json),
                ExtensionObjectBody::Xml(xml) => e.write_xml_element(None, xml),
                ExtensionObjectBody::Binary(bytes) => e.write_byte_string(None, bytes),
                _ => e.write_null(None),
            })
        })
    }

    /// Write a decoded structure as the record of its type, field by field in schema order.
    fn write_structure(&mut self, field: Option<&str>, value: &ExtensionObject) -> Result<()> {
        let node = self.peek(field)?;
        let ExtensionObjectBody::Structure(structure) = &value.body else {
            return Err(CodecError::encoding(format!(
                "{} is a structure record but the extension object {} is still encoded",
                node.full_name(),
                value.type_id
            )));
        };
        let fields: Vec<(String, String)> = node
            .as_record()
            .map(|r| r.fields().iter().map(|f| (f.name.clone(), f.display_name().to_string())).collect())
            .unwrap_or_default();
        if let Some(extra) = structure.fields.iter().find(|f| !fields.iter().any(|(n, d)| *n == f.name || *d == f.name)) {
            return Err(CodecError::encoding(format!("{} has no field '{}'", node.full_name(), extra.name)));
        }
        self.write_record(field, |e| {
            for (name, display_name) in &fields {
                let value = structure.get(display_name).or_else(|| structure.get(name)).unwrap_or(&Variant::Null);
                e.write_value(Some(name), value)?;
            }
            Ok(())
        })
    }

    pub fn write_data_value(&mut self, field: Option<&str>, value: &DataValue) -> Result<()> {
        self.validated(field, BuiltInType::DataValue, |e| {
            e.write_variant(Some("Value"), &value.value)?;
            e.write_data_value_tail(value)
        })
    }

    /// Write a variant: type tag, body branch and matrix dimensions.
    pub fn write_variant(&mut self, field: Option<&str>, value: &Variant) -> Result<()> {
        let ty = value.built_in_type();
        let is_array = matches!(value, Variant::Array(_) | Variant::Matrix(_));
        let branch = variant_branch_index(ty, is_array)
            .ok_or_else(|| CodecError::encoding(format!("a variant cannot carry {ty} values")))?;
        self.validated(field, BuiltInType::Variant, |e| {
            e.write_byte(Some("Type"), ty.id())?;
            e.write_union(Some("Body"), branch, |e| match value {
                Variant::Null => e.write_null(None),
                Variant::Scalar(scalar) => e.write_built_in(None, scalar),
                Variant::Array(array) => e.write_array(None, array.elements(), |e, v| e.write_built_in(None, v)),
                Variant::Matrix(matrix) => e.write_array(None, matrix.elements(), |e, v| e.write_built_in(None, v)),
            })?;
            let dimensions = match value {
                Variant::Matrix(matrix) => matrix.dimensions(),
                _ => &[],
            };
            e.write_array(Some("Dimensions"), dimensions, |e, d| e.write_uint32(None, *d))
        })
    }

    pub fn write_diagnostic_info(&mut self, field: Option<&str>, value: &DiagnosticInfo) -> Result<()> {
        self.validated(field, BuiltInType::DiagnosticInfo, |e| {
            e.write_int32(Some("SymbolicId"), value.symbolic_id)?;
            e.write_int32(Some("NamespaceUri"), value.namespace_uri)?;
            e.write_int32(Some("Locale"), value.locale)?;
            e.write_int32(Some("LocalizedText"), value.localized_text)?;
            e.write_string(Some("AdditionalInfo"), &value.additional_info)?;
            e.write_status_code(Some("InnerStatusCode"), value.inner_status_code)?;
            match &value.inner_diagnostic_info {
                None => e.write_union(Some("InnerDiagnosticInfo"), 0, |e| e.write_null(None)),
                Some(inner) => e.write_union(Some("InnerDiagnosticInfo"), 1, |e| e.write_diagnostic_info(None, inner)),
            }
        })
    }

    /// Write a value against whatever node the schema declares at this position.
    ///
    /// Unions pick the null branch for [`Variant::Null`], the only non-null branch of a
    /// nullable union, or else the first branch that accepts the value.
    pub fn write_value(&mut self, field: Option<&str>, value: &Variant) -> Result<()> {
        let node = self.peek(field)?;
        self.write_node_value(field, &node, value)
    }

    /// Write one data set message, choosing the union branch by data set name when the schema
    /// carries several data sets.
    pub fn write_data_set(&mut self, data_set: &DataSet) -> Result<()> {
        let root = self.peek(None)?;
        if let Some(branches) = root.as_union() {
            let index = select_data_set(branches, data_set)?;
            self.write_union(None, index, |e| e.write_data_set_record(data_set))
        } else {
            self.write_data_set_record(data_set)
        }
    }

    fn write_data_set_record(&mut self, data_set: &DataSet) -> Result<()> {
        let node = self.peek(None)?;
        let record = node
            .as_record()
            .ok_or_else(|| CodecError::encoding(format!("data set schema {} is not a record", node.full_name())))?;
        if let Some(extra) = data_set.fields().iter().find(|f| record.field(&f.name).is_none()) {
            return Err(CodecError::encoding(format!("data set {} has no field '{}'", record.name, extra.name)));
        }
        let fields: Vec<(String, String, bool)> = record
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.display_name().to_string(), is_data_value_record(&f.schema)))
            .collect();

        let missing = DataValue::default();
        self.write_record(None, |e| {
            for (name, display_name, wrapped) in &fields {
                let value = data_set.get(display_name).or_else(|| data_set.get(name)).unwrap_or(&missing);
                if *wrapped {
                    e.write_record(Some(name), |e| {
                        e.write_value(Some("Value"), &value.value)?;
                        e.write_data_value_tail(value)
                    })?;
                } else {
                    e.write_value(Some(name), &value.value)?;
                }
            }
            Ok(())
        })?;
        debug!(fields = fields.len(), data_set = %record.name, "encoded data set");
        Ok(())
    }

    fn write_data_value_tail(&mut self, value: &DataValue) -> Result<()> {
        self.write_status_code(Some("StatusCode"), value.status)?;
        self.write_date_time(Some("SourceTimestamp"), value.source_timestamp)?;
        self.write_uint16(Some("SourcePicoseconds"), value.source_picoseconds)?;
        self.write_date_time(Some("ServerTimestamp"), value.server_timestamp)?;
        self.write_uint16(Some("ServerPicoseconds"), value.server_picoseconds)
    }

    fn write_node_id_fields(&mut self, value: &NodeId) -> Result<()> {
        self.write_string(Some("Namespace"), &value.namespace_uri)?;
        let branch = match value.identifier {
            Identifier::Numeric(_) => 0,
            Identifier::String(_) => 1,
            Identifier::Guid(_) => 2,
            Identifier::Opaque(_) => 3,
        };
        self.write_union(Some("Identifier"), branch, |e| match &value.identifier {
            Identifier::Numeric(id) => e.write_uint32(None, *id),
            Identifier::String(id) => e.write_string(None, id),
            Identifier::Guid(id) => e.write_guid(None, *id),
            Identifier::Opaque(id) => e.write_byte_string(None, id),
        })
    }

    /// Write a scalar against the built-in schema of its own type.
    fn write_built_in(&mut self, field: Option<&str>, value: &Value) -> Result<()> {
        match value {
            Value::Boolean(v) => self.write_boolean(field, *v),
            Value::SByte(v) => self.write_sbyte(field, *v),
            Value::Byte(v) => self.write_byte(field, *v),
            Value::Int16(v) => self.write_int16(field, *v),
            Value::UInt16(v) => self.write_uint16(field, *v),
            Value::Int32(v) => self.write_int32(field, *v),
            Value::UInt32(v) => self.write_uint32(field, *v),
            Value::Int64(v) => self.write_int64(field, *v),
            Value::UInt64(v) => self.write_uint64(field, *v),
            Value::Float(v) => self.write_float(field, *v),
            Value::Double(v) => self.write_double(field, *v),
            Value::String(v) => self.write_string(field, v),
            Value::DateTime(v) => self.write_date_time(field, *v),
            Value::Guid(v) => self.write_guid(field, *v),
            Value::ByteString(v) => self.write_byte_string(field, v),
            Value::XmlElement(v) => self.write_xml_element(field, v),
            Value::NodeId(v) => self.write_node_id(field, v),
            Value::ExpandedNodeId(v) => self.write_expanded_node_id(field, v),
            Value::StatusCode(v) => self.write_status_code(field, *v),
            Value::QualifiedName(v) => self.write_qualified_name(field, v),
            Value::LocalizedText(v) => self.write_localized_text(field, v),
            Value::ExtensionObject(v) => self.write_extension_object(field, v),
            Value::DataValue(v) => self.write_data_value(field, v),
            Value::Variant(v) => self.write_variant(field, v),
            Value::DiagnosticInfo(v) => self.write_diagnostic_info(field, v),
            Value::Enumeration(v) => self.write_enumeration(field, *v),
        }
    }

    fn write_node_value(&mut self, field: Option<&str>, node: &Schema, value: &Variant) -> Result<()> {
        match identify(node) {
            Some(BuiltInType::Variant) => return self.write_variant(field, value),
            Some(BuiltInType::Null) if value.is_null() => return self.write_null(field),
            Some(ty) => {
                return match value {
                    Variant::Scalar(scalar) if scalar.built_in_type() == ty => self.write_built_in(field, scalar),
                    other => Err(CodecError::encoding(format!(
                        "type mismatch: {} cannot hold {}",
                        node.full_name(),
                        describe(other)
                    ))),
                };
            }
            None => {}
        }
        match (node.as_ref(), value) {
            (SchemaNode::Union(branches), value) => {
                let index = select_branch(node, branches, value)?;
                let branch = resolve(&branches[index]).map_err(violation)?;
                self.write_union(field, index, |e| e.write_node_value(None, &branch, value))
            }
            (SchemaNode::Array(item), Variant::Array(array)) => {
                let item = resolve(item).map_err(violation)?;
                self.write_array(field, array.elements(), |e, v| e.write_element(None, &item, v))
            }
            (SchemaNode::Record(record), Variant::Matrix(matrix)) if is_matrix_record(node) => {
                let item = record.fields()[1].schema.as_array_item().map(resolve).transpose().map_err(violation)?;
                let Some(item) = item else {
                    return Err(CodecError::encoding(format!("{} has no element type", node.full_name())));
                };
                self.write_record(field, |e| {
                    e.write_array(Some("Dimensions"), matrix.dimensions(), |e, d| e.write_uint32(None, *d))?;
                    e.write_array(Some("Body"), matrix.elements(), |e, v| e.write_element(None, &item, v))
                })
            }
            (_, Variant::Scalar(scalar)) => self.write_element(field, node, scalar),
            (_, other) => Err(CodecError::encoding(format!(
                "type mismatch: {} cannot hold {}",
                node.full_name(),
                describe(other)
            ))),
        }
    }

    /// Write one scalar against a node that may be a user-defined type.
    fn write_element(&mut self, field: Option<&str>, node: &Schema, value: &Value) -> Result<()> {
        if identify(node).is_some() {
            return self.write_node_value(field, node, &Variant::Scalar(value.clone()));
        }
        match (node.as_ref(), value) {
            (SchemaNode::Record(_), Value::ExtensionObject(object)) if !is_matrix_record(node) => {
                self.write_structure(field, object)
            }
            (SchemaNode::Enum(_), Value::Enumeration(ordinal)) => self.write_enumeration(field, *ordinal),
            (SchemaNode::Fixed(_), Value::ByteString(bytes)) => self.write_fixed(field, bytes),
            (SchemaNode::Union(_), _) => self.write_node_value(field, node, &Variant::Scalar(value.clone())),
            (node_ref, value) if node_ref.primitive_kind().is_some() => self.write_primitive(field, node, value),
            (_, value) => Err(CodecError::encoding(format!(
                "type mismatch: {} cannot hold a {} value",
                node.full_name(),
                value.built_in_type()
            ))),
        }
    }

    /// Write a scalar through the wire primitive of an unnamed or user-defined simple type.
    fn write_primitive(&mut self, field: Option<&str>, expected: &Schema, value: &Value) -> Result<()> {
        let node = self.advance(field)?;
        if !node.same_type(expected) {
            return Err(CodecError::encoding(format!(
                "type mismatch: expected {} but the schema declares {}",
                expected.full_name(),
                node.full_name()
            )));
        }
        let kind = node.primitive_kind().filter(|kind| primitive_accepts(*kind, value)).ok_or_else(|| {
            CodecError::encoding(format!(
                "type mismatch: {} cannot hold a {} value",
                node.full_name(),
                value.built_in_type()
            ))
        })?;
        match (kind, value) {
            (PrimitiveKind::Boolean, Value::Boolean(v)) => self.writer.write_boolean(*v)?,
            (PrimitiveKind::Int, Value::SByte(v)) => self.writer.write_int((*v).into())?,
            (PrimitiveKind::Int, Value::Byte(v)) => self.writer.write_int((*v).into())?,
            (PrimitiveKind::Int, Value::Int16(v)) => self.writer.write_int((*v).into())?,
            (PrimitiveKind::Int, Value::UInt16(v)) => self.writer.write_int((*v).into())?,
            (PrimitiveKind::Int, Value::Int32(v) | Value::Enumeration(v)) => self.writer.write_int(*v)?,
            (PrimitiveKind::Long, Value::UInt32(v)) => self.writer.write_long((*v).into())?,
            (PrimitiveKind::Long, Value::Int64(v)) => self.writer.write_long(*v)?,
            (PrimitiveKind::Long, Value::UInt64(v)) => self.writer.write_long(*v as i64)?,
            (PrimitiveKind::Long, Value::DateTime(v)) => self.writer.write_long(v.0)?,
            (PrimitiveKind::Long, Value::StatusCode(v)) => self.writer.write_long(v.0.into())?,
            (PrimitiveKind::Float, Value::Float(v)) => self.writer.write_float(*v)?,
            (PrimitiveKind::Double, Value::Double(v)) => self.writer.write_double(*v)?,
            (PrimitiveKind::String, Value::String(v) | Value::XmlElement(v)) => self.writer.write_string(v)?,
            (PrimitiveKind::String, Value::Guid(v)) => self.writer.write_string(&v.to_string())?,
            (PrimitiveKind::Bytes, Value::ByteString(v)) => self.writer.write_bytes(v)?,
            _ => {
                return Err(CodecError::encoding(format!(
                    "type mismatch: {} cannot hold a {} value",
                    node.full_name(),
                    value.built_in_type()
                )));
            }
        }
        self.close(&node)
    }

    fn validated(
        &mut self,
        field: Option<&str>,
        expected: BuiltInType,
        write: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let node = self.advance(field)?;
        expect_identity(&node, expected).map_err(violation)?;
        write(self)?;
        self.close(&node)
    }

    fn advance(&mut self, field: Option<&str>) -> Result<Schema> {
        self.traverser.advance(field).map_err(violation)
    }

    fn peek(&self, field: Option<&str>) -> Result<Schema> {
        self.traverser.peek(field).map_err(violation)
    }

    fn close(&mut self, opened: &Schema) -> Result<()> {
        let closed = self.traverser.pop().map_err(violation)?;
        if !Arc::ptr_eq(&closed, opened) {
            return Err(CodecError::encoding(format!(
                "scope mismatch: opened {} but closed {}",
                opened.full_name(),
                closed.full_name()
            )));
        }
        Ok(())
    }
}

fn violation(violation: SchemaViolation) -> CodecError {
    CodecError::encoding(violation.0)
}

fn describe(value: &Variant) -> String {
    match value {
        Variant::Null => "null".to_string(),
        Variant::Scalar(scalar) => format!("a {} value", scalar.built_in_type()),
        Variant::Array(array) => format!("an array of {}", array.element_type()),
        Variant::Matrix(matrix) => format!("a matrix of {}", matrix.element_type()),
    }
}

fn select_branch(union: &SchemaNode, branches: &[Schema], value: &Variant) -> Result<usize> {
    if value.is_null() {
        return branches
            .iter()
            .position(|b| b.is_null() || identify(b) == Some(BuiltInType::Null))
            .ok_or_else(|| CodecError::encoding(format!("{} is not nullable", union.full_name())));
    }
    let mut non_null = branches.iter().enumerate().filter(|(_, b)| !b.is_null());
    if let (Some((index, _)), None) = (non_null.next(), non_null.next()) {
        return Ok(index);
    }
    branches.iter().position(|b| accepts(b, value)).ok_or_else(|| {
        CodecError::encoding(format!("no branch of {} accepts {}", union.full_name(), describe(value)))
    })
}

/// Union branch of a multi data set schema the data set is written as.
fn select_data_set(branches: &[Schema], data_set: &DataSet) -> Result<usize> {
    let raw_name = data_set.name.as_deref().unwrap_or(DEFAULT_DATA_SET_NAME);
    let symbol = escape_symbol(raw_name);
    let by_name = branches.iter().position(|b| {
        b.as_record().is_some_and(|r| r.name.name == symbol || r.aliases.iter().any(|a| a == raw_name))
    });
    if let Some(index) = by_name {
        return Ok(index);
    }
    branches
        .iter()
        .position(|b| {
            b.as_record()
                .is_some_and(|r| data_set.fields().iter().all(|f| r.field(&f.name).is_some()))
        })
        .ok_or_else(|| CodecError::encoding(format!("no data set in the schema matches '{raw_name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SchemaDecoder;
    use crate::schema::{
        BuiltInSchemas, DataSetMetadata, FieldMetadata, Field, Name, RecordSchema, SchemaBuilder,
        StructureDescription, StructureFieldDescription, TypeDescription, nullable,
    };
    use crate::types::{Array, FieldContent, Matrix, Structure};

    const NS: &str = "http://plant.example.com/UA/";

    fn round_trip_value(schema: &Schema, value: &Variant) -> Variant {
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_value(None, value).unwrap();
        encoder.finish_message().unwrap();
        let bytes = encoder.finish().unwrap();

        let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema.clone());
        let decoded = decoder.read_value(None).unwrap();
        decoder.finish_message().unwrap();
        decoded
    }

    #[test]
    fn variants_keep_type_and_rank() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.get(BuiltInType::Variant);

        let ints = Array::new(BuiltInType::Int32, vec![Value::Int32(1), Value::Int32(-2)]).unwrap();
        let matrix = Matrix::new(
            BuiltInType::Double,
            vec![2, 2],
            vec![Value::Double(1.0), Value::Double(2.0), Value::Double(3.0), Value::Double(4.0)],
        )
        .unwrap();
        let values = [
            Variant::Null,
            Variant::from(42u16),
            Variant::from("pump"),
            Variant::from(NodeId::string(NS, "Motor.Speed")),
            Variant::from(LocalizedText::new("en", "Speed")),
            Variant::Array(ints),
            Variant::Matrix(matrix),
        ];
        for value in values {
            assert_eq!(round_trip_value(&schema, &value), value);
        }
    }

    #[test]
    fn unions_pick_the_accepting_branch() {
        let mut registry = BuiltInSchemas::new();
        let schema = Arc::new(SchemaNode::Union(vec![
            registry.get(BuiltInType::Null),
            registry.get(BuiltInType::Int32),
            registry.get(BuiltInType::String),
        ]));
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_value(None, &Variant::from("on")).unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(bytes[0], 4); // zigzag selector 2
        assert_eq!(round_trip_value(&schema, &Variant::from(7i32)), Variant::from(7i32));
        assert_eq!(round_trip_value(&schema, &Variant::Null), Variant::Null);

        let mut encoder = SchemaEncoder::new(Vec::new(), schema);
        let error = encoder.write_value(None, &Variant::from(1.5f64)).unwrap_err();
        assert!(error.to_string().contains("no branch"), "{error}");
    }

    #[test]
    fn diagnostic_info_nests() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.get(BuiltInType::DiagnosticInfo);
        let info = DiagnosticInfo {
            symbolic_id: 3,
            additional_info: "outer".to_string(),
            inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
                locale: 1,
                inner_status_code: StatusCode::BAD,
                inner_diagnostic_info: Some(Box::new(DiagnosticInfo::default())),
                ..DiagnosticInfo::default()
            })),
            ..DiagnosticInfo::default()
        };

        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_diagnostic_info(None, &info).unwrap();
        let bytes = encoder.finish().unwrap();
        let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
        let decoded = decoder.read_diagnostic_info(None).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.depth(), 3);
    }

    #[test]
    fn structures_encode_as_their_records() {
        let motor = NodeId::numeric(NS, 1);
        let mut builder = SchemaBuilder::with_types([TypeDescription::Structure(StructureDescription {
            data_type_id: motor.clone(),
            name: "Motor".to_string(),
            fields: vec![
                StructureFieldDescription::scalar("Speed", NodeId::numeric("", u32::from(BuiltInType::Double.id()))),
                StructureFieldDescription::scalar("Name.Plate", NodeId::numeric("", u32::from(BuiltInType::String.id()))),
            ],
        })]);
        let schema = builder.resolve(&motor).unwrap();
        let value = Variant::from(ExtensionObject::structure(
            motor.clone(),
            Structure::new().with("Speed", 1450.0).with("Name.Plate", Variant::Null),
        ));
        assert_eq!(round_trip_value(&schema, &value), value);

        let mut encoder = SchemaEncoder::new(Vec::new(), schema);
        let extra = ExtensionObject::structure(motor, Structure::new().with("Torque", 3.0));
        assert!(encoder.write_extension_object(None, &extra).is_err());
    }

    #[test]
    fn structure_bodies_need_a_schema() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.get(BuiltInType::ExtensionObject);
        let object = ExtensionObject::structure(NodeId::numeric(NS, 1), Structure::new());
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        let error = encoder.write_extension_object(None, &object).unwrap_err();
        assert!(matches!(error, CodecError::Encoding { .. }));

        let binary = ExtensionObject::new(NodeId::numeric(NS, 5), ExtensionObjectBody::Binary(vec![1, 2, 3]));
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_extension_object(None, &binary).unwrap();
        let bytes = encoder.finish().unwrap();
        let decoded = SchemaDecoder::new(bytes.as_slice(), schema).read_extension_object(None).unwrap();
        assert_eq!(decoded, binary);
    }

    #[test]
    fn data_sets_round_trip_in_both_shapes() {
        let metadata = DataSetMetadata::new(Some("Line 1"))
            .with_field(FieldMetadata::built_in("Speed", BuiltInType::Float))
            .with_field(FieldMetadata::built_in("Counts", BuiltInType::UInt32).with_rank(1))
            .with_field(FieldMetadata::built_in("Label", BuiltInType::String));
        let counts = Array::new(BuiltInType::UInt32, vec![Value::UInt32(4), Value::UInt32(5)]).unwrap();

        let raw = DataSet::new(Some("Line 1".to_string()))
            .with_field("Speed", DataValue::new(2.5f32))
            .with_field("Counts", DataValue::new(counts))
            .with_field("Label", DataValue::new(Variant::Null));

        let mut builder = SchemaBuilder::new();
        let schema = builder.compile_data_set(&metadata, FieldContent::RawData).unwrap();
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_data_set(&raw).unwrap();
        let bytes = encoder.finish().unwrap();
        let decoded = SchemaDecoder::new(bytes.as_slice(), schema).read_data_set().unwrap();
        assert_eq!(decoded, raw);

        let mut with_status = raw.clone();
        with_status.set_field_content(FieldContent::DataValue);
        let schema = builder.compile_data_set(&metadata, FieldContent::DataValue).unwrap();
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_data_set(&with_status).unwrap();
        let bytes = encoder.finish().unwrap();
        let decoded = SchemaDecoder::new(bytes.as_slice(), schema).read_data_set().unwrap();
        assert_eq!(decoded.field_content(), FieldContent::DataValue);
        assert_eq!(decoded, with_status);
    }

    #[test]
    fn data_sets_with_unknown_fields_are_rejected() {
        let metadata = DataSetMetadata::new(None).with_field(FieldMetadata::built_in("x", BuiltInType::Int32));
        let schema = SchemaBuilder::new().compile_data_set(&metadata, FieldContent::RawData).unwrap();
        let data_set = DataSet::new(None).with_field("y", DataValue::new(1i32));
        let mut encoder = SchemaEncoder::new(Vec::new(), schema);
        let error = encoder.write_data_set(&data_set).unwrap_err();
        assert!(error.to_string().contains("no field 'y'"), "{error}");
        assert_eq!(encoder.bytes_written(), 0);
    }

    #[test]
    fn multi_data_set_messages_select_by_name() {
        let boiler = DataSetMetadata::new(Some("Boiler")).with_field(FieldMetadata::built_in("T", BuiltInType::Double));
        let pump = DataSetMetadata::new(Some("Pump")).with_field(FieldMetadata::built_in("Rpm", BuiltInType::Int32));
        let schema = SchemaBuilder::new().compile_messages(&[boiler, pump], FieldContent::RawData).unwrap();

        let data_set = DataSet::new(Some("Pump".to_string())).with_field("Rpm", DataValue::new(900i32));
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        encoder.write_data_set(&data_set).unwrap();
        let bytes = encoder.finish().unwrap();
        assert_eq!(bytes[0], 2);
        let decoded = SchemaDecoder::new(bytes.as_slice(), schema).read_data_set().unwrap();
        assert_eq!(decoded, data_set);
    }

    #[test]
    fn field_errors_are_encoding_errors() {
        let mut registry = BuiltInSchemas::new();
        let fields = vec![Field::new("a", registry.get(BuiltInType::Int32))];
        let schema = Arc::new(SchemaNode::Record(RecordSchema::new(Name::new("R", None), fields).unwrap()));
        let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
        let error = encoder.write_record(None, |e| e.write_int32(Some("b"), 1)).unwrap_err();
        assert!(matches!(error, CodecError::Encoding { .. }));

        let mut encoder = SchemaEncoder::new(Vec::new(), schema);
        let error = encoder.write_record(None, |e| e.write_value(Some("a"), &Variant::Null)).unwrap_err();
        assert!(error.to_string().contains("cannot hold null"), "{error}");

        let nullable_string = nullable(registry.get(BuiltInType::String));
        let encoder = SchemaEncoder::new(Vec::new(), nullable_string);
        assert!(encoder.finish().is_ok());
    }
}
