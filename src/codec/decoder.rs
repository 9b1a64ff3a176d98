//! Schema-validating decoder.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use super::{element_type, expect_identity, expect_kind, is_matrix_record, primitive_value_type};
use crate::binary::BinaryReader;
use crate::schema::{
    DEFAULT_DATA_SET_NAME, PrimitiveKind, Schema, SchemaNode, data_type_of, identify, is_data_value_record,
    resolve, variant_branch,
};
use crate::traverser::SchemaTraverser;
use crate::types::{
    Array, BuiltInType, DataSet, DataValue, DateTime, DiagnosticInfo, ExpandedNodeId, ExtensionObject,
    ExtensionObjectBody, FieldContent, Identifier, LocalizedText, Matrix, NodeId, QualifiedName, StatusCode,
    Structure, Value, Variant,
};
use crate::{CodecError, CodecOptions, Result};

/// Reads schema-validated values from a byte stream.
///
/// One decoder decodes a sequence of messages against one schema. Call
/// [`finish_message`](Self::finish_message) after each message to check it was consumed
/// completely and to rewind the traversal for the next one.
#[derive(Debug)]
pub struct SchemaDecoder<R> {
    reader: BinaryReader<R>,
    traverser: SchemaTraverser,
    options: CodecOptions,
}

macro_rules! leaf_readers {
    ($($(#[$doc:meta])* $name:ident => $ty:ident -> $out:ty, |$reader:ident| $read:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, field: Option<&str>) -> Result<$out> {
                self.validated(field, BuiltInType::$ty, |d| {
                    let $reader = &mut d.reader;
                    $read
                })
            }
        )*
    };
}

impl<R: Read> SchemaDecoder<R> {
    pub fn new(stream: R, schema: Schema) -> Self {
        Self::with_options(stream, schema, CodecOptions::default())
    }

    pub fn with_options(stream: R, schema: Schema, options: CodecOptions) -> Self {
        Self {
            reader: BinaryReader::with_options(stream, &options),
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

    /// Bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    /// Check the current message was decoded completely and rewind for the next one.
    pub fn finish_message(&mut self) -> Result<()> {
        if !self.traverser.is_complete() {
            let open = self.traverser.current().map_or_else(|| "nothing".to_string(), |n| n.full_name());
            return Err(CodecError::decoding(format!(
                "message of {} is incomplete, {open} is still open",
                self.traverser.root().full_name()
            )));
        }
        self.traverser.reset();
        Ok(())
    }

    leaf_readers! {
        read_boolean => Boolean -> bool, |r| r.read_boolean();
        read_sbyte => SByte -> i8, |r| narrow(r.read_int()?.into(), BuiltInType::SByte);
        read_byte => Byte -> u8, |r| narrow(r.read_int()?.into(), BuiltInType::Byte);
        read_int16 => Int16 -> i16, |r| narrow(r.read_int()?.into(), BuiltInType::Int16);
        read_uint16 => UInt16 -> u16, |r| narrow(r.read_int()?.into(), BuiltInType::UInt16);
        read_int32 => Int32 -> i32, |r| r.read_int();
        read_uint32 => UInt32 -> u32, |r| narrow(r.read_long()?, BuiltInType::UInt32);
        read_int64 => Int64 -> i64, |r| r.read_long();
        /// UInt64 travels as the two's-complement reinterpretation of a long.
        read_uint64 => UInt64 -> u64, |r| Ok(r.read_long()? as u64);
        read_float => Float -> f32, |r| r.read_float();
        read_double => Double -> f64, |r| r.read_double();
        read_string => String -> String, |r| r.read_string();
        read_date_time => DateTime -> DateTime, |r| Ok(DateTime(r.read_long()?));
        read_guid => Guid -> Uuid, |r| parse_guid(&r.read_string()?);
        read_byte_string => ByteString -> Vec<u8>, |r| r.read_bytes();
        read_xml_element => XmlElement -> String, |r| r.read_string();
        read_status_code => StatusCode -> StatusCode, |r| Ok(StatusCode(narrow(r.read_long()?, BuiltInType::StatusCode)?));
        /// Abstract numbers travel as decimal text.
        read_number => Number -> String, |r| r.read_string();
        read_integer => Integer -> String, |r| r.read_string();
        read_uinteger => UInteger -> String, |r| r.read_string();
    }

    /// Consume a null. Nothing is read from the stream.
    pub fn read_null(&mut self, field: Option<&str>) -> Result<()> {
        self.validated(field, BuiltInType::Null, |_| Ok(()))
    }

    /// Read an enumeration ordinal against an enum schema or the Enumeration built-in.
    pub fn read_enumeration(&mut self, field: Option<&str>) -> Result<i32> {
        let node = self.traverser.advance(field)?;
        let value = match node.as_enum() {
            Some(e) => {
                let ordinal = self.reader.read_int()?;
                if ordinal < 0 || ordinal as usize >= e.symbols.len() {
                    return Err(CodecError::decoding(format!(
                        "enum ordinal {ordinal} is out of range for {} with {} symbols",
                        e.name,
                        e.symbols.len()
                    )));
                }
                ordinal
            }
            None => {
                expect_identity(&node, BuiltInType::Enumeration)?;
                self.reader.read_int()?
            }
        };
        self.close(&node)?;
        Ok(value)
    }

    /// Read the raw bytes of a fixed schema.
    pub fn read_fixed(&mut self, field: Option<&str>) -> Result<Vec<u8>> {
        let node = self.traverser.advance(field)?;
        let size = match node.as_ref() {
            SchemaNode::Fixed(fixed) => fixed.size,
            _ => {
                expect_kind(&node, "a fixed", false)?;
                0
            }
        };
        let mut buf = vec![0u8; size];
        self.reader.read_fixed(&mut buf)?;
        self.close(&node)?;
        Ok(buf)
    }

    /// Open a record scope, run `read` for its fields and close it again.
    pub fn read_record<T>(&mut self, field: Option<&str>, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let node = self.traverser.advance(field)?;
        expect_kind(&node, "a record", node.as_record().is_some())?;
        let value = read(self)?;
        self.close(&node)?;
        Ok(value)
    }

    /// Read an array block by block, calling `item` once per element.
    pub fn read_array<T>(&mut self, field: Option<&str>, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let node = self.traverser.advance(field)?;
        expect_kind(&node, "an array", node.as_array_item().is_some())?;

        let mut items = Vec::new();
        loop {
            let mut count = self.reader.read_long()?;
            if count == 0 {
                break;
            }
            if count < 0 {
                // Negative counts are followed by the block size in bytes
                count = count.checked_neg().ok_or_else(|| CodecError::decoding("invalid array block count"))?;
                self.reader.read_long()?;
            }
            let total = items.len() as u64 + count as u64;
            if total > self.options.max_array_length as u64 {
                return Err(CodecError::limit_exceeded("array", total, self.options.max_array_length as u64));
            }
            for _ in 0..count {
                self.traverser.expect_item()?;
                items.push(item(self)?);
            }
        }
        trace!(node = %node.full_name(), items = items.len(), "array decoded");
        self.close(&node)?;
        Ok(items)
    }

    /// Read a union selector, then the selected branch through `read`.
    pub fn read_union<T>(&mut self, field: Option<&str>, read: impl FnOnce(&mut Self, usize) -> Result<T>) -> Result<T> {
        let node = self.traverser.advance(field)?;
        expect_kind(&node, "a union", node.as_union().is_some())?;
        let selector = self.reader.read_long()?;
        self.traverser.select_branch(selector)?;
        let value = read(self, selector as usize)?;
        self.close(&node)?;
        Ok(value)
    }

    pub fn read_node_id(&mut self, field: Option<&str>) -> Result<NodeId> {
        self.validated(field, BuiltInType::NodeId, |d| d.read_node_id_fields())
    }

    pub fn read_expanded_node_id(&mut self, field: Option<&str>) -> Result<ExpandedNodeId> {
        self.validated(field, BuiltInType::ExpandedNodeId, |d| {
            let node_id = d.read_node_id_fields()?;
            let server_uri = d.read_string(Some("ServerUri"))?;
            Ok(ExpandedNodeId { node_id, server_uri })
        })
    }

    pub fn read_qualified_name(&mut self, field: Option<&str>) -> Result<QualifiedName> {
        self.validated(field, BuiltInType::QualifiedName, |d| {
            let namespace_uri = d.read_string(Some("Namespace"))?;
            let name = d.read_string(Some("Name"))?;
            Ok(QualifiedName { namespace_uri, name })
        })
    }

    pub fn read_localized_text(&mut self, field: Option<&str>) -> Result<LocalizedText> {
        self.validated(field, BuiltInType::LocalizedText, |d| {
            let locale = d.read_string(Some("Locale"))?;
            let text = d.read_string(Some("Text"))?;
            Ok(LocalizedText { locale, text })
        })
    }

    /// Read an extension object, either in its generic encoded form or as the record of a
    /// structure type known to the schema.
    pub fn read_extension_object(&mut self, field: Option<&str>) -> Result<ExtensionObject> {
        let node = self.traverser.peek(field)?;
        if identify(&node).is_none() && node.as_record().is_some() && !is_matrix_record(&node) {
            return self.read_structure(field);
        }
        self.validated(field, BuiltInType::ExtensionObject, |d| {
            let type_id = d.read_node_id(Some("TypeId"))?;
            let encoding = d.read_enumeration(Some("Encoding"))?;
            let body = d.read_union(Some("Body"), |d, branch| match branch {
                0 => d.read_null(None).map(|_| ExtensionObjectBody::None),
                1 => d.read_string(None).map(ExtensionObjectBody::Json),
                2 => d.read_xml_element(None).map(ExtensionObjectBody::Xml),
                _ => d.read_byte_string(None).map(ExtensionObjectBody::Binary),
            })?;
            let expected = match &body {
                ExtensionObjectBody::None | ExtensionObjectBody::Json(_) | ExtensionObjectBody::Structure(_) => 0,
                ExtensionObjectBody::Binary(_) => 1,
                ExtensionObjectBody::Xml(_) => 2,
            };
            if encoding != expected {
                return Err(CodecError::decoding(format!(
                    "extension object {type_id} declares encoding {encoding} but carries a body of encoding {expected}"
                )));
            }
            Ok(ExtensionObject::new(type_id, body))
        })
    }

    /// Read a structure record into a decoded extension object body.
    fn read_structure(&mut self, field: Option<&str>) -> Result<ExtensionObject> {
        let node = self.traverser.peek(field)?;
        let type_id = data_type_of(&node).unwrap_or_default();
        let fields: Vec<(String, String)> = node
            .as_record()
            .map(|r| r.fields().iter().map(|f| (f.name.clone(), f.display_name().to_string())).collect())
            .unwrap_or_default();
        let structure = self.read_record(field, |d| {
            let mut structure = Structure::new();
            for (name, display_name) in &fields {
                let value = d.read_value(Some(name))?;
                structure = structure.with(display_name.as_str(), value);
            }
            Ok(structure)
        })?;
        Ok(ExtensionObject::structure(type_id, structure))
    }

    pub fn read_data_value(&mut self, field: Option<&str>) -> Result<DataValue> {
        self.validated(field, BuiltInType::DataValue, |d| {
            let value = d.read_variant(Some("Value"))?;
            d.read_data_value_tail(value)
        })
    }

    /// Read a variant: type tag, body branch and matrix dimensions.
    pub fn read_variant(&mut self, field: Option<&str>) -> Result<Variant> {
        self.validated(field, BuiltInType::Variant, |d| {
            let tag = d.read_byte(Some("Type"))?;
            let (body, branch_type) = d.read_union(Some("Body"), |d, index| {
                let branch = variant_branch(index)
                    .ok_or_else(|| CodecError::decoding(format!("variant body branch {index} is unknown")))?;
                let ty = branch.built_in_type;
                let body = if ty == BuiltInType::Null {
                    d.read_null(None)?;
                    Variant::Null
                } else if branch.is_array {
                    let elements = d.read_array(None, |d| d.read_built_in(None, ty))?;
                    Variant::Array(decoded_array(ty, elements)?)
                } else {
                    Variant::Scalar(d.read_built_in(None, ty)?)
                };
                Ok((body, ty))
            })?;
            if tag != branch_type.id() {
                return Err(CodecError::decoding(format!(
                    "variant type tag {tag} does not match its {branch_type} body"
                )));
            }
            let dimensions = d.read_array(Some("Dimensions"), |d| d.read_uint32(None))?;
            if dimensions.is_empty() {
                return Ok(body);
            }
            match body {
                Variant::Array(array) => Ok(Variant::Matrix(
                    Matrix::new(array.element_type(), dimensions, array.into_elements()).map_err(into_decoding)?,
                )),
                other => Err(CodecError::decoding(format!(
                    "variant with dimensions {dimensions:?} carries a {} scalar",
                    other.built_in_type()
                ))),
            }
        })
    }

    pub fn read_diagnostic_info(&mut self, field: Option<&str>) -> Result<DiagnosticInfo> {
        self.validated(field, BuiltInType::DiagnosticInfo, |d| {
            let symbolic_id = d.read_int32(Some("SymbolicId"))?;
            let namespace_uri = d.read_int32(Some("NamespaceUri"))?;
            let locale = d.read_int32(Some("Locale"))?;
            let localized_text = d.read_int32(Some("LocalizedText"))?;
            let additional_info = d.read_string(Some("AdditionalInfo"))?;
            let inner_status_code = d.read_status_code(Some("InnerStatusCode"))?;
            let inner_diagnostic_info = d.read_union(Some("InnerDiagnosticInfo"), |d, branch| {
                if branch == 0 {
                    d.read_null(None)?;
                    Ok(None)
                } else {
                    Ok(Some(Box::new(d.read_diagnostic_info(None)?)))
                }
            })?;
            Ok(DiagnosticInfo {
                symbolic_id,
                namespace_uri,
                locale,
                localized_text,
                additional_info,
                inner_status_code,
                inner_diagnostic_info,
            })
        })
    }

    /// Read whatever value the schema declares at this position.
    pub fn read_value(&mut self, field: Option<&str>) -> Result<Variant> {
        let node = self.traverser.peek(field)?;
        self.read_node_value(field, &node)
    }

    /// Read one data set message: the record of a single data set, or a union selector
    /// followed by the record of the selected data set.
    pub fn read_data_set(&mut self) -> Result<DataSet> {
        let root = self.traverser.peek(None)?;
        if root.as_union().is_some() {
            self.read_union(None, |d, _| d.read_data_set_record())
        } else {
            self.read_data_set_record()
        }
    }

    fn read_data_set_record(&mut self) -> Result<DataSet> {
        let node = self.traverser.peek(None)?;
        let record = node
            .as_record()
            .ok_or_else(|| CodecError::decoding(format!("data set schema {} is not a record", node.full_name())))?;
        let raw_name = record.aliases.first().unwrap_or(&record.name.name);
        let name = (raw_name != DEFAULT_DATA_SET_NAME).then(|| raw_name.clone());
        let fields: Vec<(String, String)> =
            record.fields().iter().map(|f| (f.name.clone(), f.display_name().to_string())).collect();

        self.read_record(None, |d| {
            let mut data_set = DataSet::new(name);
            let mut content = FieldContent::RawData;
            for (field, display_name) in &fields {
                // Inspect the field on a fork to learn which shape was written
                let shape = d.traverser.peek(Some(field))?;
                let value = if is_data_value_record(&shape) {
                    content = FieldContent::DataValue;
                    d.read_record(Some(field), |d| {
                        let value = d.read_value(Some("Value"))?;
                        d.read_data_value_tail(value)
                    })?
                } else {
                    DataValue::new(d.read_value(Some(field))?)
                };
                data_set.push(display_name.as_str(), value);
            }
            data_set.set_field_content(content);
            debug!(fields = data_set.len(), ?content, "decoded data set");
            Ok(data_set)
        })
    }

    fn read_data_value_tail(&mut self, value: Variant) -> Result<DataValue> {
        Ok(DataValue {
            value,
            status: self.read_status_code(Some("StatusCode"))?,
            source_timestamp: self.read_date_time(Some("SourceTimestamp"))?,
            source_picoseconds: self.read_uint16(Some("SourcePicoseconds"))?,
            server_timestamp: self.read_date_time(Some("ServerTimestamp"))?,
            server_picoseconds: self.read_uint16(Some("ServerPicoseconds"))?,
        })
    }

    fn read_node_id_fields(&mut self) -> Result<NodeId> {
        let namespace_uri = self.read_string(Some("Namespace"))?;
        let identifier = self.read_union(Some("Identifier"), |d, branch| match branch {
            0 => d.read_uint32(None).map(Identifier::Numeric),
            1 => d.read_string(None).map(Identifier::String),
            2 => d.read_guid(None).map(Identifier::Guid),
            _ => d.read_byte_string(None).map(Identifier::Opaque),
        })?;
        Ok(NodeId { namespace_uri, identifier })
    }

    /// Read one value of a built-in type as a scalar.
    fn read_built_in(&mut self, field: Option<&str>, ty: BuiltInType) -> Result<Value> {
        Ok(match ty {
            BuiltInType::Null => {
                return Err(CodecError::decoding("null is not a scalar value"));
            }
            BuiltInType::Boolean => Value::Boolean(self.read_boolean(field)?),
            BuiltInType::SByte => Value::SByte(self.read_sbyte(field)?),
            BuiltInType::Byte => Value::Byte(self.read_byte(field)?),
            BuiltInType::Int16 => Value::Int16(self.read_int16(field)?),
            BuiltInType::UInt16 => Value::UInt16(self.read_uint16(field)?),
            BuiltInType::Int32 => Value::Int32(self.read_int32(field)?),
            BuiltInType::UInt32 => Value::UInt32(self.read_uint32(field)?),
            BuiltInType::Int64 => Value::Int64(self.read_int64(field)?),
            BuiltInType::UInt64 => Value::UInt64(self.read_uint64(field)?),
            BuiltInType::Float => Value::Float(self.read_float(field)?),
            BuiltInType::Double => Value::Double(self.read_double(field)?),
            BuiltInType::String => Value::String(self.read_string(field)?),
            BuiltInType::DateTime => Value::DateTime(self.read_date_time(field)?),
            BuiltInType::Guid => Value::Guid(self.read_guid(field)?),
            BuiltInType::ByteString => Value::ByteString(self.read_byte_string(field)?),
            BuiltInType::XmlElement => Value::XmlElement(self.read_xml_element(field)?),
            BuiltInType::NodeId => Value::NodeId(self.read_node_id(field)?),
            BuiltInType::ExpandedNodeId => Value::ExpandedNodeId(self.read_expanded_node_id(field)?),
            BuiltInType::StatusCode => Value::StatusCode(self.read_status_code(field)?),
            BuiltInType::QualifiedName => Value::QualifiedName(self.read_qualified_name(field)?),
            BuiltInType::LocalizedText => Value::LocalizedText(self.read_localized_text(field)?),
            BuiltInType::ExtensionObject => Value::from(self.read_extension_object(field)?),
            BuiltInType::DataValue => Value::DataValue(Box::new(self.read_data_value(field)?)),
            BuiltInType::Variant => Value::Variant(Box::new(self.read_variant(field)?)),
            BuiltInType::DiagnosticInfo => Value::DiagnosticInfo(Box::new(self.read_diagnostic_info(field)?)),
            BuiltInType::Number => Value::String(self.read_number(field)?),
            BuiltInType::Integer => Value::String(self.read_integer(field)?),
            BuiltInType::UInteger => Value::String(self.read_uinteger(field)?),
            BuiltInType::Enumeration => Value::Enumeration(self.read_enumeration(field)?),
        })
    }

    fn read_node_value(&mut self, field: Option<&str>, node: &Schema) -> Result<Variant> {
        match identify(node) {
            Some(BuiltInType::Null) => return self.read_null(field).map(|_| Variant::Null),
            Some(BuiltInType::Variant) => return self.read_variant(field),
            Some(ty) => return self.read_built_in(field, ty).map(Variant::Scalar),
            None => {}
        }
        match node.as_ref() {
            SchemaNode::Union(branches) => {
                let branches = branches.clone();
                self.read_union(field, |d, index| {
                    let branch = resolve(&branches[index])?;
                    d.read_node_value(None, &branch)
                })
            }
            SchemaNode::Array(item) => {
                let item = resolve(item)?;
                let elements = self.read_array(field, |d| d.read_element(None, &item))?;
                let ty = elements.first().map_or_else(|| element_type(&item), Value::built_in_type);
                Ok(Variant::Array(decoded_array(ty, elements)?))
            }
            SchemaNode::Record(_) if is_matrix_record(node) => self.read_matrix(field),
            _ => self.read_element(field, node).map(Variant::Scalar),
        }
    }

    /// Read one value that must be a scalar.
    fn read_element(&mut self, field: Option<&str>, node: &Schema) -> Result<Value> {
        let node = resolve(node)?;
        if let Some(ty) = identify(&node) {
            return self.read_built_in(field, ty);
        }
        match node.as_ref() {
            SchemaNode::Record(_) if !is_matrix_record(&node) => self.read_structure(field).map(Value::from),
            SchemaNode::Enum(_) => self.read_enumeration(field).map(Value::Enumeration),
            SchemaNode::Fixed(_) => self.read_fixed(field).map(Value::ByteString),
            SchemaNode::Union(_) | SchemaNode::Array(_) | SchemaNode::Record(_) => {
                match self.read_node_value(field, &node)? {
                    Variant::Scalar(value) => Ok(value),
                    other => Err(CodecError::decoding(format!(
                        "expected a scalar from {}, found {other:?}",
                        node.full_name()
                    ))),
                }
            }
            _ => self.read_primitive(field, &node),
        }
    }

    fn read_matrix(&mut self, field: Option<&str>) -> Result<Variant> {
        self.read_record(field, |d| {
            let dimensions = d.read_array(Some("Dimensions"), |d| d.read_uint32(None))?;
            let (ty, elements) = match d.read_value(Some("Body"))? {
                Variant::Array(array) => (array.element_type(), array.into_elements()),
                other => return Err(CodecError::decoding(format!("matrix body decoded as {other:?}"))),
            };
            Ok(Variant::Matrix(Matrix::new(ty, dimensions, elements).map_err(into_decoding)?))
        })
    }

    /// Read a value of an unnamed primitive or a user-defined simple type by its wire kind.
    fn read_primitive(&mut self, field: Option<&str>, expected: &Schema) -> Result<Value> {
        let node = self.traverser.advance(field)?;
        if !node.same_type(expected) {
            return Err(CodecError::decoding(format!(
                "type mismatch: expected {} but the schema declares {}",
                expected.full_name(),
                node.full_name()
            )));
        }
        let kind = node
            .primitive_kind()
            .ok_or_else(|| CodecError::decoding(format!("{} is not a primitive", node.full_name())))?;
        let value = match kind {
            PrimitiveKind::Null => return Err(CodecError::decoding("null is not a scalar value")),
            PrimitiveKind::Boolean => Value::Boolean(self.reader.read_boolean()?),
            PrimitiveKind::Int => Value::Int32(self.reader.read_int()?),
            PrimitiveKind::Long => Value::Int64(self.reader.read_long()?),
            PrimitiveKind::Float => Value::Float(self.reader.read_float()?),
            PrimitiveKind::Double => Value::Double(self.reader.read_double()?),
            PrimitiveKind::Bytes => Value::ByteString(self.reader.read_bytes()?),
            PrimitiveKind::String => Value::String(self.reader.read_string()?),
        };
        debug_assert_eq!(value.built_in_type(), primitive_value_type(kind));
        self.close(&node)?;
        Ok(value)
    }

    fn validated<T>(
        &mut self,
        field: Option<&str>,
        expected: BuiltInType,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let node = self.traverser.advance(field)?;
        expect_identity(&node, expected)?;
        let value = read(self)?;
        self.close(&node)?;
        Ok(value)
    }

    /// Pop the innermost frame and check it is the one `opened` pushed.
    fn close(&mut self, opened: &Schema) -> Result<()> {
        let closed = self.traverser.pop()?;
        if !Arc::ptr_eq(&closed, opened) {
            return Err(CodecError::decoding(format!(
                "scope mismatch: opened {} but closed {}",
                opened.full_name(),
                closed.full_name()
            )));
        }
        Ok(())
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, ty: BuiltInType) -> Result<T> {
    T::try_from(value).map_err(|_| CodecError::decoding(format!("value {value} is out of range for {ty}")))
}

fn parse_guid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| CodecError::decoding(format!("invalid guid '{text}': {e}")))
}

fn decoded_array(ty: BuiltInType, elements: Vec<Value>) -> Result<Array> {
    Array::new(ty, elements).map_err(into_decoding)
}

fn into_decoding(error: CodecError) -> CodecError {
    match error {
        CodecError::Encoding { reason } => CodecError::Decoding { reason },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::BinaryWriter;
    use crate::schema::{BuiltInSchemas, Field, Name, RecordSchema, nullable};
    use std::io::Cursor;

    fn record(fields: Vec<(&str, Schema)>) -> Schema {
        let fields = fields.into_iter().map(|(n, s)| Field::new(n, s)).collect();
        Arc::new(SchemaNode::Record(RecordSchema::new(Name::new("R", None), fields).unwrap()))
    }

    fn bytes(write: impl FnOnce(&mut BinaryWriter<&mut Vec<u8>>)) -> Vec<u8> {
        let mut buf = Vec::new();
        write(&mut BinaryWriter::new(&mut buf));
        buf
    }

    fn int_and_string() -> Schema {
        let mut registry = BuiltInSchemas::new();
        record(vec![("a", registry.get(BuiltInType::Int32)), ("b", registry.get(BuiltInType::String))])
    }

    #[test]
    fn reads_record_fields_in_schema_order() {
        let data = bytes(|w| {
            w.write_int(42).unwrap();
            w.write_string("abc").unwrap();
        });
        let mut decoder = SchemaDecoder::new(data.as_slice(), int_and_string());
        let (a, b) = decoder
            .read_record(None, |d| Ok((d.read_int32(Some("a"))?, d.read_string(Some("b"))?)))
            .unwrap();
        assert_eq!((a, b.as_str()), (42, "abc"));
        decoder.finish_message().unwrap();
    }

    #[test]
    fn wrong_identity_fails_before_reading() {
        let data = bytes(|w| w.write_int(42).unwrap());
        let mut decoder = SchemaDecoder::new(data.as_slice(), int_and_string());
        let error = decoder.read_record(None, |d| d.read_string(Some("a"))).unwrap_err();
        assert!(matches!(error, CodecError::Decoding { .. }));
        let message = error.to_string();
        assert!(message.contains("org.opcfoundation.ua.String"), "{message}");
        assert!(message.contains("org.opcfoundation.ua.Int32"), "{message}");
        assert_eq!(decoder.position(), 0);
    }

    #[test]
    fn unions_select_branches_by_index() {
        let schema = nullable(Arc::new(PrimitiveKind::String.node()));
        let data = bytes(|w| {
            w.write_long(1).unwrap();
            w.write_string("hello").unwrap();
        });
        let mut decoder = SchemaDecoder::new(data.as_slice(), schema.clone());
        assert_eq!(decoder.read_value(None).unwrap(), Variant::from("hello"));

        let data = bytes(|w| w.write_long(5).unwrap());
        let mut decoder = SchemaDecoder::new(data.as_slice(), schema);
        let error = decoder.read_value(None).unwrap_err();
        assert!(error.to_string().contains("out of range"), "{error}");
    }

    #[test]
    fn incomplete_messages_are_reported() {
        let data = bytes(|w| w.write_int(1).unwrap());
        let mut decoder = SchemaDecoder::new(data.as_slice(), int_and_string());
        let error = decoder.read_record(None, |d| d.read_int32(Some("a"))).unwrap_err();
        assert!(error.to_string().contains("premature end"), "{error}");
    }

    #[test]
    fn reads_blocked_arrays() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.array_of(BuiltInType::Int32);
        let data = bytes(|w| {
            w.write_long(-2).unwrap();
            w.write_long(2).unwrap();
            w.write_int(1).unwrap();
            w.write_int(2).unwrap();
            w.write_long(1).unwrap();
            w.write_int(3).unwrap();
            w.write_long(0).unwrap();
        });
        let mut decoder = SchemaDecoder::new(data.as_slice(), schema);
        let values = decoder.read_array(None, |d| d.read_int32(None)).unwrap();
        assert_eq!(values, [1, 2, 3]);
        decoder.finish_message().unwrap();
    }

    #[test]
    fn array_length_is_capped() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.array_of(BuiltInType::Boolean);
        let data = bytes(|w| w.write_long(10).unwrap());
        let options = CodecOptions { max_array_length: 4, ..CodecOptions::default() };
        let mut decoder = SchemaDecoder::with_options(data.as_slice(), schema, options);
        let error = decoder.read_array(None, |d| d.read_boolean(None)).unwrap_err();
        assert!(matches!(error, CodecError::LimitExceeded { length: 10, limit: 4, .. }));
    }

    #[test]
    fn out_of_range_narrow_values_fail() {
        let mut registry = BuiltInSchemas::new();
        let data = bytes(|w| w.write_int(300).unwrap());
        let mut decoder = SchemaDecoder::new(data.as_slice(), registry.get(BuiltInType::Byte));
        assert!(decoder.read_byte(None).unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn variant_tag_must_match_body() {
        let mut registry = BuiltInSchemas::new();
        let schema = registry.get(BuiltInType::Variant);
        let data = bytes(|w| {
            w.write_int(BuiltInType::Double.id().into()).unwrap();
            w.write_long(6).unwrap(); // Int32 branch
            w.write_int(9).unwrap();
            w.write_long(0).unwrap();
        });
        let mut decoder = SchemaDecoder::new(Cursor::new(data), schema);
        assert!(decoder.read_variant(None).unwrap_err().to_string().contains("type tag"));
    }

    #[test]
    fn truncated_streams_end_the_message() {
        let mut decoder = SchemaDecoder::new(&[][..], int_and_string());
        let error = decoder.read_record(None, |d| d.read_int32(Some("a"))).unwrap_err();
        assert!(matches!(error, CodecError::EndOfStream { .. }));
        assert!(!error.is_message_local());
    }
}
