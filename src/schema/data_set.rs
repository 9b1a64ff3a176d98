//! Data set message schemas.
//!
//! A data set message is one record whose fields are the published values in metadata order.
//! Raw content encodes each field as a nullable value of its declared type; DataValue content
//! wraps each value in a `<Type>DataValue` record carrying status and timestamps. When a writer
//! publishes several data sets, the message schema is the union of their records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::builder::{SchemaBuilder, TypeDescription, escaped_field, scalar_rank};
use super::builtins::identify;
use super::naming::escape_symbol;
use super::node::{Name, RecordSchema, Schema, SchemaNode, nullable};
use crate::types::{BuiltInType, FieldContent, NodeId};
use crate::{CodecError, Result};

/// Record name used for data sets without a name.
pub const DEFAULT_DATA_SET_NAME: &str = "Payload";

const DATA_VALUE_FIELDS: [&str; 6] =
    ["Value", "StatusCode", "SourceTimestamp", "SourcePicoseconds", "ServerTimestamp", "ServerPicoseconds"];

/// Published shape of one data set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataSetMetadata {
    pub name: Option<String>,
    pub fields: Vec<FieldMetadata>,
    /// Descriptions of the non built-in types the fields refer to
    pub types: Vec<TypeDescription>,
}

impl DataSetMetadata {
    pub fn new(name: Option<&str>) -> Self {
        Self { name: name.map(str::to_string), ..Self::default() }
    }

    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_type(mut self, description: TypeDescription) -> Self {
        self.types.push(description);
        self
    }

    /// Raw data set name, `Payload` when unnamed.
    pub fn record_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_DATA_SET_NAME)
    }
}

/// One published field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub name: String,
    pub data_type: NodeId,
    #[serde(default = "scalar_rank")]
    pub value_rank: i32,
    #[serde(default)]
    pub array_dimensions: Vec<u32>,
}

impl FieldMetadata {
    pub fn scalar(name: impl Into<String>, data_type: NodeId) -> Self {
        Self { name: name.into(), data_type, value_rank: scalar_rank(), array_dimensions: Vec::new() }
    }

    /// Field of a built-in type.
    pub fn built_in(name: impl Into<String>, built_in_type: BuiltInType) -> Self {
        Self::scalar(name, NodeId::numeric("", u32::from(built_in_type.id())))
    }

    pub fn with_rank(mut self, value_rank: i32) -> Self {
        self.value_rank = value_rank;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Vec<u32>) -> Self {
        self.array_dimensions = dimensions;
        self
    }
}

impl SchemaBuilder {
    /// Compile the record schema of one data set.
    pub fn compile_data_set(&mut self, metadata: &DataSetMetadata, content: FieldContent) -> Result<Schema> {
        self.add_types(metadata.types.iter().cloned());

        let mut fields = Vec::with_capacity(metadata.fields.len());
        for field in &metadata.fields {
            if field.data_type.is_null() {
                warn!(field = %field.name, "skipping field without data type");
                continue;
            }
            let value = self.field_schema(&field.data_type, field.value_rank, &field.array_dimensions)?;
            let schema = match content {
                FieldContent::RawData => nullable(value),
                FieldContent::DataValue => self.data_value_record(value)?,
            };
            fields.push(escaped_field(&field.name, schema));
        }

        let raw_name = metadata.record_name();
        let symbol = escape_symbol(raw_name);
        let aliases = if symbol == raw_name { Vec::new() } else { vec![raw_name.to_string()] };
        let record = RecordSchema::new(Name::new(symbol, None), fields)?.with_aliases(aliases).anchored();
        debug!(data_set = raw_name, fields = record.fields().len(), ?content, "compiled data set schema");
        Ok(Arc::new(SchemaNode::Record(record)))
    }

    /// Compile the message schema for a set of data sets: the single record, or a union of records.
    pub fn compile_messages(&mut self, data_sets: &[DataSetMetadata], content: FieldContent) -> Result<Schema> {
        let mut records: Vec<Schema> = Vec::with_capacity(data_sets.len());
        for metadata in data_sets {
            let record = self.compile_data_set(metadata, content)?;
            if records.iter().any(|r| r.same_type(&record)) {
                return Err(CodecError::schema(
                    "message schema",
                    format!("data set {} is defined twice", record.full_name()),
                ));
            }
            records.push(record);
        }
        match records.len() {
            0 => Err(CodecError::schema("message schema", "no data sets to compile")),
            1 => Ok(records.remove(0)),
            _ => Ok(Arc::new(SchemaNode::Union(records))),
        }
    }
}

/// Whether `node` is a `<Type>DataValue` field record rather than the built-in DataValue.
pub fn is_data_value_record(node: &SchemaNode) -> bool {
    let Some(record) = node.as_record() else {
        return false;
    };
    identify(node) != Some(BuiltInType::DataValue)
        && record.name.name.ends_with("DataValue")
        && record.fields().len() == DATA_VALUE_FIELDS.len()
        && record.fields().iter().zip(DATA_VALUE_FIELDS).all(|(f, name)| f.name == name)
}
