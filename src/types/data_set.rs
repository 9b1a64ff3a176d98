//! Data set messages

use serde::{Deserialize, Serialize};

use super::DataValue;

/// Wire shape of data set fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldContent {
    /// Bare values; status and timestamps are dropped
    #[default]
    RawData,
    /// Full data value records carrying status and timestamps
    DataValue,
}

/// One named value of a data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetField {
    pub name: String,
    pub value: DataValue,
}

/// An ordered named mapping of values representing one published record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    /// Name of the message shape, used to pick a branch when several shapes share a schema
    pub name: Option<String>,
    fields: Vec<DataSetField>,
    field_content: FieldContent,
}

impl DataSet {
    pub fn new(name: Option<String>) -> Self {
        Self { name, fields: Vec::new(), field_content: FieldContent::RawData }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: DataValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: DataValue) {
        self.fields.push(DataSetField { name: name.into(), value });
    }

    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    pub fn fields(&self) -> &[DataSetField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shape the fields were decoded from.
    pub fn field_content(&self) -> FieldContent {
        self.field_content
    }

    pub fn set_field_content(&mut self, field_content: FieldContent) {
        self.field_content = field_content;
    }

    /// Whether every field was decoded from the raw value shape.
    pub fn is_raw(&self) -> bool {
        self.field_content == FieldContent::RawData
    }
}
