//! Scalar values and the variant container

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    BuiltInType, DataValue, DateTime, DiagnosticInfo, ExpandedNodeId, ExtensionObject,
    LocalizedText, NodeId, QualifiedName, StatusCode,
};
use crate::{CodecError, Result};

/// A single value of one built-in type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime),
    Guid(Uuid),
    ByteString(Vec<u8>),
    XmlElement(String),
    NodeId(NodeId),
    ExpandedNodeId(ExpandedNodeId),
    StatusCode(StatusCode),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
    ExtensionObject(Box<ExtensionObject>),
    DataValue(Box<DataValue>),
    Variant(Box<Variant>),
    DiagnosticInfo(Box<DiagnosticInfo>),
    Enumeration(i32),
}

impl Value {
    pub fn built_in_type(&self) -> BuiltInType {
        match self {
            Value::Boolean(_) => BuiltInType::Boolean,
            Value::SByte(_) => BuiltInType::SByte,
            Value::Byte(_) => BuiltInType::Byte,
            Value::Int16(_) => BuiltInType::Int16,
            Value::UInt16(_) => BuiltInType::UInt16,
            Value::Int32(_) => BuiltInType::Int32,
            Value::UInt32(_) => BuiltInType::UInt32,
            Value::Int64(_) => BuiltInType::Int64,
            Value::UInt64(_) => BuiltInType::UInt64,
            Value::Float(_) => BuiltInType::Float,
            Value::Double(_) => BuiltInType::Double,
            Value::String(_) => BuiltInType::String,
            Value::DateTime(_) => BuiltInType::DateTime,
            Value::Guid(_) => BuiltInType::Guid,
            Value::ByteString(_) => BuiltInType::ByteString,
            Value::XmlElement(_) => BuiltInType::XmlElement,
            Value::NodeId(_) => BuiltInType::NodeId,
            Value::ExpandedNodeId(_) => BuiltInType::ExpandedNodeId,
            Value::StatusCode(_) => BuiltInType::StatusCode,
            Value::QualifiedName(_) => BuiltInType::QualifiedName,
            Value::LocalizedText(_) => BuiltInType::LocalizedText,
            Value::ExtensionObject(_) => BuiltInType::ExtensionObject,
            Value::DataValue(_) => BuiltInType::DataValue,
            Value::Variant(_) => BuiltInType::Variant,
            Value::DiagnosticInfo(_) => BuiltInType::DiagnosticInfo,
            Value::Enumeration(_) => BuiltInType::Enumeration,
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime => DateTime,
    Uuid => Guid,
    NodeId => NodeId,
    ExpandedNodeId => ExpandedNodeId,
    StatusCode => StatusCode,
    QualifiedName => QualifiedName,
    LocalizedText => LocalizedText,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<ExtensionObject> for Value {
    fn from(value: ExtensionObject) -> Self {
        Value::ExtensionObject(Box::new(value))
    }
}

/// A one-dimensional array of values sharing one built-in type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    element_type: BuiltInType,
    elements: Vec<Value>,
}

impl Array {
    /// Create an array, checking every element has `element_type`.
    pub fn new(element_type: BuiltInType, elements: Vec<Value>) -> Result<Self> {
        if let Some(bad) = elements.iter().find(|e| e.built_in_type() != element_type) {
            return Err(CodecError::encoding(format!(
                "Array of {element_type} cannot hold a {} element",
                bad.built_in_type()
            )));
        }
        Ok(Self { element_type, elements })
    }

    pub fn element_type(&self) -> BuiltInType {
        self.element_type
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Value> {
        self.elements
    }
}

/// A multi-dimensional array stored in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    element_type: BuiltInType,
    dimensions: Vec<u32>,
    elements: Vec<Value>,
}

impl Matrix {
    /// Create a matrix, checking element types and that the dimensions cover every element.
    pub fn new(element_type: BuiltInType, dimensions: Vec<u32>, elements: Vec<Value>) -> Result<Self> {
        let expected = dimensions.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d as usize));
        if dimensions.is_empty() || expected != Some(elements.len()) {
            return Err(CodecError::encoding(format!(
                "Matrix dimensions {dimensions:?} do not match {} elements",
                elements.len()
            )));
        }
        let array = Array::new(element_type, elements)?;
        Ok(Self { element_type, dimensions, elements: array.into_elements() })
    }

    pub fn element_type(&self) -> BuiltInType {
        self.element_type
    }

    pub fn dimensions(&self) -> &[u32] {
        &self.dimensions
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

/// Tagged container for a value of any built-in type and rank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    Null,
    Scalar(Value),
    Array(Array),
    Matrix(Matrix),
}

impl Variant {
    /// Built-in type of the contained value, [`BuiltInType::Null`] when empty.
    pub fn built_in_type(&self) -> BuiltInType {
        match self {
            Variant::Null => BuiltInType::Null,
            Variant::Scalar(value) => value.built_in_type(),
            Variant::Array(array) => array.element_type(),
            Variant::Matrix(matrix) => matrix.element_type(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Variant::Scalar(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for Variant {
    fn from(value: Value) -> Self {
        Variant::Scalar(value)
    }
}

macro_rules! variant_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for Variant {
                fn from(value: $source) -> Self {
                    Variant::Scalar(Value::from(value))
                }
            }
        )*
    };
}

variant_from!(
    bool,
    i8,
    u8,
    i16,
    u16,
    i32,
    u32,
    i64,
    u64,
    f32,
    f64,
    String,
    &str,
    DateTime,
    Uuid,
    NodeId,
    ExpandedNodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
    ExtensionObject,
);

impl From<Array> for Variant {
    fn from(array: Array) -> Self {
        Variant::Array(array)
    }
}

impl From<Matrix> for Variant {
    fn from(matrix: Matrix) -> Self {
        Variant::Matrix(matrix)
    }
}
