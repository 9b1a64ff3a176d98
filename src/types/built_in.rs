//! Built-in type table

use serde::{Deserialize, Serialize};

/// The canonical built-in kinds, numbered as on the OPC UA wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuiltInType {
    Null = 0,
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    XmlElement = 16,
    NodeId = 17,
    ExpandedNodeId = 18,
    StatusCode = 19,
    QualifiedName = 20,
    LocalizedText = 21,
    ExtensionObject = 22,
    DataValue = 23,
    Variant = 24,
    DiagnosticInfo = 25,
    /// Abstract numeric super type, carried as decimal text
    Number = 26,
    Integer = 27,
    UInteger = 28,
    Enumeration = 29,
}

impl BuiltInType {
    /// Every built-in type in id order.
    pub const ALL: [BuiltInType; 30] = [
        BuiltInType::Null,
        BuiltInType::Boolean,
        BuiltInType::SByte,
        BuiltInType::Byte,
        BuiltInType::Int16,
        BuiltInType::UInt16,
        BuiltInType::Int32,
        BuiltInType::UInt32,
        BuiltInType::Int64,
        BuiltInType::UInt64,
        BuiltInType::Float,
        BuiltInType::Double,
        BuiltInType::String,
        BuiltInType::DateTime,
        BuiltInType::Guid,
        BuiltInType::ByteString,
        BuiltInType::XmlElement,
        BuiltInType::NodeId,
        BuiltInType::ExpandedNodeId,
        BuiltInType::StatusCode,
        BuiltInType::QualifiedName,
        BuiltInType::LocalizedText,
        BuiltInType::ExtensionObject,
        BuiltInType::DataValue,
        BuiltInType::Variant,
        BuiltInType::DiagnosticInfo,
        BuiltInType::Number,
        BuiltInType::Integer,
        BuiltInType::UInteger,
        BuiltInType::Enumeration,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(usize::try_from(id).ok()?).copied()
    }

    /// Schema name of the type inside the built-in namespace.
    pub const fn name(self) -> &'static str {
        match self {
            BuiltInType::Null => "Null",
            BuiltInType::Boolean => "Boolean",
            BuiltInType::SByte => "SByte",
            BuiltInType::Byte => "Byte",
            BuiltInType::Int16 => "Int16",
            BuiltInType::UInt16 => "UInt16",
            BuiltInType::Int32 => "Int32",
            BuiltInType::UInt32 => "UInt32",
            BuiltInType::Int64 => "Int64",
            BuiltInType::UInt64 => "UInt64",
            BuiltInType::Float => "Float",
            BuiltInType::Double => "Double",
            BuiltInType::String => "String",
            BuiltInType::DateTime => "DateTime",
            BuiltInType::Guid => "Guid",
            BuiltInType::ByteString => "ByteString",
            BuiltInType::XmlElement => "XmlElement",
            BuiltInType::NodeId => "NodeId",
            BuiltInType::ExpandedNodeId => "ExpandedNodeId",
            BuiltInType::StatusCode => "StatusCode",
            BuiltInType::QualifiedName => "QualifiedName",
            BuiltInType::LocalizedText => "LocalizedText",
            BuiltInType::ExtensionObject => "ExtensionObject",
            BuiltInType::DataValue => "DataValue",
            BuiltInType::Variant => "Variant",
            BuiltInType::DiagnosticInfo => "DiagnosticInfo",
            BuiltInType::Number => "Number",
            BuiltInType::Integer => "Integer",
            BuiltInType::UInteger => "UInteger",
            BuiltInType::Enumeration => "Enumeration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Whether a variant can carry a value of this type.
    ///
    /// The structured kinds that themselves wrap arbitrary values never appear inside a
    /// variant body, and the abstract numeric types have no concrete values.
    pub const fn is_variant_member(self) -> bool {
        !matches!(
            self,
            BuiltInType::ExtensionObject
                | BuiltInType::DataValue
                | BuiltInType::Variant
                | BuiltInType::DiagnosticInfo
                | BuiltInType::Number
                | BuiltInType::Integer
                | BuiltInType::UInteger
        )
    }
}

impl std::fmt::Display for BuiltInType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_table_order() {
        for (index, ty) in BuiltInType::ALL.iter().enumerate() {
            assert_eq!(ty.id() as usize, index);
            assert_eq!(BuiltInType::from_id(index as u32), Some(*ty));
            assert_eq!(BuiltInType::from_name(ty.name()), Some(*ty));
        }
        assert_eq!(BuiltInType::from_id(30), None);
    }

    #[test]
    fn variant_membership_excludes_wrappers() {
        let members = BuiltInType::ALL.iter().filter(|t| t.is_variant_member()).count();
        assert_eq!(members, 23);
        assert!(!BuiltInType::Variant.is_variant_member());
        assert!(BuiltInType::Enumeration.is_variant_member());
    }
}
