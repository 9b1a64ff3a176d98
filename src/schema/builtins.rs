//! Built-in schema registry.
//!
//! Every built-in type has one named schema in the [`BUILT_IN_NAMESPACE`]. Leaf types are
//! [`DerivedSchema`] nodes over their wire primitive; structured types are records over other
//! built-ins. Each registry instance derives a schema at most once and hands out shared
//! handles afterwards, so two registries never share state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::naming::BUILT_IN_NAMESPACE;
use super::node::{
    DerivedSchema, EnumSchema, Field, Name, PrimitiveKind, RecordSchema, Schema, SchemaNode,
    SchemaRef,
};
use crate::types::BuiltInType;

/// One branch of the variant body union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantBranch {
    pub built_in_type: BuiltInType,
    pub is_array: bool,
}

/// Branches of the variant body in union order: scalars first, then arrays.
pub fn variant_branches() -> impl Iterator<Item = VariantBranch> {
    let members = || BuiltInType::ALL.into_iter().filter(|t| t.is_variant_member());
    members()
        .map(|t| VariantBranch { built_in_type: t, is_array: false })
        .chain(
            members()
                .filter(|t| *t != BuiltInType::Null)
                .map(|t| VariantBranch { built_in_type: t, is_array: true }),
        )
}

/// Union index of a variant body branch.
pub fn variant_branch_index(built_in_type: BuiltInType, is_array: bool) -> Option<usize> {
    variant_branches().position(|b| b.built_in_type == built_in_type && b.is_array == is_array)
}

/// Branch selected by a variant body union index.
pub fn variant_branch(index: usize) -> Option<VariantBranch> {
    variant_branches().nth(index)
}

/// Built-in type a schema node stands for, if any.
pub fn identify(node: &SchemaNode) -> Option<BuiltInType> {
    match node {
        SchemaNode::Null => Some(BuiltInType::Null),
        SchemaNode::Derived(_) | SchemaNode::Record(_) | SchemaNode::Reference(_) => {
            let name = node.name()?;
            if name.namespace.as_deref() != Some(BUILT_IN_NAMESPACE) {
                return None;
            }
            BuiltInType::from_name(&name.name)
        }
        _ => None,
    }
}

/// Per-instance cache of built-in schemas.
#[derive(Debug, Default)]
pub struct BuiltInSchemas {
    schemas: HashMap<BuiltInType, Schema>,
    arrays: HashMap<BuiltInType, Schema>,
}

impl BuiltInSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema of a built-in type, derived on first use.
    pub fn get(&mut self, built_in_type: BuiltInType) -> Schema {
        if let Some(schema) = self.schemas.get(&built_in_type) {
            return schema.clone();
        }
        trace!(built_in = %built_in_type, "deriving built-in schema");
        let schema = self.derive(built_in_type);
        self.schemas.insert(built_in_type, schema.clone());
        schema
    }

    /// Schema of a one-dimensional array of a built-in type.
    pub fn array_of(&mut self, built_in_type: BuiltInType) -> Schema {
        if let Some(schema) = self.arrays.get(&built_in_type) {
            return schema.clone();
        }
        let schema = Arc::new(SchemaNode::Array(self.get(built_in_type)));
        self.arrays.insert(built_in_type, schema.clone());
        schema
    }

    fn derive(&mut self, built_in_type: BuiltInType) -> Schema {
        use BuiltInType as T;
        match built_in_type {
            T::Null => Arc::new(SchemaNode::Null),
            T::Boolean => derived(built_in_type, PrimitiveKind::Boolean, None),
            T::SByte | T::Byte | T::Int16 | T::UInt16 | T::Int32 | T::Enumeration => {
                derived(built_in_type, PrimitiveKind::Int, None)
            }
            T::UInt32 | T::Int64 | T::UInt64 | T::DateTime | T::StatusCode => {
                derived(built_in_type, PrimitiveKind::Long, None)
            }
            T::Float => derived(built_in_type, PrimitiveKind::Float, None),
            T::Double => derived(built_in_type, PrimitiveKind::Double, None),
            T::String | T::XmlElement | T::Number | T::Integer | T::UInteger => {
                derived(built_in_type, PrimitiveKind::String, None)
            }
            T::Guid => derived(built_in_type, PrimitiveKind::String, Some("uuid")),
            T::ByteString => derived(built_in_type, PrimitiveKind::Bytes, None),
            T::NodeId => {
                let fields = vec![
                    Field::new("Namespace", self.get(T::String)),
                    Field::new("Identifier", self.node_identifier()),
                ];
                record(built_in_type, fields)
            }
            T::ExpandedNodeId => {
                let fields = vec![
                    Field::new("Namespace", self.get(T::String)),
                    Field::new("Identifier", self.node_identifier()),
                    Field::new("ServerUri", self.get(T::String)),
                ];
                record(built_in_type, fields)
            }
            T::QualifiedName => {
                let fields = vec![
                    Field::new("Namespace", self.get(T::String)),
                    Field::new("Name", self.get(T::String)),
                ];
                record(built_in_type, fields)
            }
            T::LocalizedText => {
                let fields = vec![
                    Field::new("Locale", self.get(T::String)),
                    Field::new("Text", self.get(T::String)),
                ];
                record(built_in_type, fields)
            }
            T::ExtensionObject => {
                let encoding = Arc::new(SchemaNode::Enum(EnumSchema {
                    name: Name::new("ExtensionObjectEncoding", Some(BUILT_IN_NAMESPACE)),
                    aliases: Vec::new(),
                    symbols: ["Structure", "ByteString", "XmlElement"].map(String::from).to_vec(),
                    data_type_id: None,
                }));
                let body = Arc::new(SchemaNode::Union(vec![
                    self.get(T::Null),
                    self.get(T::String),
                    self.get(T::XmlElement),
                    self.get(T::ByteString),
                ]));
                let fields = vec![
                    Field::new("TypeId", self.get(T::NodeId)),
                    Field::new("Encoding", encoding),
                    Field::new("Body", body),
                ];
                record(built_in_type, fields)
            }
            T::DataValue => {
                let fields = vec![
                    Field::new("Value", self.get(T::Variant)),
                    Field::new("StatusCode", self.get(T::StatusCode)),
                    Field::new("SourceTimestamp", self.get(T::DateTime)),
                    Field::new("SourcePicoseconds", self.get(T::UInt16)),
                    Field::new("ServerTimestamp", self.get(T::DateTime)),
                    Field::new("ServerPicoseconds", self.get(T::UInt16)),
                ];
                record(built_in_type, fields)
            }
            T::Variant => {
                let branches: Vec<Schema> = variant_branches()
                    .map(|b| {
                        if b.is_array {
                            self.array_of(b.built_in_type)
                        } else {
                            self.get(b.built_in_type)
                        }
                    })
                    .collect();
                let fields = vec![
                    Field::new("Type", self.get(T::Byte)),
                    Field::new("Body", Arc::new(SchemaNode::Union(branches))),
                    Field::new("Dimensions", self.array_of(T::UInt32)),
                ];
                record(built_in_type, fields)
            }
            T::DiagnosticInfo => {
                let int32 = self.get(T::Int32);
                let string = self.get(T::String);
                let status = self.get(T::StatusCode);
                let null = self.get(T::Null);
                Arc::new_cyclic(|this| {
                    let inner = SchemaRef::new(built_in_name(built_in_type), this.clone());
                    let fields = vec![
                        Field::new("SymbolicId", int32.clone()),
                        Field::new("NamespaceUri", int32.clone()),
                        Field::new("Locale", int32.clone()),
                        Field::new("LocalizedText", int32),
                        Field::new("AdditionalInfo", string),
                        Field::new("InnerStatusCode", status),
                        Field::new(
                            "InnerDiagnosticInfo",
                            Arc::new(SchemaNode::Union(vec![
                                null,
                                Arc::new(SchemaNode::Reference(inner)),
                            ])),
                        ),
                    ];
                    SchemaNode::Record(record_node(built_in_type, fields))
                })
            }
        }
    }

    fn node_identifier(&mut self) -> Schema {
        Arc::new(SchemaNode::Union(vec![
            self.get(BuiltInType::UInt32),
            self.get(BuiltInType::String),
            self.get(BuiltInType::Guid),
            self.get(BuiltInType::ByteString),
        ]))
    }
}

fn built_in_name(built_in_type: BuiltInType) -> Name {
    Name::new(built_in_type.name(), Some(BUILT_IN_NAMESPACE))
}

fn data_type_id(built_in_type: BuiltInType) -> String {
    format!("i={}", built_in_type.id())
}

fn derived(built_in_type: BuiltInType, base: PrimitiveKind, logical_type: Option<&str>) -> Schema {
    Arc::new(SchemaNode::Derived(DerivedSchema {
        name: built_in_name(built_in_type),
        aliases: Vec::new(),
        base,
        data_type_id: Some(data_type_id(built_in_type)),
        logical_type: logical_type.map(str::to_string),
    }))
}

fn record_node(built_in_type: BuiltInType, fields: Vec<Field>) -> RecordSchema {
    RecordSchema::assemble(built_in_name(built_in_type), fields)
        .with_data_type_id(data_type_id(built_in_type))
}

fn record(built_in_type: BuiltInType, fields: Vec<Field>) -> Schema {
    Arc::new(SchemaNode::Record(record_node(built_in_type, fields)))
}
