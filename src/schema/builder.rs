//! Schema compilation from domain type descriptions.
//!
//! A [`SchemaBuilder`] owns a registry of type descriptions keyed by data type id and compiles
//! them on demand. Resolution is depth-first and memoized: every type id compiles at most once
//! per builder, and built-in ids map onto the builder's own [`BuiltInSchemas`].
//!
//! Structures may refer to themselves directly or through other structures. While a structure
//! is being built its cell holds a weak handle to the node under construction, so re-entrant
//! lookups receive a [`SchemaNode::Reference`] instead of recursing. If any part of a top-level
//! resolution fails, every cell published during that resolution is discarded again.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::builtins::BuiltInSchemas;
use super::naming::{escape_symbol, namespace_from_uri, type_name};
use super::node::{
    DerivedSchema, EnumSchema, Field, Name, PrimitiveKind, RecordSchema, Schema, SchemaNode, SchemaRef,
    nullable,
};
use crate::types::{BuiltInType, NodeId};
use crate::{CodecError, Result};

/// The value is a scalar or a one-dimensional array.
pub const VALUE_RANK_SCALAR_OR_ONE_DIMENSION: i32 = -3;
/// The value may have any shape.
pub const VALUE_RANK_ANY: i32 = -2;
/// The value is a scalar.
pub const VALUE_RANK_SCALAR: i32 = -1;
/// The value is an array with one or more dimensions.
pub const VALUE_RANK_ONE_OR_MORE_DIMENSIONS: i32 = 0;
/// The value is a one-dimensional array.
pub const VALUE_RANK_ONE_DIMENSION: i32 = 1;

pub(crate) fn scalar_rank() -> i32 {
    VALUE_RANK_SCALAR
}

/// Description of a domain data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypeDescription {
    Simple(SimpleTypeDescription),
    Structure(StructureDescription),
    Enum(EnumDescription),
}

impl TypeDescription {
    pub fn data_type_id(&self) -> &NodeId {
        match self {
            TypeDescription::Simple(d) => &d.data_type_id,
            TypeDescription::Structure(d) => &d.data_type_id,
            TypeDescription::Enum(d) => &d.data_type_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypeDescription::Simple(d) => &d.name,
            TypeDescription::Structure(d) => &d.name,
            TypeDescription::Enum(d) => &d.name,
        }
    }
}

/// A type that aliases or derives from another type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleTypeDescription {
    pub data_type_id: NodeId,
    pub name: String,
    /// Type this one derives from; takes precedence over `built_in_type`
    #[serde(default)]
    pub base_data_type: Option<NodeId>,
    #[serde(default)]
    pub built_in_type: Option<BuiltInType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDescription {
    pub data_type_id: NodeId,
    pub name: String,
    pub fields: Vec<StructureFieldDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureFieldDescription {
    pub name: String,
    pub data_type: NodeId,
    #[serde(default = "scalar_rank")]
    pub value_rank: i32,
    #[serde(default)]
    pub array_dimensions: Vec<u32>,
}

impl StructureFieldDescription {
    pub fn scalar(name: impl Into<String>, data_type: NodeId) -> Self {
        Self { name: name.into(), data_type, value_rank: VALUE_RANK_SCALAR, array_dimensions: Vec::new() }
    }

    pub fn with_rank(mut self, value_rank: i32) -> Self {
        self.value_rank = value_rank;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumDescription {
    pub data_type_id: NodeId,
    pub name: String,
    pub symbols: Vec<String>,
    /// Option sets are bit masks and encode as their numeric value
    #[serde(default)]
    pub is_option_set: bool,
}

/// Something published during the current top-level resolution.
#[derive(Debug)]
enum Published {
    Type(NodeId),
    Shape(String),
}

/// Compiles type descriptions into schema trees.
///
/// A builder serves one compilation task at a time; the schemas it hands out are immutable and
/// can be shared freely.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    descriptions: HashMap<NodeId, TypeDescription>,
    resolved: HashMap<NodeId, Schema>,
    in_progress: HashMap<NodeId, (Name, Weak<SchemaNode>)>,
    names: HashMap<String, NodeId>,
    shapes: HashMap<String, Schema>,
    built_ins: BuiltInSchemas,
    journal: Vec<Published>,
    depth: usize,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preloaded with type descriptions.
    pub fn with_types(types: impl IntoIterator<Item = TypeDescription>) -> Self {
        let mut builder = Self::new();
        builder.add_types(types);
        builder
    }

    /// Register a type description. The first description registered for an id wins.
    pub fn add_type(&mut self, description: TypeDescription) {
        let id = description.data_type_id().clone();
        if self.descriptions.contains_key(&id) {
            debug!(data_type = %id, "type already registered");
            return;
        }
        self.descriptions.insert(id, description);
    }

    pub fn add_types(&mut self, types: impl IntoIterator<Item = TypeDescription>) {
        for description in types {
            self.add_type(description);
        }
    }

    pub fn description(&self, data_type_id: &NodeId) -> Option<&TypeDescription> {
        self.descriptions.get(data_type_id)
    }

    pub fn built_ins(&mut self) -> &mut BuiltInSchemas {
        &mut self.built_ins
    }

    /// Type id a compiled schema name was published under.
    pub fn lookup_type(&self, full_name: &str) -> Option<&NodeId> {
        self.names.get(full_name)
    }

    /// Schema for a data type id, compiling it and its dependencies on first use.
    ///
    /// Back-references inside a cycle are weak. A type taken out on its own keeps them alive
    /// only while this builder or a data set schema that reaches it does; data set schemas
    /// anchor every cycle they contain.
    pub fn resolve(&mut self, data_type_id: &NodeId) -> Result<Schema> {
        self.depth += 1;
        let result = self.resolve_type(data_type_id);
        self.depth -= 1;
        if self.depth == 0 {
            match &result {
                Ok(_) => self.journal.clear(),
                Err(e) => {
                    warn!(data_type = %data_type_id, error = %e, "schema compilation failed, rolling back");
                    self.rollback();
                }
            }
        }
        result
    }

    /// Schema of a value of `data_type` with the given rank and dimensions.
    ///
    /// Scalars use the type schema, ranks 0 and 1 an array of it, higher ranks a matrix record
    /// and ranks below scalar the Variant schema. Non-empty dimensions override the rank.
    pub fn field_schema(&mut self, data_type: &NodeId, value_rank: i32, dimensions: &[u32]) -> Result<Schema> {
        let rank = if dimensions.is_empty() { value_rank } else { dimensions.len() as i32 };
        if rank < VALUE_RANK_SCALAR {
            return Ok(self.built_ins.get(BuiltInType::Variant));
        }
        let element = self.resolve(data_type)?;
        match rank {
            VALUE_RANK_SCALAR => Ok(element),
            VALUE_RANK_ONE_OR_MORE_DIMENSIONS | VALUE_RANK_ONE_DIMENSION => {
                Ok(Arc::new(SchemaNode::Array(element)))
            }
            _ => self.matrix_of(element),
        }
    }

    /// `<Name>Matrix` record of flattened elements plus their dimensions.
    pub fn matrix_of(&mut self, element: Schema) -> Result<Schema> {
        let name = Name::new(format!("{}Matrix", shape_name(&element)), namespace_of(&element));
        let dimensions = self.built_ins.array_of(BuiltInType::UInt32);
        let fields = vec![
            Field::new("Dimensions", dimensions),
            Field::new("Body", Arc::new(SchemaNode::Array(element.clone()))),
        ];
        self.shape(name, element, fields)
    }

    /// `<Name>DataValue` record carrying a value of `value_schema` with status and timestamps.
    pub fn data_value_record(&mut self, value_schema: Schema) -> Result<Schema> {
        let name = Name::new(format!("{}DataValue", shape_name(&value_schema)), None);
        let fields = vec![
            Field::new("Value", nullable(value_schema.clone())),
            Field::new("StatusCode", self.built_ins.get(BuiltInType::StatusCode)),
            Field::new("SourceTimestamp", self.built_ins.get(BuiltInType::DateTime)),
            Field::new("SourcePicoseconds", self.built_ins.get(BuiltInType::UInt16)),
            Field::new("ServerTimestamp", self.built_ins.get(BuiltInType::DateTime)),
            Field::new("ServerPicoseconds", self.built_ins.get(BuiltInType::UInt16)),
        ];
        self.shape(name, value_schema, fields)
    }

    /// Memoized helper record around `inner`. Two different inner types may not share a name.
    fn shape(&mut self, name: Name, inner: Schema, fields: Vec<Field>) -> Result<Schema> {
        let full_name = name.full_name();
        if let Some(existing) = self.shapes.get(&full_name) {
            let wraps_same = existing
                .as_record()
                .and_then(|r| r.fields().iter().find(|f| f.name == "Body" || f.name == "Value"))
                .is_some_and(|f| match f.schema.as_ref() {
                    SchemaNode::Array(item) => item.same_type(&inner),
                    SchemaNode::Union(branches) => branches.last().is_some_and(|b| b.same_type(&inner)),
                    _ => false,
                });
            if !wraps_same {
                return Err(CodecError::schema(
                    format!("record {full_name}"),
                    format!("name is already used for a different value type than {}", inner.full_name()),
                ));
            }
            return Ok(existing.clone());
        }
        let schema = Arc::new(SchemaNode::Record(RecordSchema::assemble(name, fields)));
        self.shapes.insert(full_name.clone(), schema.clone());
        if self.depth > 0 {
            self.journal.push(Published::Shape(full_name));
        }
        Ok(schema)
    }

    fn resolve_type(&mut self, data_type_id: &NodeId) -> Result<Schema> {
        if let Some(built_in) = data_type_id.built_in_id().and_then(BuiltInType::from_id) {
            return Ok(self.built_ins.get(built_in));
        }
        if let Some(schema) = self.resolved.get(data_type_id) {
            return Ok(schema.clone());
        }
        if let Some((name, target)) = self.in_progress.get(data_type_id) {
            let reference = SchemaRef::new(name.clone(), target.clone());
            return Ok(Arc::new(SchemaNode::Reference(reference)));
        }

        let description = self.descriptions.get(data_type_id).cloned().ok_or_else(|| {
            CodecError::schema(format!("type {data_type_id}"), "no description registered and not a built-in type")
        })?;
        let name = Name::new(
            type_name(data_type_id, description.name()),
            Some(&namespace_from_uri(&data_type_id.namespace_uri)),
        );
        self.claim_name(&name, data_type_id)?;

        let schema = match &description {
            TypeDescription::Simple(simple) => self.build_simple(name, data_type_id, simple)?,
            TypeDescription::Enum(e) => build_enum(name, data_type_id, e)?,
            TypeDescription::Structure(structure) => self.build_structure(name, data_type_id, structure)?,
        };
        debug!(data_type = %data_type_id, schema = %schema.full_name(), "compiled type");
        self.resolved.insert(data_type_id.clone(), schema.clone());
        Ok(schema)
    }

    fn claim_name(&mut self, name: &Name, data_type_id: &NodeId) -> Result<()> {
        let full_name = name.full_name();
        if let Some(owner) = self.names.get(&full_name) {
            if owner != data_type_id {
                return Err(CodecError::schema(
                    format!("type {data_type_id}"),
                    format!("schema name {full_name} is already used by type {owner}"),
                ));
            }
        }
        self.names.insert(full_name, data_type_id.clone());
        self.journal.push(Published::Type(data_type_id.clone()));
        Ok(())
    }

    fn build_simple(&mut self, name: Name, data_type_id: &NodeId, simple: &SimpleTypeDescription) -> Result<Schema> {
        let base = match &simple.base_data_type {
            Some(base) => self.resolve(base)?,
            None => self.built_ins.get(simple.built_in_type.unwrap_or(BuiltInType::String)),
        };
        if matches!(base.as_ref(), SchemaNode::Reference(_)) {
            return Err(CodecError::schema(format!("type {data_type_id}"), "simple type derives from itself"));
        }
        match base.primitive_kind() {
            Some(kind) if !base.is_null() => {
                let logical_type = match base.as_ref() {
                    SchemaNode::Derived(d) => d.logical_type.clone(),
                    _ => None,
                };
                Ok(Arc::new(SchemaNode::Derived(DerivedSchema {
                    name,
                    aliases: Vec::new(),
                    base: kind,
                    data_type_id: Some(data_type_id.to_string()),
                    logical_type,
                })))
            }
            // Composite bases keep their own identity
            _ => Ok(base),
        }
    }

    fn build_structure(&mut self, name: Name, data_type_id: &NodeId, structure: &StructureDescription) -> Result<Schema> {
        let mut failure = None;
        let schema = Arc::new_cyclic(|this| {
            self.in_progress.insert(data_type_id.clone(), (name.clone(), this.clone()));
            let built = self
                .structure_fields(structure)
                .and_then(|fields| RecordSchema::new(name.clone(), fields));
            match built {
                Ok(record) => SchemaNode::Record(record.with_data_type_id(data_type_id.to_string())),
                Err(e) => {
                    failure = Some(e);
                    SchemaNode::Null
                }
            }
        });
        self.in_progress.remove(data_type_id);
        match failure {
            Some(e) => Err(e),
            None => Ok(schema),
        }
    }

    fn structure_fields(&mut self, structure: &StructureDescription) -> Result<Vec<Field>> {
        structure
            .fields
            .iter()
            .map(|field| {
                let schema = self.field_schema(&field.data_type, field.value_rank, &field.array_dimensions)?;
                Ok(escaped_field(&field.name, nullable(schema)))
            })
            .collect()
    }

    fn rollback(&mut self) {
        for published in self.journal.drain(..) {
            match published {
                Published::Type(id) => {
                    self.resolved.remove(&id);
                    self.names.retain(|_, owner| *owner != id);
                }
                Published::Shape(name) => {
                    self.shapes.remove(&name);
                }
            }
        }
        self.in_progress.clear();
    }
}

fn build_enum(name: Name, data_type_id: &NodeId, description: &EnumDescription) -> Result<Schema> {
    let context = || format!("enum {data_type_id}");
    if description.is_option_set {
        return Ok(Arc::new(SchemaNode::Derived(DerivedSchema {
            name,
            aliases: Vec::new(),
            base: PrimitiveKind::Long,
            data_type_id: Some(data_type_id.to_string()),
            logical_type: None,
        })));
    }
    if description.symbols.is_empty() {
        return Err(CodecError::schema(context(), "enumeration without symbols"));
    }
    let mut symbols: Vec<String> = Vec::with_capacity(description.symbols.len());
    for raw in &description.symbols {
        let symbol = escape_symbol(raw);
        if symbols.contains(&symbol) {
            return Err(CodecError::schema(context(), format!("symbol '{raw}' escapes to duplicate '{symbol}'")));
        }
        symbols.push(symbol);
    }
    Ok(Arc::new(SchemaNode::Enum(EnumSchema {
        name,
        aliases: Vec::new(),
        symbols,
        data_type_id: Some(data_type_id.to_string()),
    })))
}

/// Record field named by the escaped form of `raw`, keeping `raw` as alias when they differ.
pub(crate) fn escaped_field(raw: &str, schema: Schema) -> Field {
    let symbol = escape_symbol(raw);
    if symbol == raw {
        Field::new(symbol, schema)
    } else {
        warn!(field = raw, symbol = %symbol, "field name escaped");
        Field::new(symbol, schema).with_aliases(vec![raw.to_string()])
    }
}

/// Type id recorded on a compiled schema node.
pub fn data_type_of(schema: &SchemaNode) -> Option<NodeId> {
    schema.data_type_id()?.parse().ok()
}

fn shape_name(schema: &SchemaNode) -> String {
    match schema {
        SchemaNode::Array(item) => format!("{}Array", shape_name(item)),
        SchemaNode::Union(branches) => match branches.iter().find(|b| !b.is_null()) {
            Some(branch) if branches.len() == 2 => shape_name(branch),
            _ => "Union".to_string(),
        },
        node => match node.name() {
            Some(name) => name.name.clone(),
            None => escape_symbol(node.type_name()),
        },
    }
}

fn namespace_of(schema: &SchemaNode) -> Option<&str> {
    match schema {
        SchemaNode::Array(item) => namespace_of(item),
        node => node.name().and_then(|n| n.namespace.as_deref()),
    }
}
