//! Schema tree data model

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::{CodecError, Result, SchemaViolation};

/// Shared handle to an immutable schema node.
pub type Schema = Arc<SchemaNode>;

/// Wire kinds of the leaf schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
}

impl PrimitiveKind {
    pub const fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Null => "null",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Bytes => "bytes",
            PrimitiveKind::String => "string",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "null" => PrimitiveKind::Null,
            "boolean" => PrimitiveKind::Boolean,
            "int" => PrimitiveKind::Int,
            "long" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" => PrimitiveKind::Double,
            "bytes" => PrimitiveKind::Bytes,
            "string" => PrimitiveKind::String,
            _ => return None,
        })
    }

    pub const fn node(self) -> SchemaNode {
        match self {
            PrimitiveKind::Null => SchemaNode::Null,
            PrimitiveKind::Boolean => SchemaNode::Boolean,
            PrimitiveKind::Int => SchemaNode::Int,
            PrimitiveKind::Long => SchemaNode::Long,
            PrimitiveKind::Float => SchemaNode::Float,
            PrimitiveKind::Double => SchemaNode::Double,
            PrimitiveKind::Bytes => SchemaNode::Bytes,
            PrimitiveKind::String => SchemaNode::String,
        }
    }
}

/// A possibly namespaced schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    pub name: String,
    pub namespace: Option<String>,
}

impl Name {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self { name: name.into(), namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string) }
    }

    /// Split a dotted full name into namespace and simple name.
    pub fn parse(full_name: &str) -> Self {
        match full_name.rsplit_once('.') {
            Some((namespace, name)) => Self::new(name, Some(namespace)),
            None => Self::new(full_name, None),
        }
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Immutable schema node. Composite nodes share their children.
#[derive(Debug)]
pub enum SchemaNode {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Fixed(FixedSchema),
    Enum(EnumSchema),
    Array(Schema),
    Union(Vec<Schema>),
    Record(RecordSchema),
    /// A named primitive: encodes as `base` but carries its own type identity
    Derived(DerivedSchema),
    /// Back-reference to a named node that encloses it
    Reference(SchemaRef),
}

#[derive(Debug, Clone)]
pub struct FixedSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub size: usize,
    pub data_type_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub symbols: Vec<String>,
    pub data_type_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DerivedSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub base: PrimitiveKind,
    pub data_type_id: Option<String>,
    pub logical_type: Option<String>,
}

/// One field of a record.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub position: usize,
    pub aliases: Vec<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self { name: name.into(), schema, position: 0, aliases: Vec::new() }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Name callers know the field by: the first alias when the schema name is escaped.
    pub fn display_name(&self) -> &str {
        self.aliases.first().map_or(&self.name, String::as_str)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub name: Name,
    pub aliases: Vec<String>,
    pub data_type_id: Option<String>,
    fields: Vec<Field>,
    /// Strong handles on the targets of back-references reachable from this record
    anchors: Vec<Schema>,
}

impl RecordSchema {
    /// Create a record, numbering fields in order and rejecting duplicate names.
    pub fn new(name: Name, fields: Vec<Field>) -> Result<Self> {
        for (index, field) in fields.iter().enumerate() {
            if let Some(other) = fields[..index].iter().find(|f| f.name == field.name) {
                return Err(CodecError::schema(
                    format!("record {name}"),
                    format!(
                        "fields '{}' and '{}' share the symbol '{}'",
                        other.display_name(),
                        field.display_name(),
                        field.name
                    ),
                ));
            }
        }
        Ok(Self::assemble(name, fields))
    }

    /// Create a record from fields whose names are known to be distinct.
    pub(crate) fn assemble(name: Name, mut fields: Vec<Field>) -> Self {
        for (position, field) in fields.iter_mut().enumerate() {
            field.position = position;
        }
        Self { name, aliases: Vec::new(), data_type_id: None, fields, anchors: Vec::new() }
    }

    /// Keep every back-reference target reachable from the fields alive for as long as this
    /// record lives, so the record stays usable after its builder is gone.
    pub(crate) fn anchored(mut self) -> Self {
        let roots: Vec<Schema> = self.fields.iter().map(|f| f.schema.clone()).collect();
        self.anchors = cycle_targets(&roots);
        self
    }

    /// Back-reference targets this record keeps alive.
    pub fn anchors(&self) -> &[Schema] {
        &self.anchors
    }

    pub fn with_data_type_id(mut self, data_type_id: impl Into<String>) -> Self {
        self.data_type_id = Some(data_type_id.into());
        self
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Locate a field by exact name, then by alias.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.aliases.iter().any(|a| a == name)))
    }
}

/// Weak reference used to close cycles in the schema graph.
#[derive(Clone)]
pub struct SchemaRef {
    name: Name,
    target: Weak<SchemaNode>,
}

impl SchemaRef {
    pub fn new(name: Name, target: Weak<SchemaNode>) -> Self {
        Self { name, target }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn upgrade(&self) -> Option<Schema> {
        self.target.upgrade()
    }
}

impl fmt::Debug for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SchemaRef").field(&self.name.full_name()).finish()
    }
}

impl SchemaNode {
    /// Schema grammar keyword of this node.
    pub fn type_name(&self) -> &'static str {
        match self {
            SchemaNode::Null => "null",
            SchemaNode::Boolean => "boolean",
            SchemaNode::Int => "int",
            SchemaNode::Long => "long",
            SchemaNode::Float => "float",
            SchemaNode::Double => "double",
            SchemaNode::Bytes => "bytes",
            SchemaNode::String => "string",
            SchemaNode::Fixed(_) => "fixed",
            SchemaNode::Enum(_) => "enum",
            SchemaNode::Array(_) => "array",
            SchemaNode::Union(_) => "union",
            SchemaNode::Record(_) => "record",
            SchemaNode::Derived(derived) => derived.base.type_name(),
            SchemaNode::Reference(_) => "reference",
        }
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            SchemaNode::Fixed(s) => Some(&s.name),
            SchemaNode::Enum(s) => Some(&s.name),
            SchemaNode::Record(s) => Some(&s.name),
            SchemaNode::Derived(s) => Some(&s.name),
            SchemaNode::Reference(r) => Some(&r.name),
            _ => None,
        }
    }

    pub fn aliases(&self) -> &[String] {
        match self {
            SchemaNode::Fixed(s) => &s.aliases,
            SchemaNode::Enum(s) => &s.aliases,
            SchemaNode::Record(s) => &s.aliases,
            SchemaNode::Derived(s) => &s.aliases,
            _ => &[],
        }
    }

    /// Type identity used when validating operations against the schema.
    pub fn full_name(&self) -> String {
        match self {
            SchemaNode::Array(item) => format!("array<{}>", item.full_name()),
            SchemaNode::Union(branches) => {
                let names: Vec<String> = branches.iter().map(|b| b.full_name()).collect();
                format!("union<{}>", names.join(","))
            }
            node => match node.name() {
                Some(name) => name.full_name(),
                None => node.type_name().to_string(),
            },
        }
    }

    /// Whether two nodes declare the same type identity.
    pub fn same_type(&self, other: &SchemaNode) -> bool {
        match (self, other) {
            (SchemaNode::Array(a), SchemaNode::Array(b)) => a.same_type(b),
            (SchemaNode::Union(a), SchemaNode::Union(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_type(y))
            }
            (a, b) => match (a.name(), b.name()) {
                (Some(x), Some(y)) => x == y,
                (None, None) => a.type_name() == b.type_name(),
                _ => false,
            },
        }
    }

    /// Domain type identifier annotated on the node, if any. References answer `None`; resolve
    /// them first.
    pub fn data_type_id(&self) -> Option<&str> {
        match self {
            SchemaNode::Fixed(s) => s.data_type_id.as_deref(),
            SchemaNode::Enum(s) => s.data_type_id.as_deref(),
            SchemaNode::Record(s) => s.data_type_id.as_deref(),
            SchemaNode::Derived(s) => s.data_type_id.as_deref(),
            _ => None,
        }
    }

    /// Wire kind of a leaf node. `None` for fixed and composite nodes.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            SchemaNode::Null => PrimitiveKind::Null,
            SchemaNode::Boolean => PrimitiveKind::Boolean,
            SchemaNode::Int => PrimitiveKind::Int,
            SchemaNode::Long => PrimitiveKind::Long,
            SchemaNode::Float => PrimitiveKind::Float,
            SchemaNode::Double => PrimitiveKind::Double,
            SchemaNode::Bytes => PrimitiveKind::Bytes,
            SchemaNode::String => PrimitiveKind::String,
            SchemaNode::Derived(derived) => derived.base,
            _ => return None,
        })
    }

    /// Leaves are consumed by exactly one primitive operation.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            SchemaNode::Array(_) | SchemaNode::Union(_) | SchemaNode::Record(_) | SchemaNode::Reference(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SchemaNode::Null)
    }

    pub fn as_record(&self) -> Option<&RecordSchema> {
        match self {
            SchemaNode::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&[Schema]> {
        match self {
            SchemaNode::Union(branches) => Some(branches),
            _ => None,
        }
    }

    pub fn as_array_item(&self) -> Option<&Schema> {
        match self {
            SchemaNode::Array(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumSchema> {
        match self {
            SchemaNode::Enum(e) => Some(e),
            _ => None,
        }
    }
}

/// Follow a back-reference to the node it names.
pub fn resolve(schema: &Schema) -> Result<Schema, SchemaViolation> {
    match schema.as_ref() {
        SchemaNode::Reference(reference) => reference.upgrade().ok_or_else(|| {
            SchemaViolation::new(format!(
                "schema reference {} outlived its target",
                reference.name().full_name()
            ))
        }),
        _ => Ok(schema.clone()),
    }
}

/// Targets of every back-reference reachable from `roots`, each listed once.
pub(crate) fn cycle_targets(roots: &[Schema]) -> Vec<Schema> {
    let mut visited: HashSet<*const SchemaNode> = HashSet::new();
    let mut pending: Vec<Schema> = roots.to_vec();
    let mut targets: Vec<Schema> = Vec::new();
    while let Some(node) = pending.pop() {
        if !visited.insert(Arc::as_ptr(&node)) {
            continue;
        }
        match node.as_ref() {
            SchemaNode::Array(item) => pending.push(item.clone()),
            SchemaNode::Union(branches) => pending.extend(branches.iter().cloned()),
            SchemaNode::Record(record) => {
                pending.extend(record.fields.iter().map(|f| f.schema.clone()));
                pending.extend(record.anchors.iter().cloned());
            }
            SchemaNode::Reference(reference) => {
                if let Some(target) = reference.upgrade() {
                    if !targets.iter().any(|t| Arc::ptr_eq(t, &target)) {
                        targets.push(target.clone());
                    }
                    pending.push(target);
                }
            }
            _ => {}
        }
    }
    targets
}

/// Union of `null` and `schema`, the shape of an optional value.
pub fn nullable(schema: Schema) -> Schema {
    Arc::new(SchemaNode::Union(vec![Arc::new(SchemaNode::Null), schema]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32() -> Schema {
        Arc::new(SchemaNode::Derived(DerivedSchema {
            name: Name::new("Int32", Some("org.opcfoundation.ua")),
            aliases: vec![],
            base: PrimitiveKind::Int,
            data_type_id: Some("i=6".to_string()),
            logical_type: None,
        }))
    }

    #[test]
    fn names_split_on_last_dot() {
        let name = Name::parse("org.opcfoundation.ua.Int32");
        assert_eq!(name.name, "Int32");
        assert_eq!(name.namespace.as_deref(), Some("org.opcfoundation.ua"));
        assert_eq!(name.full_name(), "org.opcfoundation.ua.Int32");
        assert_eq!(Name::parse("Payload").namespace, None);
    }

    #[test]
    fn derived_identity_differs_from_base() {
        let derived = int32();
        assert_eq!(derived.full_name(), "org.opcfoundation.ua.Int32");
        assert_eq!(derived.primitive_kind(), Some(PrimitiveKind::Int));
        assert!(!derived.same_type(&SchemaNode::Int));
        assert!(derived.same_type(&int32()));
        assert_eq!(derived.data_type_id(), Some("i=6"));
    }

    #[test]
    fn duplicate_field_symbols_are_rejected() {
        let fields = vec![Field::new("a", int32()), Field::new("a", int32())];
        assert!(RecordSchema::new(Name::new("R", None), fields).is_err());
    }

    #[test]
    fn fields_are_found_by_alias() {
        let fields = vec![
            Field::new("a__46b", int32()).with_aliases(vec!["a.b".to_string()]),
            Field::new("c", int32()),
        ];
        let record = RecordSchema::new(Name::new("R", None), fields).unwrap();
        assert_eq!(record.field("a.b").map(|f| f.position), Some(0));
        assert_eq!(record.field("c").map(|f| f.position), Some(1));
        assert_eq!(record.fields()[0].display_name(), "a.b");
        assert!(record.field("d").is_none());
    }

    #[test]
    fn dangling_references_fail_to_resolve() {
        let reference = {
            let target = int32();
            Arc::new(SchemaNode::Reference(SchemaRef::new(
                Name::new("Int32", Some("org.opcfoundation.ua")),
                Arc::downgrade(&target),
            )))
        };
        assert!(resolve(&reference).is_err());
    }

    #[test]
    fn composite_identities_are_structural() {
        let array = Arc::new(SchemaNode::Array(int32()));
        assert_eq!(array.full_name(), "array<org.opcfoundation.ua.Int32>");
        let union = nullable(int32());
        assert_eq!(union.full_name(), "union<null,org.opcfoundation.ua.Int32>");
        assert!(union.same_type(&nullable(int32())));
    }
}
