//! Schema text representation.
//!
//! Schemas are written in the standard schema-definition JSON grammar. Named types are
//! defined at their first occurrence and referenced by full name afterwards, which is also
//! how self-referential records are expressed. Every named node may carry a `dataTypeId`
//! property holding the domain type identifier it was compiled from.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use serde_json::{Map, Value, json};
use tracing::debug;

use super::node::{
    DerivedSchema, EnumSchema, Field, FixedSchema, Name, PrimitiveKind, RecordSchema, Schema,
    SchemaNode, SchemaRef,
};
use crate::{CodecError, Result};

/// Property carrying the originating domain type identifier.
pub const DATA_TYPE_ID_PROPERTY: &str = "dataTypeId";

/// Render a schema as a JSON value.
pub fn to_json(schema: &SchemaNode) -> Value {
    Writer::default().write(schema)
}

/// Render a schema as compact JSON text.
pub fn to_json_string(schema: &SchemaNode) -> String {
    to_json(schema).to_string()
}

/// Parse schema JSON text into a schema tree.
pub fn parse(text: &str) -> Result<Schema> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CodecError::schema("schema JSON", format!("invalid JSON: {e}")))?;
    let schema = Parser::default().parse(&value, None)?;
    debug!(schema = %schema.full_name(), "parsed schema JSON");
    Ok(schema)
}

#[derive(Default)]
struct Writer {
    defined: HashSet<String>,
}

impl Writer {
    fn write(&mut self, node: &SchemaNode) -> Value {
        if let Some(name) = node.name() {
            let full_name = name.full_name();
            if matches!(node, SchemaNode::Reference(_)) || !self.defined.insert(full_name.clone()) {
                return Value::String(full_name);
            }
        }

        match node {
            SchemaNode::Fixed(fixed) => {
                let mut object = named_object("fixed", &fixed.name, &fixed.aliases, &fixed.data_type_id);
                object.insert("size".into(), json!(fixed.size));
                Value::Object(object)
            }
            SchemaNode::Enum(e) => {
                let mut object = named_object("enum", &e.name, &e.aliases, &e.data_type_id);
                object.insert("symbols".into(), json!(e.symbols));
                Value::Object(object)
            }
            SchemaNode::Derived(d) => {
                let mut object = named_object(d.base.type_name(), &d.name, &d.aliases, &d.data_type_id);
                if let Some(logical_type) = &d.logical_type {
                    object.insert("logicalType".into(), json!(logical_type));
                }
                Value::Object(object)
            }
            SchemaNode::Record(record) => {
                let mut object =
                    named_object("record", &record.name, &record.aliases, &record.data_type_id);
                let fields: Vec<Value> = record.fields().iter().map(|f| self.write_field(f)).collect();
                object.insert("fields".into(), Value::Array(fields));
                Value::Object(object)
            }
            SchemaNode::Array(item) => json!({ "type": "array", "items": self.write(item) }),
            SchemaNode::Union(branches) => {
                Value::Array(branches.iter().map(|b| self.write(b)).collect())
            }
            primitive => Value::String(primitive.type_name().to_string()),
        }
    }

    fn write_field(&mut self, field: &Field) -> Value {
        let mut object = Map::new();
        object.insert("name".into(), json!(field.name));
        object.insert("type".into(), self.write(&field.schema));
        if !field.aliases.is_empty() {
            object.insert("aliases".into(), json!(field.aliases));
        }
        Value::Object(object)
    }
}

fn named_object(
    type_name: &str,
    name: &Name,
    aliases: &[String],
    data_type_id: &Option<String>,
) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert("type".into(), json!(type_name));
    object.insert("name".into(), json!(name.name));
    if let Some(namespace) = &name.namespace {
        object.insert("namespace".into(), json!(namespace));
    }
    if !aliases.is_empty() {
        object.insert("aliases".into(), json!(aliases));
    }
    if let Some(id) = data_type_id {
        object.insert(DATA_TYPE_ID_PROPERTY.into(), json!(id));
    }
    object
}

#[derive(Default)]
struct Parser {
    named: HashMap<String, Schema>,
    pending: HashMap<String, Weak<SchemaNode>>,
}

impl Parser {
    fn parse(&mut self, value: &Value, namespace: Option<&str>) -> Result<Schema> {
        match value {
            Value::String(type_name) => self.parse_reference(type_name, namespace),
            Value::Array(branches) => {
                let branches = branches
                    .iter()
                    .map(|b| self.parse(b, namespace))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(SchemaNode::Union(branches)))
            }
            Value::Object(object) => self.parse_object(object, namespace),
            other => Err(invalid(format!("unexpected schema value {other}"))),
        }
    }

    fn parse_reference(&mut self, type_name: &str, namespace: Option<&str>) -> Result<Schema> {
        if let Some(kind) = PrimitiveKind::from_type_name(type_name) {
            return Ok(Arc::new(kind.node()));
        }
        let candidates = match namespace {
            Some(ns) if !type_name.contains('.') => vec![format!("{ns}.{type_name}"), type_name.to_string()],
            _ => vec![type_name.to_string()],
        };
        for full_name in &candidates {
            if let Some(schema) = self.named.get(full_name) {
                return Ok(schema.clone());
            }
            if let Some(target) = self.pending.get(full_name) {
                let reference = SchemaRef::new(Name::parse(full_name), target.clone());
                return Ok(Arc::new(SchemaNode::Reference(reference)));
            }
        }
        Err(invalid(format!("unknown type '{type_name}'")))
    }

    fn parse_object(&mut self, object: &Map<String, Value>, namespace: Option<&str>) -> Result<Schema> {
        let type_value = object.get("type").ok_or_else(|| invalid("schema object without 'type'"))?;
        let type_name = match type_value {
            Value::String(type_name) => type_name.as_str(),
            nested => return self.parse(nested, namespace),
        };

        match type_name {
            "record" | "error" => self.parse_record(object, namespace),
            "enum" => {
                let name = self.declare_name(object, namespace)?;
                let symbols = object
                    .get("symbols")
                    .and_then(Value::as_array)
                    .ok_or_else(|| invalid(format!("enum {name} without symbols")))?
                    .iter()
                    .map(|s| s.as_str().map(str::to_string).ok_or_else(|| invalid("non-string enum symbol")))
                    .collect::<Result<Vec<_>>>()?;
                let node = SchemaNode::Enum(EnumSchema {
                    aliases: aliases(object),
                    data_type_id: data_type_id(object),
                    name: name.clone(),
                    symbols,
                });
                Ok(self.publish(name, node))
            }
            "fixed" => {
                let name = self.declare_name(object, namespace)?;
                let size = object
                    .get("size")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| invalid(format!("fixed {name} without size")))?;
                let node = SchemaNode::Fixed(FixedSchema {
                    aliases: aliases(object),
                    data_type_id: data_type_id(object),
                    name: name.clone(),
                    size: size as usize,
                });
                Ok(self.publish(name, node))
            }
            "array" => {
                let items = object.get("items").ok_or_else(|| invalid("array without items"))?;
                Ok(Arc::new(SchemaNode::Array(self.parse(items, namespace)?)))
            }
            "map" => Err(invalid("map schemas are not supported")),
            other => match PrimitiveKind::from_type_name(other) {
                Some(kind) if object.contains_key("name") => {
                    let name = self.declare_name(object, namespace)?;
                    let node = SchemaNode::Derived(DerivedSchema {
                        aliases: aliases(object),
                        data_type_id: data_type_id(object),
                        logical_type: object.get("logicalType").and_then(Value::as_str).map(str::to_string),
                        name: name.clone(),
                        base: kind,
                    });
                    Ok(self.publish(name, node))
                }
                Some(kind) => Ok(Arc::new(kind.node())),
                None => self.parse_reference(other, namespace),
            },
        }
    }

    fn parse_record(&mut self, object: &Map<String, Value>, namespace: Option<&str>) -> Result<Schema> {
        let name = self.declare_name(object, namespace)?;
        let full_name = name.full_name();
        let fields = object
            .get("fields")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(format!("record {full_name} without fields")))?;

        let mut failure = None;
        let node = Arc::new_cyclic(|this| {
            self.pending.insert(full_name.clone(), this.clone());
            let built = self
                .parse_fields(fields, name.namespace.as_deref())
                .and_then(|fields| RecordSchema::new(name.clone(), fields));
            match built {
                Ok(mut record) => {
                    record.aliases = aliases(object);
                    record.data_type_id = data_type_id(object);
                    SchemaNode::Record(record)
                }
                Err(e) => {
                    failure = Some(e);
                    SchemaNode::Null
                }
            }
        });
        self.pending.remove(&full_name);
        if let Some(e) = failure {
            return Err(e);
        }
        self.named.insert(full_name, node.clone());
        Ok(node)
    }

    fn parse_fields(&mut self, fields: &[Value], namespace: Option<&str>) -> Result<Vec<Field>> {
        fields
            .iter()
            .map(|field| {
                let object = field.as_object().ok_or_else(|| invalid("record field is not an object"))?;
                let name = object
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("record field without name"))?;
                let schema_value =
                    object.get("type").ok_or_else(|| invalid(format!("field '{name}' without type")))?;
                let schema = self.parse(schema_value, namespace)?;
                Ok(Field::new(name, schema).with_aliases(aliases(object)))
            })
            .collect()
    }

    fn declare_name(&self, object: &Map<String, Value>, namespace: Option<&str>) -> Result<Name> {
        let raw = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("named schema without name"))?;
        let name = if raw.contains('.') {
            Name::parse(raw)
        } else {
            let declared = object.get("namespace").and_then(Value::as_str);
            Name::new(raw, declared.or(namespace))
        };
        let full_name = name.full_name();
        if self.named.contains_key(&full_name) || self.pending.contains_key(&full_name) {
            return Err(invalid(format!("type '{full_name}' is defined twice")));
        }
        Ok(name)
    }

    fn publish(&mut self, name: Name, node: SchemaNode) -> Schema {
        let schema = Arc::new(node);
        self.named.insert(name.full_name(), schema.clone());
        schema
    }
}

fn aliases(object: &Map<String, Value>) -> Vec<String> {
    object
        .get("aliases")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn data_type_id(object: &Map<String, Value>) -> Option<String> {
    object.get(DATA_TYPE_ID_PROPERTY).and_then(Value::as_str).map(str::to_string)
}

fn invalid(details: impl Into<String>) -> CodecError {
    CodecError::schema("schema JSON", details)
}
