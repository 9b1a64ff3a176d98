//! Extension objects and decoded structures

use serde::{Deserialize, Serialize};

use super::{NodeId, Variant};

/// Payload of an [`ExtensionObject`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ExtensionObjectBody {
    #[default]
    None,
    /// Structure serialized as JSON text
    Json(String),
    Xml(String),
    Binary(Vec<u8>),
    /// Structure decoded field by field against its record schema
    Structure(Structure),
}

/// An opaque typed payload plus the identifier of its data type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionObject {
    pub type_id: NodeId,
    pub body: ExtensionObjectBody,
}

impl ExtensionObject {
    pub fn new(type_id: NodeId, body: ExtensionObjectBody) -> Self {
        Self { type_id, body }
    }

    pub fn structure(type_id: NodeId, structure: Structure) -> Self {
        Self { type_id, body: ExtensionObjectBody::Structure(structure) }
    }
}

/// One named member of a [`Structure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureField {
    pub name: String,
    pub value: Variant,
}

/// Field values of a structured type in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub fields: Vec<StructureField>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Variant>) -> Self {
        self.fields.push(StructureField { name: name.into(), value: value.into() });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Variant> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}
