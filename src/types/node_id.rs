//! Node identifiers and qualified names

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CodecError, Result};

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
    Opaque(Vec<u8>),
}

/// A node identifier qualified by its namespace URI.
///
/// An empty namespace URI denotes the base namespace. Text forms are `i=6` for the base
/// namespace and `nsu=http://example.org/UA/;s=Motor` otherwise. Serialized as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace_uri: String,
    pub identifier: Identifier,
}

impl NodeId {
    pub fn numeric(namespace_uri: impl Into<String>, id: u32) -> Self {
        Self { namespace_uri: namespace_uri.into(), identifier: Identifier::Numeric(id) }
    }

    pub fn string(namespace_uri: impl Into<String>, id: impl Into<String>) -> Self {
        Self { namespace_uri: namespace_uri.into(), identifier: Identifier::String(id.into()) }
    }

    /// The null node id, `i=0`.
    pub fn null() -> Self {
        Self::numeric("", 0)
    }

    pub fn is_null(&self) -> bool {
        self.namespace_uri.is_empty() && self.identifier == Identifier::Numeric(0)
    }

    /// Built-in type id when this node names one of the base data types `i=0` to `i=29`.
    pub fn built_in_id(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(id) if self.namespace_uri.is_empty() && id <= 29 => Some(id),
            _ => None,
        }
    }

    /// Prefix used when the identifier becomes part of a schema name.
    pub fn kind_prefix(&self) -> &'static str {
        match self.identifier {
            Identifier::Numeric(_) => "i",
            Identifier::String(_) => "s",
            Identifier::Guid(_) => "g",
            Identifier::Opaque(_) => "b",
        }
    }

    /// Identifier text without the kind prefix.
    pub fn identifier_text(&self) -> String {
        match &self.identifier {
            Identifier::Numeric(id) => id.to_string(),
            Identifier::String(s) => s.clone(),
            Identifier::Guid(g) => g.to_string(),
            Identifier::Opaque(b) => STANDARD.encode(b),
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace_uri.is_empty() {
            write!(f, "nsu={};", self.namespace_uri)?;
        }
        write!(f, "{}={}", self.kind_prefix(), self.identifier_text())
    }
}

impl FromStr for NodeId {
    type Err = CodecError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = |details: &str| CodecError::schema("NodeId parsing", format!("{details}: '{text}'"));

        let (namespace_uri, rest) = match text.strip_prefix("nsu=") {
            Some(tail) => {
                let split = tail.find(';').ok_or_else(|| invalid("missing identifier"))?;
                (tail[..split].to_string(), &tail[split + 1..])
            }
            None => match text.strip_prefix("ns=0;") {
                Some(tail) => (String::new(), tail),
                None if text.starts_with("ns=") => {
                    return Err(invalid("namespace indexes need a namespace table"));
                }
                None => (String::new(), text),
            },
        };

        let (kind, value) = rest.split_once('=').ok_or_else(|| invalid("missing identifier kind"))?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| invalid("invalid numeric id"))?),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(Uuid::parse_str(value).map_err(|_| invalid("invalid guid"))?),
            "b" => Identifier::Opaque(STANDARD.decode(value).map_err(|_| invalid("invalid base64"))?),
            _ => return Err(invalid("unknown identifier kind")),
        };
        Ok(NodeId { namespace_uri, identifier })
    }
}

impl TryFrom<String> for NodeId {
    type Error = CodecError;

    fn try_from(text: String) -> Result<Self> {
        text.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

/// A node id that may live on another server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    pub node_id: NodeId,
    pub server_uri: String,
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self { node_id, server_uri: String::new() }
    }
}

/// A name qualified by the namespace that defines it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace_uri: String,
    pub name: String,
}

/// Human readable text with an optional locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self { locale: locale.into(), text: text.into() }
    }
}
