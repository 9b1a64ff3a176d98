//! Schema Trees & Compilation
//!
//! This module provides the immutable schema tree the codec validates against, and the
//! compiler that derives it from domain type descriptions.
//!
//! # Architecture
//!
//! The schema system follows a layered approach:
//! - The node model ([`SchemaNode`], [`Field`], [`RecordSchema`]) is plain data shared via `Arc`
//! - Naming escapes domain names into the schema symbol alphabet and URIs into namespaces
//! - The built-in registry derives one schema per built-in type, per registry instance
//! - The builder compiles structures, enums and simple types with memoized resolution
//! - Data set compilation turns published metadata into message record schemas
//! - The JSON layer writes and parses the schema definition text
//!
//! # Example
//!
//! ```rust
//! use opcua_avro::schema::{DataSetMetadata, FieldMetadata, SchemaBuilder, to_json_string};
//! use opcua_avro::types::{BuiltInType, FieldContent};
//!
//! let metadata = DataSetMetadata::new(Some("Boiler"))
//!     .with_field(FieldMetadata::built_in("Temperature", BuiltInType::Double));
//! let schema = SchemaBuilder::new().compile_data_set(&metadata, FieldContent::RawData).unwrap();
//!
//! assert_eq!(schema.full_name(), "Boiler");
//! assert!(to_json_string(&schema).contains("\"dataTypeId\":\"i=11\""));
//! ```

mod builder;
mod builtins;
mod data_set;
mod json;
mod naming;
mod node;

pub use builder::{
    EnumDescription, SchemaBuilder, SimpleTypeDescription, StructureDescription, StructureFieldDescription,
    TypeDescription, VALUE_RANK_ANY, VALUE_RANK_ONE_DIMENSION, VALUE_RANK_ONE_OR_MORE_DIMENSIONS,
    VALUE_RANK_SCALAR, VALUE_RANK_SCALAR_OR_ONE_DIMENSION, data_type_of,
};
pub use builtins::{BuiltInSchemas, VariantBranch, identify, variant_branch, variant_branch_index, variant_branches};
pub use data_set::{DEFAULT_DATA_SET_NAME, DataSetMetadata, FieldMetadata, is_data_value_record};
pub use json::{DATA_TYPE_ID_PROPERTY, parse, to_json, to_json_string};
pub use naming::{BUILT_IN_NAMESPACE, escape_symbol, namespace_from_uri, type_name};
pub use node::{
    DerivedSchema, EnumSchema, Field, FixedSchema, Name, PrimitiveKind, RecordSchema, Schema, SchemaNode,
    SchemaRef, nullable, resolve,
};
