//! Schema-validated Avro binary codec for OPC UA telemetry values.
//!
//! Every value written or read is checked against a compiled schema tree, so a message
//! produced here always matches the schema published next to it.
//!
//! # Features
//!
//! - **Binary primitives**: zig-zag varints, IEEE floats and length-prefixed bytes with limits
//! - **Schema compilation**: built-in types, structures, enums and data set messages
//! - **Validated codec**: a cursor over the schema drives every encode and decode call
//! - **Container files**: blocked, optionally deflate-compressed object files with sync markers
//! - **Sinks**: one container per destination, rolled when the schema changes
//!
//! ## Example
//!
//! ```rust
//! use opcua_avro::codec::{SchemaDecoder, SchemaEncoder};
//! use opcua_avro::schema::{DataSetMetadata, FieldMetadata, SchemaBuilder};
//! use opcua_avro::types::{BuiltInType, DataSet, DataValue, FieldContent};
//!
//! # fn main() -> opcua_avro::Result<()> {
//! let metadata = DataSetMetadata::new(Some("Boiler"))
//!     .with_field(FieldMetadata::built_in("Temperature", BuiltInType::Double));
//! let schema = SchemaBuilder::new().compile_data_set(&metadata, FieldContent::RawData)?;
//!
//! let data_set = DataSet::new(Some("Boiler".to_string())).with_field("Temperature", DataValue::new(21.5f64));
//! let mut encoder = SchemaEncoder::new(Vec::new(), schema.clone());
//! encoder.write_data_set(&data_set)?;
//! let bytes = encoder.finish()?;
//!
//! let mut decoder = SchemaDecoder::new(bytes.as_slice(), schema);
//! let decoded = decoder.read_data_set()?;
//! decoder.finish_message()?;
//! assert_eq!(decoded.get("Temperature"), data_set.get("Temperature"));
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Encoding layers
pub mod binary;
pub mod codec;
pub mod schema;
pub mod traverser;

// Files and destinations
pub mod container;
pub mod sink;

// Core exports
pub use config::{CodecOptions, Compression, ContainerOptions, Settings};
pub use error::*;
pub use traverser::SchemaTraverser;

pub use codec::{SchemaDecoder, SchemaEncoder};
pub use container::{ContainerReader, ContainerWriter};
pub use sink::{ContainerSinks, DestinationFactory, FileDestinations, MemoryDestinations};
