//! Object container files
//!
//! A container bundles the writer schema, free-form metadata and any number of encoded
//! objects. Objects are grouped into blocks, optionally deflate-compressed, each followed by
//! the file's sync marker so corruption is detected at the next block boundary.
//!
//! ## Usage Example
//!
//! ```rust
//! use opcua_avro::config::ContainerOptions;
//! use opcua_avro::container::{ContainerReader, ContainerWriter};
//! use opcua_avro::schema::BuiltInSchemas;
//! use opcua_avro::types::BuiltInType;
//!
//! fn round_trip() -> opcua_avro::Result<()> {
//!     let schema = BuiltInSchemas::new().get(BuiltInType::Double);
//!     let mut writer = ContainerWriter::new(Vec::new(), schema, ContainerOptions::default())?;
//!     writer.append(|e| e.write_double(None, 21.5))?;
//!     let file = writer.finish()?;
//!
//!     let mut reader = ContainerReader::open(file.as_slice())?;
//!     while let Some(value) = reader.read_next(|d| d.read_double(None))? {
//!         println!("{value}");
//!     }
//!     Ok(())
//! }
//! # round_trip().unwrap();
//! ```

mod format;
mod reader;
mod writer;

pub use format::{CODEC_KEY, MAGIC, MAX_BLOCK_LENGTH, RESERVED_PREFIX, SCHEMA_KEY, SYNC_SIZE, SyncMarker};
pub use reader::ContainerReader;
pub use writer::ContainerWriter;
