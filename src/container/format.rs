//! Object container file layout.
//!
//! ## File Structure
//!
//! 1. **Magic** (4 bytes) - `Obj` followed by format version 1
//! 2. **Metadata** - map of string keys to byte values, encoded in map blocks
//! 3. **Sync marker** (16 bytes) - random per file
//! 4. **Blocks** - object count, payload length, payload, sync marker
//!
//! The metadata always carries the writer schema as JSON text under [`SCHEMA_KEY`] and may
//! name the block compression under [`CODEC_KEY`]. Keys starting with `avro.` are reserved.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use flate2::Compression as Level;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use tracing::{debug, trace};

use crate::binary::{BinaryReader, BinaryWriter};
use crate::config::Compression;
use crate::schema::{self, Schema};
use crate::{CodecError, Result};

pub const MAGIC: [u8; 4] = *b"Obj\x01";
pub const SYNC_SIZE: usize = 16;
pub const SCHEMA_KEY: &str = "avro.schema";
pub const CODEC_KEY: &str = "avro.codec";

/// Prefix of metadata keys owned by the container format.
pub const RESERVED_PREFIX: &str = "avro.";

/// Cap for one block payload and for one metadata value.
pub const MAX_BLOCK_LENGTH: usize = 64 * 1024 * 1024;

pub type SyncMarker = [u8; SYNC_SIZE];

/// Parsed file header.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    pub schema: Schema,
    pub compression: Compression,
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub sync: SyncMarker,
}

impl Header {
    pub fn write_to<W: Write>(&self, writer: &mut BinaryWriter<W>) -> Result<()> {
        writer.write_fixed(&MAGIC)?;

        let schema_json = schema::to_json_string(&self.schema);
        let mut entries: Vec<(&str, &[u8])> = vec![
            (SCHEMA_KEY, schema_json.as_bytes()),
            (CODEC_KEY, self.compression.name().as_bytes()),
        ];
        entries.extend(self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_slice())));

        writer.write_long(entries.len() as i64)?;
        for (key, value) in entries {
            writer.write_string(key)?;
            writer.write_bytes(value)?;
        }
        writer.write_long(0)?;
        writer.write_fixed(&self.sync)?;
        debug!(schema = %self.schema.full_name(), codec = self.compression.name(), "container header written");
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut BinaryReader<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_fixed(&mut magic)?;
        if magic != MAGIC {
            return Err(CodecError::format(format!("not an object container file, magic is {magic:02x?}")));
        }

        let mut metadata = BTreeMap::new();
        loop {
            let mut count = reader.read_long()?;
            if count == 0 {
                break;
            }
            if count < 0 {
                count = count.checked_neg().ok_or_else(|| CodecError::format("invalid metadata block count"))?;
                reader.read_long()?;
            }
            for _ in 0..count {
                let key = reader.read_string()?;
                let value = reader.read_bytes()?;
                metadata.insert(key, value);
            }
        }

        let mut sync = [0u8; SYNC_SIZE];
        reader.read_fixed(&mut sync)?;

        let schema_json = metadata
            .remove(SCHEMA_KEY)
            .ok_or_else(|| CodecError::format(format!("container metadata has no {SCHEMA_KEY} entry")))?;
        let schema_json = String::from_utf8(schema_json)
            .map_err(|e| CodecError::format(format!("{SCHEMA_KEY} is not valid UTF-8: {e}")))?;
        let schema = schema::parse(&schema_json)?;

        let compression = match metadata.remove(CODEC_KEY) {
            None => Compression::Null,
            Some(name) => Compression::from_name(&String::from_utf8_lossy(&name))?,
        };
        debug!(schema = %schema.full_name(), codec = compression.name(), entries = metadata.len(), "container header read");
        Ok(Self { schema, compression, metadata, sync })
    }
}

/// Reject user metadata keys in the reserved namespace.
pub(crate) fn check_user_metadata(metadata: &BTreeMap<String, Vec<u8>>) -> Result<()> {
    match metadata.keys().find(|k| k.starts_with(RESERVED_PREFIX)) {
        Some(key) => Err(CodecError::config(format!("metadata key '{key}' is reserved"))),
        None => Ok(()),
    }
}

pub(crate) fn compress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::Null => Ok(payload.to_vec()),
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::with_capacity(payload.len() / 2), Level::default());
            encoder.write_all(payload).map_err(|e| CodecError::io("compressing block", e))?;
            let compressed = encoder.finish().map_err(|e| CodecError::io("compressing block", e))?;
            trace!(raw = payload.len(), compressed = compressed.len(), "block deflated");
            Ok(compressed)
        }
    }
}

pub(crate) fn decompress(compression: Compression, payload: Vec<u8>) -> Result<Vec<u8>> {
    match compression {
        Compression::Null => Ok(payload),
        Compression::Deflate => {
            let mut inflated = Vec::new();
            DeflateDecoder::new(payload.as_slice())
                .take(MAX_BLOCK_LENGTH as u64 + 1)
                .read_to_end(&mut inflated)
                .map_err(|e| CodecError::format(format!("corrupt deflate block: {e}")))?;
            if inflated.len() > MAX_BLOCK_LENGTH {
                return Err(CodecError::limit_exceeded(
                    "inflated block",
                    inflated.len() as u64,
                    MAX_BLOCK_LENGTH as u64,
                ));
            }
            Ok(inflated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CodecOptions;
    use crate::schema::BuiltInSchemas;
    use crate::types::BuiltInType;

    fn header(compression: Compression) -> Header {
        let mut registry = BuiltInSchemas::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("producer".to_string(), b"line-3".to_vec());
        Header { schema: registry.get(BuiltInType::LocalizedText), compression, metadata, sync: [7; SYNC_SIZE] }
    }

    fn unbounded_reader(bytes: &[u8]) -> BinaryReader<&[u8]> {
        let options = CodecOptions { max_bytes_length: MAX_BLOCK_LENGTH, ..CodecOptions::default() };
        BinaryReader::with_options(bytes, &options)
    }

    #[test]
    fn header_round_trips_metadata_and_codec() {
        let mut bytes = Vec::new();
        header(Compression::Deflate).write_to(&mut BinaryWriter::unbounded(&mut bytes)).unwrap();
        assert_eq!(&bytes[..4], b"Obj\x01");
        assert_eq!(&bytes[bytes.len() - SYNC_SIZE..], &[7; SYNC_SIZE]);

        let parsed = Header::read_from(&mut unbounded_reader(&bytes)).unwrap();
        assert_eq!(parsed.compression, Compression::Deflate);
        assert_eq!(parsed.metadata.get("producer").map(Vec::as_slice), Some(&b"line-3"[..]));
        assert_eq!(parsed.schema.full_name(), "org.opcfoundation.ua.LocalizedText");
        assert_eq!(parsed.sync, [7; SYNC_SIZE]);
    }

    #[test]
    fn wrong_magic_is_a_format_error() {
        let error = Header::read_from(&mut unbounded_reader(b"Obj\x02rest")).unwrap_err();
        assert!(matches!(error, CodecError::Format { .. }));
    }

    #[test]
    fn deflate_round_trips() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let compressed = compress(Compression::Deflate, &payload).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(decompress(Compression::Deflate, compressed).unwrap(), payload);
        assert!(decompress(Compression::Deflate, vec![0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let mut metadata = BTreeMap::new();
        metadata.insert("avro.custom".to_string(), Vec::new());
        assert!(matches!(check_user_metadata(&metadata), Err(CodecError::Config { .. })));
    }
}
