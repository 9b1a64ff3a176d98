//! Container file reader.

use std::collections::BTreeMap;
use std::io::Read;

use tracing::{debug, warn};

use super::format::{Header, MAX_BLOCK_LENGTH, SYNC_SIZE, decompress};
use crate::binary::BinaryReader;
use crate::codec::SchemaDecoder;
use crate::config::Compression;
use crate::schema::Schema;
use crate::types::DataSet;
use crate::{CodecError, CodecOptions, Result};

/// Reads objects back from a container file, one block at a time.
///
/// A decode failure is confined to its block: the rest of that block is dropped and the next
/// call continues with the following block. Sync marker mismatches end the file.
#[derive(Debug)]
pub struct ContainerReader<R> {
    reader: BinaryReader<R>,
    header: Header,
    codec_options: CodecOptions,
    block: Vec<u8>,
    offset: usize,
    remaining: u64,
    blocks_read: u64,
}

impl<R: Read> ContainerReader<R> {
    /// Read and validate the header.
    pub fn open(source: R) -> Result<Self> {
        Self::with_options(source, CodecOptions::default())
    }

    pub fn with_options(source: R, codec_options: CodecOptions) -> Result<Self> {
        codec_options.validate()?;
        let framing = CodecOptions { max_bytes_length: MAX_BLOCK_LENGTH, ..CodecOptions::default() };
        let mut reader = BinaryReader::with_options(source, &framing);
        let header = Header::read_from(&mut reader)?;
        Ok(Self { reader, header, codec_options, block: Vec::new(), offset: 0, remaining: 0, blocks_read: 0 })
    }

    /// Writer schema stored in the header.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    pub fn compression(&self) -> Compression {
        self.header.compression
    }

    /// User metadata entry stored in the header.
    pub fn metadata(&self, key: &str) -> Option<&[u8]> {
        self.header.metadata.get(key).map(Vec::as_slice)
    }

    pub fn user_metadata(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.header.metadata
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Decode the next object through `read`, or return `None` at the end of the file.
    pub fn read_next<T>(&mut self, read: impl FnOnce(&mut SchemaDecoder<&[u8]>) -> Result<T>) -> Result<Option<T>> {
        while self.remaining == 0 {
            if !self.load_block()? {
                return Ok(None);
            }
        }

        let mut decoder = SchemaDecoder::with_options(
            &self.block[self.offset..],
            self.header.schema.clone(),
            self.codec_options.clone(),
        );
        let result = read(&mut decoder).and_then(|value| decoder.finish_message().map(|_| value));
        match result {
            Ok(value) => {
                self.offset += decoder.position() as usize;
                self.remaining -= 1;
                Ok(Some(value))
            }
            Err(error) => {
                warn!(block = self.blocks_read, skipped = self.remaining, %error, "dropping rest of block");
                self.remaining = 0;
                self.offset = self.block.len();
                Err(error)
            }
        }
    }

    pub fn read_data_set(&mut self) -> Result<Option<DataSet>> {
        self.read_next(|decoder| decoder.read_data_set())
    }

    /// Load the next block, returning `false` at a clean end of file.
    fn load_block(&mut self) -> Result<bool> {
        let Some(count) = self.reader.try_read_long()? else {
            return Ok(false);
        };
        if count < 0 {
            return Err(CodecError::format(format!("block {} has negative object count {count}", self.blocks_read)));
        }
        let length = self.reader.read_length("block", MAX_BLOCK_LENGTH)?;
        let mut payload = vec![0u8; length];
        self.reader.read_fixed(&mut payload)?;

        let mut sync = [0u8; SYNC_SIZE];
        self.reader.read_fixed(&mut sync)?;
        if sync != self.header.sync {
            return Err(CodecError::format(format!("sync marker mismatch after block {}", self.blocks_read)));
        }

        self.block = decompress(self.header.compression, payload)?;
        self.offset = 0;
        self.remaining = count as u64;
        self.blocks_read += 1;
        debug!(block = self.blocks_read, objects = count, bytes = self.block.len(), "container block read");
        Ok(true)
    }
}

impl ContainerReader<std::io::BufReader<std::fs::File>> {
    /// Open a container file at `path`.
    pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| CodecError::io(format!("opening {}", path.display()), e))?;
        Self::open(std::io::BufReader::new(file))
    }
}
