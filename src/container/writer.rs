//! Container file writer.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, trace};

use super::format::{Header, SyncMarker, check_user_metadata, compress};
use crate::binary::BinaryWriter;
use crate::codec::SchemaEncoder;
use crate::config::ContainerOptions;
use crate::schema::Schema;
use crate::types::DataSet;
use crate::{CodecError, CodecOptions, Result};

/// Appends schema-validated objects to a container file, buffering them into blocks.
///
/// Each object is encoded into the open block first; a failed encode truncates the block back
/// to where the object started, so the file only ever holds complete objects.
#[derive(Debug)]
pub struct ContainerWriter<W: Write> {
    writer: BinaryWriter<W>,
    header: Header,
    options: ContainerOptions,
    codec_options: CodecOptions,
    block: Vec<u8>,
    block_objects: usize,
    objects_written: u64,
    blocks_written: u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Write the header for `schema` and return a writer ready for objects.
    pub fn new(sink: W, schema: Schema, options: ContainerOptions) -> Result<Self> {
        Self::with_metadata(sink, schema, options, BTreeMap::new())
    }

    /// Like [`new`](Self::new), storing extra user metadata entries in the header.
    pub fn with_metadata(
        sink: W,
        schema: Schema,
        options: ContainerOptions,
        metadata: BTreeMap<String, Vec<u8>>,
    ) -> Result<Self> {
        options.validate()?;
        check_user_metadata(&metadata)?;

        let header = Header { schema, compression: options.compression, metadata, sync: rand::random::<SyncMarker>() };
        let mut writer = BinaryWriter::unbounded(sink);
        header.write_to(&mut writer)?;
        Ok(Self {
            writer,
            header,
            options,
            codec_options: CodecOptions::default(),
            block: Vec::new(),
            block_objects: 0,
            objects_written: 0,
            blocks_written: 0,
        })
    }

    /// Limits applied while encoding each object.
    pub fn with_codec_options(mut self, codec_options: CodecOptions) -> Self {
        self.codec_options = codec_options;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    pub fn sync_marker(&self) -> &SyncMarker {
        &self.header.sync
    }

    /// Objects appended so far, including those still buffered.
    pub fn objects_written(&self) -> u64 {
        self.objects_written
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Encode one object through `write`, which must produce exactly one complete message.
    pub fn append(&mut self, write: impl FnOnce(&mut SchemaEncoder<&mut Vec<u8>>) -> Result<()>) -> Result<()> {
        self.buffer(write)?;
        if self.block_full() {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Encode one object into the open block without touching the sink.
    pub fn buffer(&mut self, write: impl FnOnce(&mut SchemaEncoder<&mut Vec<u8>>) -> Result<()>) -> Result<()> {
        let mark = self.block.len();
        let result = {
            let mut encoder =
                SchemaEncoder::with_options(&mut self.block, self.header.schema.clone(), self.codec_options.clone());
            write(&mut encoder).and_then(|_| encoder.finish_message())
        };
        if let Err(error) = result {
            trace!(discarded = self.block.len() - mark, "object rejected, block truncated");
            self.block.truncate(mark);
            return Err(error);
        }

        self.block_objects += 1;
        self.objects_written += 1;
        Ok(())
    }

    /// Whether the open block has reached either configured limit.
    pub fn block_full(&self) -> bool {
        self.block_objects >= self.options.block_object_limit || self.block.len() >= self.options.block_byte_limit
    }

    pub fn append_data_set(&mut self, data_set: &DataSet) -> Result<()> {
        self.append(|encoder| encoder.write_data_set(data_set))
    }

    /// Write the buffered objects as one block.
    pub fn flush_block(&mut self) -> Result<()> {
        if self.block_objects == 0 {
            return Ok(());
        }
        let payload = compress(self.header.compression, &self.block)?;
        self.writer.write_long(self.block_objects as i64)?;
        self.writer.write_long(payload.len() as i64)?;
        self.writer.write_fixed(&payload)?;
        self.writer.write_fixed(&self.header.sync)?;
        debug!(
            block = self.blocks_written,
            objects = self.block_objects,
            raw = self.block.len(),
            stored = payload.len(),
            "container block written"
        );
        self.blocks_written += 1;
        self.block_objects = 0;
        self.block.clear();
        Ok(())
    }

    /// Write any buffered block and flush the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_block()?;
        self.writer.flush()
    }

    /// Flush and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer.into_inner())
    }
}

impl ContainerWriter<std::fs::File> {
    /// Create a container file at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<std::path::Path>, schema: Schema, options: ContainerOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(|e| CodecError::io(format!("creating {}", path.display()), e))?;
        Self::new(file, schema, options)
    }
}
