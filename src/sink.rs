//! Destination registry for container files.
//!
//! Publishers write data sets to named destinations. The registry keeps at most one open
//! [`ContainerWriter`] per destination, serialises writes to it, and rolls over to a new
//! container whenever a destination receives data under a different schema. Where the bytes
//! go is up to a [`DestinationFactory`]: [`FileDestinations`] writes numbered files into a
//! directory, [`MemoryDestinations`] collects finished containers in memory.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::SchemaEncoder;
use crate::config::ContainerOptions;
use crate::container::ContainerWriter;
use crate::schema::{Schema, escape_symbol, to_json_string};
use crate::types::DataSet;
use crate::{CodecError, Result};

/// Opens and retires the byte sinks behind destinations.
#[async_trait::async_trait]
pub trait DestinationFactory: Send + Sync + 'static {
    type Sink: Write + Send + 'static;

    /// Open a fresh sink for `destination`, about to receive a container for `schema`.
    async fn open(&self, destination: &str, schema: &Schema) -> Result<Self::Sink>;

    /// Take back a sink whose container has been finished.
    async fn retire(&self, _destination: &str, _sink: Self::Sink) -> Result<()> {
        Ok(())
    }
}

struct Slot<S: Write> {
    writer: Option<ContainerWriter<S>>,
    schema_json: String,
    /// Set once the slot has left the registry; writers holding it must fetch a fresh one
    closed: bool,
}

impl<S: Write> Slot<S> {
    fn new() -> Self {
        Self { writer: None, schema_json: String::new(), closed: false }
    }
}

/// Run blocking sink I/O off the async workers.
async fn blocking<T, R>(task: T) -> Result<R>
where
    T: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CodecError::io("destination I/O task failed", std::io::Error::other(e)))
}

/// Registry of open container writers keyed by destination name.
///
/// Objects are encoded on the calling task; header, block and flush writes to the sink run on
/// the blocking pool.
pub struct ContainerSinks<F: DestinationFactory> {
    factory: F,
    options: ContainerOptions,
    slots: Mutex<HashMap<String, Arc<Mutex<Slot<F::Sink>>>>>,
}

impl<F: DestinationFactory> ContainerSinks<F> {
    pub fn new(factory: F, options: ContainerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { factory, options, slots: Mutex::new(HashMap::new()) })
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Names of destinations with an open writer.
    pub async fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Append one data set to `destination`, opening or rolling its container as needed.
    pub async fn write_data_set(&self, destination: &str, schema: &Schema, data_set: &DataSet) -> Result<()> {
        self.write_with(destination, schema, |encoder| encoder.write_data_set(data_set)).await
    }

    /// Append one object produced by `write` to `destination`.
    pub async fn write_with(
        &self,
        destination: &str,
        schema: &Schema,
        write: impl FnOnce(&mut SchemaEncoder<&mut Vec<u8>>) -> Result<()>,
    ) -> Result<()> {
        loop {
            let handle = self.slot(destination).await;
            let mut slot = handle.lock().await;
            if slot.closed {
                // Closed between lookup and lock
                continue;
            }
            self.prepare(destination, schema, &mut slot).await?;

            let Some(writer) = slot.writer.as_mut() else {
                return Err(CodecError::encoding(format!("destination '{destination}' has no open container")));
            };
            writer.buffer(write)?;
            if writer.block_full() {
                Self::flush_slot(&mut slot, false).await?;
            }
            return Ok(());
        }
    }

    /// Make sure `slot` holds a writer for `schema`, rolling over on a schema change.
    async fn prepare(&self, destination: &str, schema: &Schema, slot: &mut Slot<F::Sink>) -> Result<()> {
        let schema_json = match slot.writer.as_ref() {
            Some(writer) if Arc::ptr_eq(writer.schema(), schema) => return Ok(()),
            Some(_) => {
                let schema_json = to_json_string(schema);
                if slot.schema_json == schema_json {
                    return Ok(());
                }
                schema_json
            }
            None => to_json_string(schema),
        };

        if let Some(previous) = slot.writer.take() {
            info!(destination, "schema changed, rolling container");
            self.retire(destination, previous).await?;
        }
        let sink = self.factory.open(destination, schema).await?;
        let (header_schema, options) = (schema.clone(), self.options.clone());
        let writer = blocking(move || ContainerWriter::new(sink, header_schema, options)).await??;
        slot.writer = Some(writer);
        slot.schema_json = schema_json;
        debug!(destination, schema = %schema.full_name(), "container opened");
        Ok(())
    }

    /// Write the open block of `slot` and, when `sink` is set, flush the sink too.
    async fn flush_slot(slot: &mut Slot<F::Sink>, sink: bool) -> Result<()> {
        let Some(mut writer) = slot.writer.take() else { return Ok(()) };
        let (writer, result) = blocking(move || {
            let result = if sink { writer.flush() } else { writer.flush_block() };
            (writer, result)
        })
        .await?;
        slot.writer = Some(writer);
        result
    }

    /// Write buffered objects of every destination to their sinks.
    pub async fn flush_all(&self) -> Result<()> {
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        for slot in slots {
            Self::flush_slot(&mut *slot.lock().await, true).await?;
        }
        Ok(())
    }

    /// Finish the container of one destination.
    pub async fn close(&self, destination: &str) -> Result<()> {
        let slot = self.slots.lock().await.remove(destination);
        if let Some(slot) = slot {
            let writer = Self::shut(&mut *slot.lock().await);
            if let Some(writer) = writer {
                self.retire(destination, writer).await?;
            }
        }
        Ok(())
    }

    /// Finish every open container. All destinations are closed even when some fail; the
    /// first error is returned.
    pub async fn close_all(&self) -> Result<()> {
        let slots: Vec<(String, Arc<Mutex<Slot<F::Sink>>>)> = self.slots.lock().await.drain().collect();
        let mut first_error = None;
        for (destination, slot) in slots {
            let writer = Self::shut(&mut *slot.lock().await);
            let Some(writer) = writer else { continue };
            if let Err(error) = self.retire(&destination, writer).await {
                warn!(destination, %error, "failed to close container");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn shut(slot: &mut Slot<F::Sink>) -> Option<ContainerWriter<F::Sink>> {
        slot.closed = true;
        slot.writer.take()
    }

    async fn slot(&self, destination: &str) -> Arc<Mutex<Slot<F::Sink>>> {
        let mut slots = self.slots.lock().await;
        slots.entry(destination.to_string()).or_insert_with(|| Arc::new(Mutex::new(Slot::new()))).clone()
    }

    async fn retire(&self, destination: &str, writer: ContainerWriter<F::Sink>) -> Result<()> {
        let objects = writer.objects_written();
        let sink = blocking(move || writer.finish()).await??;
        self.factory.retire(destination, sink).await?;
        debug!(destination, objects, "container closed");
        Ok(())
    }

    /// Flush every destination on a fixed period until the registry is dropped.
    pub fn spawn_flusher(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let sinks = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(sinks) = sinks.upgrade() else { break };
                if let Err(error) = sinks.flush_all().await {
                    warn!(%error, "periodic flush failed");
                }
            }
        })
    }
}

/// Writes each container to `<directory>/<stem>.<sequence>.avro`, where the stem is the
/// destination name with [`escape_symbol`] applied.
///
/// Destinations that escape to the same stem share one sequence, and files already on disk
/// are skipped rather than replaced.
#[derive(Debug)]
pub struct FileDestinations {
    directory: PathBuf,
    sequence: StdMutex<HashMap<String, u32>>,
}

impl FileDestinations {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into(), sequence: StdMutex::new(HashMap::new()) }
    }

    /// Path the next container with file stem `stem` is written to.
    fn next_path(&self, stem: &str) -> PathBuf {
        let mut sequence = self.sequence.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let counter = sequence.entry(stem.to_string()).or_insert(0);
        *counter += 1;
        self.directory.join(format!("{stem}.{counter}.avro"))
    }
}

#[async_trait::async_trait]
impl DestinationFactory for FileDestinations {
    type Sink = std::io::BufWriter<std::fs::File>;

    async fn open(&self, destination: &str, _schema: &Schema) -> Result<Self::Sink> {
        let stem = escape_symbol(destination);
        loop {
            let path = self.next_path(&stem);
            let target = path.clone();
            let created =
                blocking(move || std::fs::OpenOptions::new().write(true).create_new(true).open(target)).await?;
            match created {
                Ok(file) => return Ok(std::io::BufWriter::new(file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(destination, path = %path.display(), "container file exists, skipping");
                }
                Err(e) => return Err(CodecError::io(format!("creating {}", path.display()), e)),
            }
        }
    }
}

/// Keeps finished containers in memory, in the order they were closed.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestinations {
    finished: Arc<StdMutex<Vec<(String, Vec<u8>)>>>,
}

impl MemoryDestinations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished containers as `(destination, file bytes)` pairs.
    pub fn finished(&self) -> Vec<(String, Vec<u8>)> {
        self.finished.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl DestinationFactory for MemoryDestinations {
    type Sink = Vec<u8>;

    async fn open(&self, _destination: &str, _schema: &Schema) -> Result<Self::Sink> {
        Ok(Vec::new())
    }

    async fn retire(&self, destination: &str, sink: Self::Sink) -> Result<()> {
        self.finished
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((destination.to_string(), sink));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerReader;
    use crate::schema::{DataSetMetadata, FieldMetadata, SchemaBuilder};
    use crate::types::{BuiltInType, DataValue, FieldContent};

    fn schema(field: &str) -> Schema {
        let metadata = DataSetMetadata::new(Some("Boiler")).with_field(FieldMetadata::built_in(field, BuiltInType::Double));
        SchemaBuilder::new().compile_data_set(&metadata, FieldContent::RawData).unwrap()
    }

    fn data_set(field: &str, value: f64) -> DataSet {
        DataSet::new(Some("Boiler".to_string())).with_field(field, DataValue::new(value))
    }

    fn count(bytes: &[u8]) -> usize {
        let mut reader = ContainerReader::open(bytes).unwrap();
        std::iter::from_fn(|| reader.read_data_set().unwrap()).count()
    }

    #[tokio::test]
    async fn one_writer_per_destination() {
        let sinks = ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap();
        let temperature = schema("Temperature");
        for value in [20.5, 21.0, 21.5] {
            sinks.write_data_set("north", &temperature, &data_set("Temperature", value)).await.unwrap();
        }
        sinks.write_data_set("south", &temperature, &data_set("Temperature", 9.0)).await.unwrap();
        assert_eq!(sinks.destinations().await, ["north", "south"]);

        sinks.close_all().await.unwrap();
        let finished = sinks.factory().finished();
        assert_eq!(finished.len(), 2);
        let north = finished.iter().find(|(d, _)| d == "north").unwrap();
        assert_eq!(count(&north.1), 3);
        assert!(sinks.destinations().await.is_empty());
    }

    #[tokio::test]
    async fn schema_changes_roll_the_container() {
        let sinks = ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap();
        sinks.write_data_set("line", &schema("Temperature"), &data_set("Temperature", 1.0)).await.unwrap();
        // Equal schema text from another compile keeps the open container
        sinks.write_data_set("line", &schema("Temperature"), &data_set("Temperature", 2.0)).await.unwrap();
        sinks.write_data_set("line", &schema("Pressure"), &data_set("Pressure", 3.0)).await.unwrap();

        let finished = sinks.factory().finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(count(&finished[0].1), 2);

        sinks.close("line").await.unwrap();
        let finished = sinks.factory().finished();
        assert_eq!(finished.len(), 2);
        assert_eq!(count(&finished[1].1), 1);
    }

    #[tokio::test]
    async fn rejected_objects_keep_the_writer_usable() {
        let sinks = ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap();
        let temperature = schema("Temperature");
        assert!(sinks.write_data_set("line", &temperature, &data_set("Humidity", 1.0)).await.is_err());
        sinks.write_data_set("line", &temperature, &data_set("Temperature", 1.0)).await.unwrap();
        sinks.close_all().await.unwrap();
        assert_eq!(count(&sinks.factory().finished()[0].1), 1);
    }

    #[tokio::test]
    async fn file_destinations_number_their_containers() {
        let directory = std::env::temp_dir().join(format!("opcua-avro-sink-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&directory).unwrap();
        let sinks = ContainerSinks::new(FileDestinations::new(&directory), ContainerOptions::default()).unwrap();
        sinks.write_data_set("plant/a", &schema("Temperature"), &data_set("Temperature", 1.0)).await.unwrap();
        sinks.write_data_set("plant/a", &schema("Pressure"), &data_set("Pressure", 1.0)).await.unwrap();
        sinks.close_all().await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&directory)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["plant_a.1.avro", "plant_a.2.avro"]);
        let bytes = std::fs::read(directory.join(&names[1])).unwrap();
        assert_eq!(count(&bytes), 1);
        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[tokio::test]
    async fn colliding_file_stems_get_their_own_files() {
        let directory = std::env::temp_dir().join(format!("opcua-avro-sink-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&directory).unwrap();
        std::fs::write(directory.join("plant_a.1.avro"), b"left over").unwrap();

        let sinks = ContainerSinks::new(FileDestinations::new(&directory), ContainerOptions::default()).unwrap();
        let temperature = schema("Temperature");
        sinks.write_data_set("plant/a", &temperature, &data_set("Temperature", 1.0)).await.unwrap();
        sinks.write_data_set("plant_a", &temperature, &data_set("Temperature", 2.0)).await.unwrap();
        sinks.write_data_set("plant_a", &temperature, &data_set("Temperature", 3.0)).await.unwrap();
        sinks.close_all().await.unwrap();

        assert_eq!(std::fs::read(directory.join("plant_a.1.avro")).unwrap(), b"left over");
        let mut counts = Vec::new();
        for n in [2, 3] {
            let bytes = std::fs::read(directory.join(format!("plant_a.{n}.avro"))).unwrap();
            counts.push(count(&bytes));
        }
        counts.sort();
        assert_eq!(counts, [1, 2]);
        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[tokio::test]
    async fn writes_after_close_open_a_fresh_container() {
        let sinks = ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap();
        let temperature = schema("Temperature");
        sinks.write_data_set("line", &temperature, &data_set("Temperature", 1.0)).await.unwrap();

        // A handle fetched before close must not take further objects
        let stale = sinks.slot("line").await;
        sinks.close("line").await.unwrap();
        assert!(stale.lock().await.closed);
        assert!(stale.lock().await.writer.is_none());

        sinks.write_data_set("line", &temperature, &data_set("Temperature", 2.0)).await.unwrap();
        assert!(stale.lock().await.writer.is_none());
        sinks.close_all().await.unwrap();
        let finished = sinks.factory().finished();
        assert_eq!(finished.iter().map(|(_, bytes)| count(bytes)).collect::<Vec<_>>(), [1, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_closes_lose_no_objects() {
        let sinks = Arc::new(ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap());
        let temperature = schema("Temperature");
        let mut tasks = Vec::new();
        for worker in 0..4 {
            let (sinks, temperature) = (sinks.clone(), temperature.clone());
            tasks.push(tokio::spawn(async move {
                for n in 0..50 {
                    let value = f64::from(worker * 100 + n);
                    sinks.write_data_set("line", &temperature, &data_set("Temperature", value)).await.unwrap();
                }
            }));
        }
        let closer = {
            let sinks = sinks.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    sinks.close("line").await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        for task in tasks {
            task.await.unwrap();
        }
        closer.await.unwrap();
        sinks.close_all().await.unwrap();

        let total: usize = sinks.factory().finished().iter().map(|(_, bytes)| count(bytes)).sum();
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn full_blocks_and_flushes_reach_the_file() {
        let directory = std::env::temp_dir().join(format!("opcua-avro-sink-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&directory).unwrap();
        let options = ContainerOptions { block_object_limit: 2, ..ContainerOptions::default() };
        let sinks = ContainerSinks::new(FileDestinations::new(&directory), options).unwrap();
        let temperature = schema("Temperature");
        for value in [1.0, 2.0, 3.0] {
            sinks.write_data_set("tank", &temperature, &data_set("Temperature", value)).await.unwrap();
        }
        sinks.flush_all().await.unwrap();

        let bytes = std::fs::read(directory.join("tank.1.avro")).unwrap();
        assert_eq!(count(&bytes), 3);
        sinks.close_all().await.unwrap();
        std::fs::remove_dir_all(&directory).unwrap();
    }

    #[tokio::test]
    async fn flusher_stops_with_the_registry() {
        let sinks = Arc::new(ContainerSinks::new(MemoryDestinations::new(), ContainerOptions::default()).unwrap());
        let handle = sinks.spawn_flusher(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(35)).await;
        drop(sinks);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.await.unwrap();
    }
}
