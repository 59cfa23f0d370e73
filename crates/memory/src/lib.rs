#![deny(missing_docs)]
//! An in-memory [TabletEngine] implementation.
//!
//! This engine exists to back tests and to serve as the reference
//! implementation of the storage boundary semantics: sorted forward scans,
//! visibility filtering, buffered writes with an explicit durable flush,
//! and server-side pushdown transforms and combiners. It is not a durable
//! store.

use bucketlog_api::{
    Authorizations, BufferedWriter, Cell, CellStream, DynBufferedWriter,
    DynCellCombiner, DynScanTransform, Mutation, RowRange, StoreError,
    StoreResult, TabletEngine, Timestamp, WriterConfig,
};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

mod table;
use table::TableState;

/// An in-memory [TabletEngine].
#[derive(Debug, Default)]
pub struct MemoryTabletEngine {
    tables: RwLock<HashMap<String, Arc<TableState>>>,
}

impl MemoryTabletEngine {
    /// Construct a new engine as a trait object.
    pub fn create() -> bucketlog_api::DynTabletEngine {
        Arc::new(Self::default())
    }

    async fn table(&self, name: &str) -> StoreResult<Arc<TableState>> {
        self.tables
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::store_unavailable(name))
    }
}

impl TabletEngine for MemoryTabletEngine {
    fn create_table_if_absent(
        &self,
        table: String,
    ) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            // Creating a table that already exists is success. The entry
            // api makes the race between concurrent initializers benign.
            self.tables
                .write()
                .await
                .entry(table)
                .or_insert_with(|| Arc::new(TableState::default()));
            Ok(())
        }
        .boxed()
    }

    fn buffered_writer(
        &self,
        table: String,
        config: WriterConfig,
    ) -> BoxFuture<'_, StoreResult<DynBufferedWriter>> {
        async move {
            let state = self.table(&table).await?;
            Ok(Arc::new(MemoryBufferedWriter::new(state, config))
                as DynBufferedWriter)
        }
        .boxed()
    }

    fn register_scan_transform(
        &self,
        table: String,
        name: String,
        priority: u32,
        transform: DynScanTransform,
    ) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let state = self.table(&table).await?;
            state.register_scan_transform(name, priority, transform).await
        }
        .boxed()
    }

    fn register_combiner(
        &self,
        table: String,
        name: String,
        priority: u32,
        families: Vec<String>,
        combiner: DynCellCombiner,
    ) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let state = self.table(&table).await?;
            state
                .register_combiner(name, priority, families, combiner)
                .await
        }
        .boxed()
    }

    fn scan(
        &self,
        table: String,
        range: RowRange,
        auths: Authorizations,
        transform: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Vec<Cell>>> {
        async move {
            let state = self.table(&table).await?;
            state.scan(range, auths, transform.as_deref()).await
        }
        .boxed()
    }

    fn batch_scan(
        &self,
        table: String,
        ranges: Vec<RowRange>,
        auths: Authorizations,
        num_workers: usize,
    ) -> BoxFuture<'_, StoreResult<CellStream>> {
        async move {
            let state = self.table(&table).await?;
            let stream = futures::stream::iter(ranges)
                .map(move |range| {
                    let state = state.clone();
                    let auths = auths.clone();
                    async move { state.scan(range, auths, None).await }
                })
                .buffer_unordered(num_workers.max(1))
                .flat_map(|scanned| match scanned {
                    Ok(cells) => {
                        futures::stream::iter(cells.into_iter().map(Ok))
                            .boxed()
                    }
                    Err(e) => {
                        futures::stream::once(async move { Err(e) }).boxed()
                    }
                })
                .boxed();
            Ok(stream)
        }
        .boxed()
    }
}

#[derive(Debug)]
struct WriterBuffer {
    mutations: Vec<Mutation>,
    pending_bytes: usize,
}

#[derive(Debug)]
struct WriterInner {
    state: Arc<TableState>,
    buffer: Mutex<WriterBuffer>,
    max_buffer_bytes: usize,
}

impl WriterInner {
    async fn flush(&self) -> StoreResult<()> {
        let mutations = {
            let mut buffer = self.buffer.lock().await;
            buffer.pending_bytes = 0;
            std::mem::take(&mut buffer.mutations)
        };
        if mutations.is_empty() {
            return Ok(());
        }
        self.state.fold_in(mutations).await
    }
}

/// A [BufferedWriter] over one in-memory table.
///
/// Mutations are held in the buffer until the byte threshold is reached,
/// the latency timer fires, or [BufferedWriter::flush] is called. The
/// latency timer runs on a background tokio task that is aborted when the
/// writer is dropped.
#[derive(Debug)]
struct MemoryBufferedWriter {
    inner: Arc<WriterInner>,
    latency_task: tokio::task::JoinHandle<()>,
}

impl MemoryBufferedWriter {
    fn new(state: Arc<TableState>, config: WriterConfig) -> Self {
        let inner = Arc::new(WriterInner {
            state,
            buffer: Mutex::new(WriterBuffer {
                mutations: Vec::new(),
                pending_bytes: 0,
            }),
            max_buffer_bytes: config.max_buffer_bytes,
        });

        let task_inner = inner.clone();
        let latency_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.max_latency);
            interval.set_missed_tick_behavior(
                tokio::time::MissedTickBehavior::Delay,
            );
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = task_inner.flush().await {
                    tracing::warn!(?e, "background flush failed");
                }
            }
        });

        Self {
            inner,
            latency_task,
        }
    }
}

impl Drop for MemoryBufferedWriter {
    fn drop(&mut self) {
        self.latency_task.abort();
    }
}

fn mutation_size(mutation: &Mutation) -> usize {
    mutation.row.len()
        + mutation
            .puts
            .iter()
            .map(|p| {
                p.family.len()
                    + p.qualifier.len()
                    + p.visibility.len()
                    + p.value.len()
                    + std::mem::size_of::<Timestamp>()
            })
            .sum::<usize>()
}

impl BufferedWriter for MemoryBufferedWriter {
    fn submit(
        &self,
        mutations: Vec<Mutation>,
    ) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            let over_threshold = {
                let mut buffer = self.inner.buffer.lock().await;
                buffer.pending_bytes +=
                    mutations.iter().map(mutation_size).sum::<usize>();
                buffer.mutations.extend(mutations);
                buffer.pending_bytes >= self.inner.max_buffer_bytes
            };
            if over_threshold {
                self.inner.flush().await?;
            }
            Ok(())
        }
        .boxed()
    }

    fn flush(&self) -> BoxFuture<'_, StoreResult<()>> {
        async move { self.inner.flush().await }.boxed()
    }
}
