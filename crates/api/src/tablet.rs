//! The storage-engine boundary.
//!
//! Bucketlog does not implement a distributed key-value store. It layers on
//! top of one, and this module is the whole of what it asks of that engine:
//! idempotent table creation, a buffered writer with an explicit durable
//! flush, forward range scans in sorted order with an authorization-label
//! predicate, server-side pushdown transform/merge registration, and a
//! bounded-concurrency batch scanner over discontinuous row ranges.
//!
//! Everything the engine returns is expressed in terms of [Cell]s: the
//! sorted unit of `(row, family, qualifier)` keyed, visibility-labelled,
//! timestamped bytes.

use crate::{StoreResult, Timestamp};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A single stored cell.
///
/// Engines sort cells ascending by `(row, family, qualifier)`, and scans
/// return them in that order. The bucketlog key codec arranges for that
/// sort to be reverse-chronological.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// The row key.
    pub row: String,

    /// The column family.
    pub family: String,

    /// The column qualifier.
    pub qualifier: String,

    /// The visibility label. Empty means visible to everyone.
    pub visibility: String,

    /// The cell timestamp.
    pub timestamp: Timestamp,

    /// The cell value.
    pub value: bytes::Bytes,
}

/// A single column write within a [Mutation].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    /// The column family.
    pub family: String,

    /// The column qualifier.
    pub qualifier: String,

    /// The visibility label to store the cell under.
    pub visibility: String,

    /// The cell timestamp.
    pub timestamp: Timestamp,

    /// The cell value.
    pub value: bytes::Bytes,
}

/// A batch of column writes against a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// The row key the puts apply to.
    pub row: String,

    /// The column writes.
    pub puts: Vec<Put>,
}

impl Mutation {
    /// Construct an empty mutation for the given row.
    pub fn new(row: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            puts: Vec::new(),
        }
    }

    /// Add a column write to this mutation.
    pub fn put(
        &mut self,
        family: impl Into<String>,
        qualifier: impl Into<String>,
        visibility: impl Into<String>,
        timestamp: Timestamp,
        value: bytes::Bytes,
    ) {
        self.puts.push(Put {
            family: family.into(),
            qualifier: qualifier.into(),
            visibility: visibility.into(),
            timestamp,
            value,
        });
    }
}

/// A contiguous row range, inclusive at both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    /// The first row included in the range.
    pub start: String,

    /// The last row included in the range.
    pub end: String,
}

impl RowRange {
    /// Construct a range covering `[start, end]`.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Construct a range covering exactly one row.
    pub fn single_row(row: impl Into<String>) -> Self {
        let row = row.into();
        Self {
            start: row.clone(),
            end: row,
        }
    }

    /// Whether the given row falls inside this range.
    pub fn contains(&self, row: &str) -> bool {
        self.start.as_str() <= row && row <= self.end.as_str()
    }
}

/// The set of visibility labels a scan is authorized to see.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Authorizations(BTreeSet<String>);

impl Authorizations {
    /// Construct from an iterator of labels.
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(labels: I) -> Self {
        Self(labels.into_iter().map(Into::into).collect())
    }

    /// The empty authorization set. Only unlabelled cells are visible.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether a cell carrying the given label is visible under this set.
    ///
    /// An empty label is always visible.
    pub fn can_see(&self, label: &str) -> bool {
        label.is_empty() || self.0.contains(label)
    }
}

/// Buffering thresholds for a [BufferedWriter].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WriterConfig {
    /// The buffer flushes once this many bytes of mutations are pending.
    ///
    /// Default: 100_000.
    pub max_buffer_bytes: usize,

    /// The buffer flushes once the oldest pending mutation has waited this
    /// long, whether or not the byte threshold was reached.
    ///
    /// Default: 10s.
    pub max_latency: std::time::Duration,

    /// Worker threads available to the engine for background flushing.
    ///
    /// Default: 3.
    pub num_workers: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 100_000,
            max_latency: std::time::Duration::from_secs(10),
            num_workers: 3,
        }
    }
}

/// A buffered mutation writer attached to one table.
///
/// Submitted mutations are buffered until a [WriterConfig] threshold is
/// reached or [BufferedWriter::flush] is called explicitly. Flush has
/// durability-before-return semantics: when it resolves, every previously
/// submitted mutation is applied.
pub trait BufferedWriter: 'static + Send + Sync + std::fmt::Debug {
    /// Submit mutations into the buffer.
    fn submit(
        &self,
        mutations: Vec<Mutation>,
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// Flush the buffer, returning once everything submitted so far is
    /// durably applied.
    fn flush(&self) -> BoxFuture<'_, StoreResult<()>>;
}

/// Trait-object version of [BufferedWriter].
pub type DynBufferedWriter = Arc<dyn BufferedWriter>;

/// A server-side scan transform.
///
/// Applied by the engine, per row, before results cross the network: the
/// transform consumes all matching cells of one row and emits replacement
/// cells (typically exactly one). Transforms share no client-side state.
pub trait ScanTransform: 'static + Send + Sync + std::fmt::Debug {
    /// Transform all cells of one row.
    fn apply(&self, row: &str, cells: Vec<Cell>) -> StoreResult<Vec<Cell>>;
}

/// Trait-object version of [ScanTransform].
pub type DynScanTransform = Arc<dyn ScanTransform>;

/// A server-side associative merge over cell values sharing a key.
///
/// Registered against specific column families and applied both when
/// buffered mutations are folded into the table (compaction time) and at
/// scan time. The engine only ever passes values whose cells share the
/// exact `(row, family, qualifier, visibility)` key. Applying the combiner
/// to a single value must be the identity.
pub trait CellCombiner: 'static + Send + Sync + std::fmt::Debug {
    /// Combine the given values into one.
    fn combine(
        &self,
        values: Vec<bytes::Bytes>,
    ) -> StoreResult<bytes::Bytes>;
}

/// Trait-object version of [CellCombiner].
pub type DynCellCombiner = Arc<dyn CellCombiner>;

/// A lazy stream of scanned cells.
pub type CellStream = BoxStream<'static, StoreResult<Cell>>;

/// The API a storage engine must implement to back a bucketlog store.
pub trait TabletEngine: 'static + Send + Sync + std::fmt::Debug {
    /// Create a table if it does not already exist.
    ///
    /// A table that already exists is success, not an error, so that
    /// concurrent initializers cannot race each other into failure.
    fn create_table_if_absent(
        &self,
        table: String,
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// Open a buffered writer against the given table.
    fn buffered_writer(
        &self,
        table: String,
        config: WriterConfig,
    ) -> BoxFuture<'_, StoreResult<DynBufferedWriter>>;

    /// Register a named scan transform on a table.
    ///
    /// Transforms are keyed by name and applied in ascending priority
    /// order when a scan requests them.
    fn register_scan_transform(
        &self,
        table: String,
        name: String,
        priority: u32,
        transform: DynScanTransform,
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// Register a combiner on a table for the given column families.
    ///
    /// Combiners are keyed by name, ordered by priority, and applied both
    /// at scan time and when buffered mutations are folded into the table.
    fn register_combiner(
        &self,
        table: String,
        name: String,
        priority: u32,
        families: Vec<String>,
        combiner: DynCellCombiner,
    ) -> BoxFuture<'_, StoreResult<()>>;

    /// Forward range scan over `[range.start, range.end]`.
    ///
    /// Cells are returned ascending by `(row, family, qualifier)`,
    /// filtered by the authorization predicate, with the named scan
    /// transform (if any) applied engine-side.
    fn scan(
        &self,
        table: String,
        range: RowRange,
        auths: Authorizations,
        transform: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Vec<Cell>>>;

    /// Parallel scan across a set of discontinuous row ranges with bounded
    /// concurrency.
    ///
    /// No cross-range ordering is guaranteed. Dropping the returned stream
    /// releases all outstanding scans.
    fn batch_scan(
        &self,
        table: String,
        ranges: Vec<RowRange>,
        auths: Authorizations,
        num_workers: usize,
    ) -> BoxFuture<'_, StoreResult<CellStream>>;
}

/// Trait-object version of [TabletEngine].
pub type DynTabletEngine = Arc<dyn TabletEngine>;
