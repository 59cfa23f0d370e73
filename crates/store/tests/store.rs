//! Full-stack tests of the changelog store over the in-memory engine.

use bucketlog::{BucketSize, ChangelogStore, StoreConfig};
use bucketlog_api::*;
use bucketlog_memory::MemoryTabletEngine;
use bucketlog_test_utils::{enable_tracing, test_entry};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;

const W: i64 = 1_800_000;

fn ts(millis: i64) -> Timestamp {
    Timestamp::from_millis(millis)
}

async fn test_store(engine: &DynTabletEngine) -> ChangelogStore {
    ChangelogStore::create(
        engine.clone(),
        Arc::new(JsonEntrySerializer),
        StoreConfig::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn put_then_get_changes_round_trip() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;

    // Two entries in bucket 0, one in bucket 1.
    let entries = vec![
        test_entry("a", ts(10)),
        test_entry("b", ts(20)),
        test_entry("c", ts(W + 5)),
    ];
    store.put(entries.clone()).await.unwrap();

    let mut got: Vec<Entry> = store
        .get_changes(vec![ts(0), ts(W)])
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    got.sort();
    assert_eq!(entries, got);
}

#[tokio::test]
async fn entries_within_a_bucket_stream_newest_first() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;

    store
        .put(vec![
            test_entry("old", ts(10)),
            test_entry("new", ts(500)),
            test_entry("mid", ts(200)),
        ])
        .await
        .unwrap();

    let ids: Vec<String> = store
        .get_changes(vec![ts(0)])
        .await
        .unwrap()
        .map(|e| e.unwrap().id)
        .collect()
        .await;
    assert_eq!(vec!["new", "mid", "old"], ids);
}

#[tokio::test]
async fn duplicate_bucket_timestamps_fetch_once() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;
    store.put(vec![test_entry("a", ts(10))]).await.unwrap();

    // Three timestamps, one bucket.
    let got: Vec<_> = store
        .get_changes(vec![ts(0), ts(10), ts(W - 1)])
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(1, got.len());
}

#[tokio::test]
async fn replicas_with_equal_data_build_equal_trees() {
    enable_tracing();

    let stop = ts(5 * W + 123);
    let mut roots = Vec::new();
    for order in [[0usize, 1, 2], [2, 0, 1]] {
        let engine = MemoryTabletEngine::create();
        let store = test_store(&engine).await;
        let entries = [
            test_entry("a", ts(10)),
            test_entry("b", ts(2 * W + 7)),
            test_entry("c", ts(4 * W)),
        ];
        // Insertion order must not matter.
        for i in order {
            store.put(vec![entries[i].clone()]).await.unwrap();
        }
        let tree = store.get_change_tree(ts(0), stop).await.unwrap();
        assert_eq!(6, tree.leaves().len());
        roots.push(tree.root_hash().to_string());
    }
    assert_eq!(roots[0], roots[1]);
}

#[tokio::test]
async fn divergent_replicas_disagree_at_the_divergent_leaf() {
    enable_tracing();

    let make = |extra: Option<Entry>| async move {
        let engine = MemoryTabletEngine::create();
        let store = test_store(&engine).await;
        let mut entries = vec![
            test_entry("a", ts(10)),
            test_entry("b", ts(3 * W + 7)),
        ];
        entries.extend(extra);
        store.put(entries).await.unwrap();
        store.get_change_tree(ts(0), ts(4 * W)).await.unwrap()
    };

    let ours = make(None).await;
    let theirs = make(Some(test_entry("x", ts(W + 1)))).await;

    // Same shape regardless of content.
    assert_eq!(ours.num_levels(), theirs.num_levels());
    assert_eq!(ours.num_nodes(), theirs.num_nodes());
    assert_ne!(ours.root_hash(), theirs.root_hash());

    // Only bucket 1 diverges.
    let disagreeing: Vec<usize> = (0..4)
        .filter(|i| {
            ours.leaves()[*i].digest != theirs.leaves()[*i].digest
        })
        .collect();
    assert_eq!(vec![1], disagreeing);
    assert_eq!(
        ts(W),
        theirs.leaves()[1].bucket_timestamp
    );
}

#[tokio::test]
async fn change_tree_pads_an_empty_window() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;

    let tree = store.get_change_tree(ts(0), ts(3 * W)).await.unwrap();
    assert_eq!(3, tree.leaves().len());
    assert!(tree.leaves().iter().all(|l| l.digest.is_empty()));
}

#[tokio::test]
async fn a_boundary_stop_does_not_change_the_tree_shape() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;
    // Data only in the 90 minute bucket of a [0, 120min) window.
    store.put(vec![test_entry("d", ts(3 * W + 9))]).await.unwrap();

    let at_boundary =
        store.get_change_tree(ts(0), ts(4 * W)).await.unwrap();
    let inside =
        store.get_change_tree(ts(0), ts(4 * W - 1)).await.unwrap();

    // The bucket starting at stop stays out of the window.
    assert_eq!(4, at_boundary.leaves().len());
    assert_eq!(2, at_boundary.num_levels());
    assert!(at_boundary.leaves()[..3]
        .iter()
        .all(|l| l.digest.is_empty()));
    assert!(!at_boundary.leaves()[3].digest.is_empty());
    assert_eq!(ts(3 * W), at_boundary.leaves()[3].bucket_timestamp);

    assert_eq!(at_boundary.root_hash(), inside.root_hash());
    assert_eq!(at_boundary.num_nodes(), inside.num_nodes());
}

#[tokio::test]
async fn degenerate_windows_are_rejected() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;
    let e = store.get_change_tree(ts(W), ts(0)).await.unwrap_err();
    assert!(matches!(e, StoreError::InvalidTimestamp { .. }));
    let e = store.get_change_tree(ts(W), ts(W)).await.unwrap_err();
    assert!(matches!(e, StoreError::InvalidTimestamp { .. }));
}

#[tokio::test]
async fn negative_timestamps_require_opt_in() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;
    let e = store
        .put(vec![test_entry("a", ts(-10))])
        .await
        .unwrap_err();
    assert!(matches!(e, StoreError::InvalidTimestamp { .. }));

    let permissive = ChangelogStore::create(
        engine.clone(),
        Arc::new(JsonEntrySerializer),
        StoreConfig {
            allow_negative_timestamps: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    permissive
        .put(vec![test_entry("a", ts(-10))])
        .await
        .unwrap();

    let got: Vec<_> = permissive
        .get_changes(vec![ts(-10)])
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert_eq!(1, got.len());
    assert_eq!(ts(-10), got[0].timestamp);

    let tree = permissive
        .get_change_tree(ts(-10), ts(0))
        .await
        .unwrap();
    assert_eq!(1, tree.leaves().len());
    assert_eq!(ts(-W), tree.leaves()[0].bucket_timestamp);
    assert!(!tree.leaves()[0].digest.is_empty());
}

#[tokio::test]
async fn unauthorized_entries_are_invisible_everywhere() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = test_store(&engine).await;
    let mut secret = test_entry("s", ts(10));
    secret.visibility = "secret".into();
    store
        .put(vec![test_entry("open", ts(20)), secret.clone()])
        .await
        .unwrap();

    let blind_tree =
        store.get_change_tree(ts(0), ts(W)).await.unwrap();
    let got: Vec<_> = store
        .get_changes(vec![ts(0)])
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert_eq!(1, got.len());
    assert_eq!("open", got[0].id);

    let cleared = ChangelogStore::create(
        engine.clone(),
        Arc::new(JsonEntrySerializer),
        StoreConfig {
            authorizations: Authorizations::new(["secret"]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let got: Vec<_> = cleared
        .get_changes(vec![ts(0)])
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert_eq!(2, got.len());

    // The digest reflects only what the reader may see.
    let cleared_tree =
        cleared.get_change_tree(ts(0), ts(W)).await.unwrap();
    assert_ne!(blind_tree.root_hash(), cleared_tree.root_hash());
}

/// Serializer that refuses one entry id, for batch abort tests.
#[derive(Debug)]
struct FailingSerializer {
    poison: String,
}

impl EntrySerializer for FailingSerializer {
    fn serialize(&self, entry: &Entry) -> StoreResult<bytes::Bytes> {
        if entry.id == self.poison {
            return Err(StoreError::other("refused"));
        }
        JsonEntrySerializer.serialize(entry)
    }

    fn deserialize(&self, data: &[u8]) -> StoreResult<Entry> {
        JsonEntrySerializer.deserialize(data)
    }
}

#[tokio::test]
async fn one_bad_entry_aborts_the_whole_batch() {
    enable_tracing();

    let engine = MemoryTabletEngine::create();
    let store = ChangelogStore::create(
        engine.clone(),
        Arc::new(FailingSerializer {
            poison: "bad".into(),
        }),
        StoreConfig::default(),
    )
    .await
    .unwrap();

    let e = store
        .put(vec![
            test_entry("good1", ts(10)),
            test_entry("bad", ts(20)),
            test_entry("good2", ts(30)),
        ])
        .await
        .unwrap_err();
    assert!(matches!(e, StoreError::WriteFailure { .. }));

    // Nothing from the batch was applied.
    let got: Vec<_> = store
        .get_changes(vec![ts(0)])
        .await
        .unwrap()
        .collect()
        .await;
    assert!(got.is_empty());
}

/// Engine wrapper that fails scans of one poisoned row, for stream error
/// propagation tests.
#[derive(Debug)]
struct FailingEngine {
    inner: DynTabletEngine,
    poison_row: std::sync::Mutex<Option<String>>,
}

impl FailingEngine {
    fn poison(&self, row: String) {
        *self.poison_row.lock().unwrap() = Some(row);
    }
}

impl TabletEngine for FailingEngine {
    fn create_table_if_absent(
        &self,
        table: String,
    ) -> BoxFuture<'_, StoreResult<()>> {
        self.inner.create_table_if_absent(table)
    }

    fn buffered_writer(
        &self,
        table: String,
        config: WriterConfig,
    ) -> BoxFuture<'_, StoreResult<DynBufferedWriter>> {
        self.inner.buffered_writer(table, config)
    }

    fn register_scan_transform(
        &self,
        table: String,
        name: String,
        priority: u32,
        transform: DynScanTransform,
    ) -> BoxFuture<'_, StoreResult<()>> {
        self.inner
            .register_scan_transform(table, name, priority, transform)
    }

    fn register_combiner(
        &self,
        table: String,
        name: String,
        priority: u32,
        families: Vec<String>,
        combiner: DynCellCombiner,
    ) -> BoxFuture<'_, StoreResult<()>> {
        self.inner
            .register_combiner(table, name, priority, families, combiner)
    }

    fn scan(
        &self,
        table: String,
        range: RowRange,
        auths: Authorizations,
        transform: Option<String>,
    ) -> BoxFuture<'_, StoreResult<Vec<Cell>>> {
        self.inner.scan(table, range, auths, transform)
    }

    fn batch_scan(
        &self,
        table: String,
        ranges: Vec<RowRange>,
        auths: Authorizations,
        num_workers: usize,
    ) -> BoxFuture<'_, StoreResult<CellStream>> {
        let poison = self.poison_row.lock().unwrap().clone();
        let (bad, good): (Vec<_>, Vec<_>) =
            ranges.into_iter().partition(|r| {
                poison.as_deref().is_some_and(|p| r.contains(p))
            });
        async move {
            let inner = self
                .inner
                .batch_scan(table, good, auths, num_workers)
                .await?;
            let failures = futures::stream::iter(bad).map(|_| {
                Err(StoreError::other("injected scan failure"))
            });
            Ok(inner.chain(failures).boxed())
        }
        .boxed()
    }
}

#[tokio::test]
async fn a_failed_bucket_does_not_end_the_stream() {
    enable_tracing();

    let engine = Arc::new(FailingEngine {
        inner: MemoryTabletEngine::create(),
        poison_row: std::sync::Mutex::new(None),
    });
    let store = test_store(&(engine.clone() as DynTabletEngine)).await;

    store
        .put(vec![
            test_entry("a", ts(10)),
            test_entry("b", ts(W + 10)),
            test_entry("c", ts(2 * W + 10)),
        ])
        .await
        .unwrap();

    let poison_row = bucketlog::BucketKeyCodec::new(false)
        .bucket_row(ts(W), BucketSize::HalfHour)
        .unwrap();
    engine.poison(poison_row);

    let results: Vec<_> = store
        .get_changes(vec![ts(0), ts(W), ts(2 * W)])
        .await
        .unwrap()
        .collect()
        .await;

    let mut ok: Vec<String> = results
        .iter()
        .filter_map(|r| r.as_ref().ok().map(|e| e.id.clone()))
        .collect();
    ok.sort();
    assert_eq!(vec!["a".to_string(), "c".to_string()], ok);
    assert_eq!(1, results.iter().filter(|r| r.is_err()).count());
}
