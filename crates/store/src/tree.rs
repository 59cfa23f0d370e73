//! Change-tree assembly.
//!
//! The merkle tree built here is the unit replicas exchange for
//! anti-entropy. Its shape is a pure function of the query window and the
//! branching factor: every bucket overlapping the half-open window
//! `[start, stop)` gets exactly one leaf, with empty-digest leaves padding
//! the buckets that hold no entries. A `stop` on a bucket boundary
//! excludes its own bucket. Two replicas building trees over the same
//! window with the same [crate::BucketSize] therefore always get
//! structurally identical trees, and comparing them node by node
//! localizes divergent buckets.

use crate::BucketSize;
use bucketlog_api::{StoreError, StoreResult, Timestamp};
use sha2::{Digest, Sha256};

/// The default branching factor.
pub const DEFAULT_BRANCHING: usize = 4;

/// One leaf of a change tree: the digest of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHashLeaf {
    /// The bucket digest. Empty for a bucket holding no entries.
    pub digest: String,

    /// The bucket start timestamp.
    pub bucket_timestamp: Timestamp,
}

/// Expand scanned digest rows into the full gap-padded leaf sequence for
/// the half-open window `[start, stop)`, ascending by bucket timestamp.
///
/// `rows` are `(bucket timestamp, digest)` pairs in reverse-chronological
/// order, exactly as a forward scan over the reversed key space yields
/// them. Rows that are misaligned, outside the window, or out of order are
/// rejected with [StoreError::InvalidBucketBoundary]. An empty window
/// (`stop <= start`) yields no leaves.
pub fn assemble_leaves(
    rows: Vec<(Timestamp, String)>,
    start: Timestamp,
    stop: Timestamp,
    size: BucketSize,
) -> StoreResult<Vec<BucketHashLeaf>> {
    if stop.as_millis() <= start.as_millis() {
        return Ok(Vec::new());
    }
    let width = size.width_ms();
    let first = size.truncate(start);
    let last = size.truncate_end(stop);

    let mut leaves = Vec::new();
    let mut expected = last;
    // A non-empty window always has at least the `first` bucket left to
    // emit.
    let mut pending = true;

    for (ts, digest) in rows {
        if size.truncate(ts) != ts {
            return Err(StoreError::invalid_bucket_boundary(format!(
                "bucket timestamp {} is not a multiple of {width}",
                ts.as_millis()
            )));
        }
        if !pending
            || ts.as_millis() > expected.as_millis()
            || ts.as_millis() < first.as_millis()
        {
            return Err(StoreError::invalid_bucket_boundary(format!(
                "bucket timestamp {} outside window or out of order",
                ts.as_millis()
            )));
        }
        while expected.as_millis() > ts.as_millis() {
            leaves.push(BucketHashLeaf {
                digest: String::new(),
                bucket_timestamp: expected,
            });
            expected = Timestamp::from_millis(expected.as_millis() - width);
        }
        leaves.push(BucketHashLeaf {
            digest,
            bucket_timestamp: ts,
        });
        if ts == first {
            pending = false;
        } else {
            expected = Timestamp::from_millis(ts.as_millis() - width);
        }
    }

    // Pad the remaining tail down to and including the first bucket.
    while pending {
        leaves.push(BucketHashLeaf {
            digest: String::new(),
            bucket_timestamp: expected,
        });
        if expected == first {
            break;
        }
        expected = Timestamp::from_millis(expected.as_millis() - width);
    }

    leaves.reverse();
    Ok(leaves)
}

/// A fixed-shape merkle tree over bucket digests.
///
/// Level 0 holds the leaf digests in ascending bucket order. Each parent
/// is the Sha256 over its up-to-`branching` children in position order,
/// with short final chunks padded by empty digests, so the shape depends
/// only on the leaf count and the branching factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    leaves: Vec<BucketHashLeaf>,
    /// Digests per level, leaves first, root level last.
    levels: Vec<Vec<String>>,
    branching: usize,
}

impl MerkleTree {
    /// Build a tree over the given leaves.
    ///
    /// A single leaf still gets one parent level, so the root is never a
    /// bare bucket digest.
    pub fn build(
        leaves: Vec<BucketHashLeaf>,
        branching: usize,
    ) -> StoreResult<MerkleTree> {
        if branching < 2 {
            return Err(StoreError::configuration(
                "merkle branching factor must be at least 2",
            ));
        }
        if leaves.is_empty() {
            return Err(StoreError::configuration(
                "cannot build a merkle tree over zero buckets",
            ));
        }

        let mut levels =
            vec![leaves.iter().map(|l| l.digest.clone()).collect::<Vec<_>>()];
        loop {
            let below = levels.last().unwrap();
            let parents: Vec<String> = below
                .chunks(branching)
                .map(|chunk| hash_children(chunk, branching))
                .collect();
            let done = parents.len() == 1;
            levels.push(parents);
            if done {
                break;
            }
        }

        Ok(MerkleTree {
            leaves,
            levels,
            branching,
        })
    }

    /// The root digest.
    pub fn root_hash(&self) -> &str {
        &self.levels.last().expect("at least two levels")[0]
    }

    /// The leaves in ascending bucket order.
    pub fn leaves(&self) -> &[BucketHashLeaf] {
        &self.leaves
    }

    /// The digests of one level, leaves at level 0.
    pub fn level(&self, depth: usize) -> Option<&[String]> {
        self.levels.get(depth).map(Vec::as_slice)
    }

    /// The number of levels, including the leaf level.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// The total node count across all levels.
    pub fn num_nodes(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// The branching factor the tree was built with.
    pub fn branching(&self) -> usize {
        self.branching
    }
}

fn hash_children(children: &[String], branching: usize) -> String {
    let mut hasher = Sha256::new();
    for i in 0..branching {
        // Missing children hash as the empty digest, the same sentinel an
        // empty bucket uses, so short chunks keep the shape stable.
        let child = children.get(i).map(String::as_str).unwrap_or("");
        hasher.update(child.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
