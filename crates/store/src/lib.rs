#![deny(missing_docs)]
//! A time-bucketed append log layered on a sorted, range-scannable
//! key-value store.
//!
//! The store groups entries into fixed-width time buckets and encodes
//! bucket and entry timestamps as reverse-sorted row keys, so that a
//! forward scan over the backing store walks chronologically backwards
//! ("most recent first" is the cheap direction). On top of that layout it
//! offers two capabilities:
//!
//! - Anti-entropy support: a per-bucket digest is computed server-side by
//!   a pushdown aggregator, and a fixed-shape merkle tree is built from a
//!   gap-padded sequence of those digests. Two replicas that build trees
//!   over the same window always get structurally identical trees, so
//!   node-by-node comparison can localize divergent buckets without
//!   transferring the buckets themselves. Comparison and repair are out of
//!   scope here, the shape contract is what this crate guarantees.
//! - Continuous aggregation: numeric observations are reduced into
//!   per-bucket `{min, max, sum, count, sum_square}` statistics by an
//!   associative, commutative combiner that the storage tier applies at
//!   both compaction and scan time, so raw observations never cross the
//!   network.
//!
//! The backing store itself is an external collaborator, abstracted by
//! [bucketlog_api::TabletEngine]. See `bucketlog_memory` for the
//! reference in-memory engine used throughout the tests.

pub mod bucket;
pub use bucket::*;

pub mod codec;
pub use codec::*;

pub mod config;
pub use config::*;

pub mod digest;
pub use digest::*;

pub mod stats;
pub use stats::*;

pub mod tree;
pub use tree::*;

pub mod features;
pub use features::*;

mod reader;
mod writer;

pub mod store;
pub use store::*;
