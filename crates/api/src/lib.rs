#![deny(missing_docs)]
//! Bucketlog API contains the storage-engine boundary traits and the basic
//! types shared between the bucketlog store and engine implementations.
//!
//! If you want to use the store itself, please see the bucketlog crate.

mod error;
pub use error::*;

mod timestamp;
pub use timestamp::*;

pub mod entry;
pub use entry::*;

pub mod metric;
pub use metric::*;

pub mod tablet;
pub use tablet::*;
