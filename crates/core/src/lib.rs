//! Align two revisions of a submission's file tree and cache the content
//! fetched for them.

pub mod cache;
pub mod error;
pub mod export;
pub mod matcher;
pub mod model;
pub mod search;
pub mod snapshot;

pub use cache::{CacheConfig, CacheStats, ContentCache};
pub use error::{SnapshotError, TreeError};
pub use matcher::{match_trees, FileTreeDiff, Revision, RevisionTable, Side};
pub use model::*;
pub use search::{DiffStatus, FuzzyHit, Leaf};
pub use snapshot::{read_tree, Snapshot};
