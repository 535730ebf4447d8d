use std::path::PathBuf;

use thiserror::Error;

use crate::model::NodeId;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no entry with id {0} in the snapshot")]
    UnknownId(NodeId),
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to read tree file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tree in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
