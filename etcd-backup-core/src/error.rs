//! Error types for the backup engine.
//!
//! Only [`ConfigError`] is fatal. Everything raised during a scheduling tick is
//! folded into [`BackupError`], logged, and the loop moves on to the next tick.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::contract::BoxError;

/// Raised while building the engine from its startup descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported storage type: {0:?}")]
    UnsupportedStorageType(String),

    #[error("storage type {0:?} requires a matching storage source section")]
    MissingStorageSource(String),

    #[error("invalid storage source: {0}")]
    InvalidStorageSource(String),

    #[error("cluster name is not set")]
    MissingClusterName,

    #[error("{name} timeout of {seconds}s exceeds the maximum of {max}s")]
    TimeoutOutOfRange {
        name: &'static str,
        seconds: u64,
        max: u64,
    },

    #[error("failed to prepare scratch directory {}: {source}", path.display())]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// No member could be selected as backup source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no running members")]
    NoRunningMembers,

    #[error("no reachable member")]
    NoReachableMember,

    #[error("failed to list running members: {0}")]
    Listing(#[source] BoxError),
}

/// Failure while pulling a snapshot from a member, tagged by stage.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to get status of member {member}: {source}")]
    Status {
        member: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to request snapshot from member {member}: {source}")]
    SnapshotRequest {
        member: String,
        #[source]
        source: BoxError,
    },

    #[error("snapshot stream from member {member} broke off: {source}")]
    Stream {
        member: String,
        #[source]
        source: io::Error,
    },
}

/// Failure while staging, uploading or listing backups.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write snapshot scratch file: {0}")]
    Scratch(#[source] io::Error),

    #[error("failed to read snapshot stream: {0}")]
    Snapshot(#[source] io::Error),

    #[error("failed to upload backup {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to list backups: {0}")]
    List(#[source] BoxError),
}

/// A listed object name that is not a backup key. Scoped to that one entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRecordError {
    #[error("bad backup name {0:?}: expected <version>_<revision>_etcd.backup")]
    Shape(String),

    #[error("bad backup name {0:?}: missing etcd.backup suffix")]
    Suffix(String),

    #[error("bad backup name {name:?}: revision {revision:?} is not a hex integer")]
    Revision { name: String, revision: String },
}

/// Everything that can end a single scheduling tick early.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
