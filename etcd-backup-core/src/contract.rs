#![allow(unused)]

//! # contract: collaborator interfaces of the backup engine
//!
//! The engine talks to three things it does not own: the etcd members, whoever
//! knows which members are running, and the object store that keeps the
//! backups. Each of them sits behind one trait here.
//!
//! ## Interface & Extensibility
//! - Implement [`MemberClient`] for a real etcd client (see the `etcd-backup` crate).
//! - Implement [`ObjectStore`] for a storage backend (S3 in the `etcd-backup` crate).
//! - Implement [`MemberDiscovery`] for whatever supplies the running member list.
//! - All methods are async and return [`BoxError`] on failure; the engine wraps
//!   these into its own typed errors with stage information.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`. With the default
//!   `test-export-mocks` feature the generated `Mock*` types are exported, so
//!   integration tests can script collaborators deterministically.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use mockall::{automock, predicate::*};

use crate::member::Member;
use crate::record::Revision;

/// Boxed error returned by every collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Chunked snapshot bytes. The stream owns whatever connection produces it and
/// releases it when dropped.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Client for individual etcd members.
///
/// Every call opens its own connection and closes it before returning; for
/// [`MemberClient::snapshot`] the connection is closed when the returned
/// stream is dropped. Nothing is pooled across calls.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MemberClient: Send + Sync {
    /// Header revision of a serializable read against the member.
    async fn current_revision(&self, member: &Member) -> Result<Revision, BoxError>;

    /// Software version reported by the member's status endpoint.
    async fn software_version(&self, member: &Member) -> Result<String, BoxError>;

    /// Open a full snapshot stream from the member.
    async fn snapshot(&self, member: &Member) -> Result<SnapshotStream, BoxError>;
}

/// Supplies the members currently running for a cluster.
///
/// The engine trusts the answer as-is; filtering to running members is the
/// implementor's job.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MemberDiscovery: Send + Sync {
    async fn running_members(&self, cluster_name: &str) -> Result<Vec<Member>, BoxError>;
}

/// Flat object store scoped to one key prefix.
///
/// Names passed in and returned are relative to the implementor's prefix.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under `name` in one atomic put. A failed put must
    /// not leave a readable object behind.
    async fn put(&self, name: &str, source: &Path) -> Result<(), BoxError>;

    /// Every object name under the prefix, in no particular order.
    async fn list(&self) -> Result<Vec<String>, BoxError>;
}
