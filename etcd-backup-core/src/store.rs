//! Revision-ordered backup storage on top of an [`ObjectStore`].
//!
//! A backup is first staged into a scratch file next to the process, then
//! handed to the object store in one put. The scratch file is removed when the
//! staging handle drops, so it is gone after success, after failure, and when
//! the surrounding future is cancelled.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::contract::{ObjectStore, SnapshotStream};
use crate::error::{ConfigError, StoreError};
use crate::record::{self, BackupRecord, Revision};

pub struct VersionedStore<O> {
    objects: O,
    scratch_dir: PathBuf,
    /// Serialises puts; at most one upload is in flight per store.
    upload_lock: Mutex<()>,
}

impl<O: ObjectStore> VersionedStore<O> {
    /// Wrap `objects`, staging into an existing `scratch_dir`.
    pub fn new(objects: O, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects,
            scratch_dir: scratch_dir.into(),
            upload_lock: Mutex::new(()),
        }
    }

    /// Like [`VersionedStore::new`], but creates `scratch_dir` (owner-only)
    /// first.
    pub fn open(objects: O, scratch_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let scratch_dir = scratch_dir.into();
        create_private_dir(&scratch_dir).map_err(|source| ConfigError::ScratchDir {
            path: scratch_dir.clone(),
            source,
        })?;
        debug!(dir = %scratch_dir.display(), "Scratch directory ready");
        Ok(Self::new(objects, scratch_dir))
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Stage `stream` to disk and upload it as `<version>_<revision>_etcd.backup`.
    /// Returns the number of bytes stored. Nothing is uploaded unless the
    /// stream was read to its end.
    pub async fn put(
        &self,
        software_version: &str,
        revision: Revision,
        mut stream: SnapshotStream,
    ) -> Result<u64, StoreError> {
        let _guard = self.upload_lock.lock().await;
        let key = BackupRecord::new(software_version, revision).key();

        let staged = tempfile::Builder::new()
            .prefix(&key)
            .tempfile_in(&self.scratch_dir)
            .map_err(StoreError::Scratch)?;
        let mut file = tokio::fs::File::from_std(staged.as_file().try_clone().map_err(StoreError::Scratch)?);

        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(StoreError::Snapshot)?;
            file.write_all(&chunk).await.map_err(StoreError::Scratch)?;
            bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(StoreError::Scratch)?;
        file.sync_all().await.map_err(StoreError::Scratch)?;
        drop(file);
        debug!(key = %key, bytes, path = %staged.path().display(), "Snapshot staged");

        self.objects
            .put(&key, staged.path())
            .await
            .map_err(|source| StoreError::Upload {
                key: key.clone(),
                source,
            })?;
        info!(key = %key, bytes, "Backup uploaded");

        if let Err(e) = staged.close() {
            warn!(error = %e, "Failed to remove scratch file");
        }
        Ok(bytes)
    }

    /// Every object name currently stored.
    pub async fn list(&self) -> Result<HashSet<String>, StoreError> {
        let names = self.objects.list().await.map_err(StoreError::List)?;
        Ok(names.into_iter().collect())
    }

    /// The newest backup by revision, or `None` when nothing valid is stored.
    pub async fn get_latest(&self) -> Result<Option<BackupRecord>, StoreError> {
        let names = self.list().await?;
        let latest = record::latest(&names);
        match &latest {
            Some(record) => info!(key = %record.key(), revision = record.revision, "Found latest backup"),
            None => info!("No backups stored yet"),
        }
        Ok(latest)
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    std::fs::DirBuilder::new().recursive(true).create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockObjectStore;
    use futures::stream;
    use mockall::predicate::eq;
    use tempfile::tempdir;

    fn snapshot(chunks: Vec<io::Result<Vec<u8>>>) -> SnapshotStream {
        stream::iter(chunks).boxed()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn put_uploads_staged_file_and_cleans_up() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects
            .expect_put()
            .with(eq("3.2.0_000000000000000c_etcd.backup"), mockall::predicate::always())
            .times(1)
            .returning(|_, path| {
                let content = std::fs::read(path)?;
                assert_eq!(content, b"hello world");
                Ok(())
            });

        let store = VersionedStore::new(objects, dir.path());
        let bytes = store
            .put("3.2.0", 12, snapshot(vec![Ok(b"hello ".to_vec()), Ok(b"world".to_vec())]))
            .await
            .expect("put succeeds");

        assert_eq!(bytes, 11);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn broken_stream_uploads_nothing() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects.expect_put().never();

        let store = VersionedStore::new(objects, dir.path());
        let err = store
            .put(
                "3.2.0",
                12,
                snapshot(vec![
                    Ok(b"partial".to_vec()),
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "member went away")),
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Snapshot(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_upload_cleans_up() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects
            .expect_put()
            .times(1)
            .returning(|_, _| Err("access denied".into()));

        let store = VersionedStore::new(objects, dir.path());
        let err = store
            .put("3.2.0", 1, snapshot(vec![Ok(b"data".to_vec())]))
            .await
            .unwrap_err();

        match err {
            StoreError::Upload { key, .. } => assert_eq!(key, "3.2.0_0000000000000001_etcd.backup"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn get_latest_picks_highest_revision() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects.expect_list().returning(|| {
            Ok(vec![
                "3.2.0_0000000000000005_etcd.backup".into(),
                "3.2.0_000000000000000a_etcd.backup".into(),
                "not-a-backup".into(),
            ])
        });

        let store = VersionedStore::new(objects, dir.path());
        let latest = store.get_latest().await.expect("listing works");
        assert_eq!(latest, Some(BackupRecord::new("3.2.0", 10)));
    }

    #[tokio::test]
    async fn empty_store_has_no_latest() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects.expect_list().returning(|| Ok(vec![]));

        let store = VersionedStore::new(objects, dir.path());
        assert_eq!(store.get_latest().await.expect("listing works"), None);
    }

    #[tokio::test]
    async fn list_failure_is_surfaced() {
        let dir = tempdir().unwrap();
        let mut objects = MockObjectStore::new();
        objects.expect_list().returning(|| Err("no such bucket".into()));

        let store = VersionedStore::new(objects, dir.path());
        assert!(matches!(store.get_latest().await, Err(StoreError::List(_))));
    }

    #[cfg(unix)]
    #[test]
    fn open_creates_owner_only_scratch_dir() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempdir().unwrap();
        let scratch = root.path().join("v1").join("example").join("tmp");
        let store = VersionedStore::open(MockObjectStore::new(), &scratch).expect("dir is created");

        assert_eq!(store.scratch_dir(), scratch.as_path());
        let mode = std::fs::metadata(&scratch).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
