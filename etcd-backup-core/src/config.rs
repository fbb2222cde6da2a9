use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1800);

/// Upper bound for any configured member timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Where scratch copies of snapshots are kept before upload.
pub const BACKUP_MOUNT_DIR: &str = "/var/etcd-backup";

/// Layout version segment used in both scratch paths and bucket prefixes.
pub const LAYOUT_VERSION: &str = "v1";

const SCRATCH_DIR: &str = "tmp";

/// Startup descriptor for one backup process, as handed over by the launcher
/// (JSON in `BACKUP_SPEC`, or the `spec` section of the config file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub s3: Option<S3SourceSpec>,
    /// Seconds between two backups; unset or zero means the default.
    #[serde(default)]
    pub backup_interval_in_second: Option<u64>,
}

/// Raw S3 section of a [`BackupSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3SourceSpec {
    /// Bucket name; overrides the process-wide default bucket.
    #[serde(default)]
    pub s3_bucket: String,
    /// Prefix placed in front of `v1/<namespace>/<cluster>`.
    #[serde(default)]
    pub prefix: String,
    /// Directory holding the AWS `credentials` and `config` files.
    #[serde(default)]
    pub aws_secret: String,
}

/// Validated storage backend, one variant per supported `storageType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSource {
    S3(S3Source),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Source {
    pub bucket: String,
    pub prefix: String,
    pub credential_reference: Option<String>,
}

impl BackupSpec {
    /// Validate the storage part of the descriptor. `default_bucket` is used
    /// when the spec leaves the bucket name empty.
    pub fn storage_source(&self, default_bucket: Option<&str>) -> Result<StorageSource, ConfigError> {
        match self.storage_type.as_str() {
            "s3" => {
                let s3 = self
                    .s3
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingStorageSource(self.storage_type.clone()))?;
                let bucket = match (s3.s3_bucket.trim(), default_bucket.map(str::trim)) {
                    (own, _) if !own.is_empty() => own.to_string(),
                    (_, Some(default)) if !default.is_empty() => default.to_string(),
                    _ => {
                        return Err(ConfigError::InvalidStorageSource(
                            "s3 bucket name is empty".into(),
                        ))
                    }
                };
                let credential_reference =
                    Some(s3.aws_secret.trim()).filter(|s| !s.is_empty()).map(String::from);
                info!(bucket = %bucket, prefix = %s3.prefix, "Validated s3 storage source");
                Ok(StorageSource::S3(S3Source {
                    bucket,
                    prefix: s3.prefix.clone(),
                    credential_reference,
                }))
            }
            other => Err(ConfigError::UnsupportedStorageType(other.to_string())),
        }
    }

    /// Interval between two backups.
    pub fn interval(&self) -> Duration {
        effective_interval(self.backup_interval_in_second)
    }
}

/// Unset or zero falls back to [`DEFAULT_SNAPSHOT_INTERVAL`].
pub fn effective_interval(seconds: Option<u64>) -> Duration {
    match seconds {
        Some(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            debug!("No backup interval configured, using default");
            DEFAULT_SNAPSHOT_INTERVAL
        }
    }
}

/// Timeouts applied to member connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub dial: Duration,
    pub request: Duration,
    /// Covers the snapshot request and the whole transfer.
    pub snapshot: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dial: DEFAULT_DIAL_TIMEOUT,
            request: DEFAULT_REQUEST_TIMEOUT,
            snapshot: DEFAULT_SNAPSHOT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Build from optional second counts, each falling back to its default.
    /// Values above [`MAX_TIMEOUT`] are rejected.
    pub fn from_seconds(
        dial: Option<u64>,
        request: Option<u64>,
        snapshot: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            dial: bounded_timeout("dial", dial, defaults.dial)?,
            request: bounded_timeout("request", request, defaults.request)?,
            snapshot: bounded_timeout("snapshot", snapshot, defaults.snapshot)?,
        })
    }

    /// Budget for one short call: connect plus one request.
    pub fn short_call(&self) -> Duration {
        self.dial.saturating_add(self.request)
    }
}

fn bounded_timeout(name: &'static str, seconds: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match seconds {
        None => Ok(default),
        Some(secs) if Duration::from_secs(secs) <= MAX_TIMEOUT => Ok(Duration::from_secs(secs)),
        Some(secs) => Err(ConfigError::TimeoutOutOfRange {
            name,
            seconds: secs,
            max: MAX_TIMEOUT.as_secs(),
        }),
    }
}

/// Key prefix for a cluster's backups: `<prefix>/v1/<namespace>/<cluster>`.
/// Empty segments and stray slashes are dropped.
pub fn s3_key_prefix(prefix: &str, namespace: &str, cluster_name: &str) -> String {
    [prefix, LAYOUT_VERSION, namespace, cluster_name]
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Scratch directory for a cluster: `<backup_dir>/v1/<cluster>/tmp`.
pub fn scratch_dir(backup_dir: &Path, cluster_name: &str) -> PathBuf {
    backup_dir
        .join(LAYOUT_VERSION)
        .join(cluster_name)
        .join(SCRATCH_DIR)
}
