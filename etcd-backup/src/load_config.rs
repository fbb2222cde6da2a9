/// `load_config` module: turns the YAML config file plus the process environment
/// into one validated [`BackupConfig`].
///
/// This is the only place where untrusted YAML is parsed. Everything handed to the
/// rest of the binary is already validated: the storage source is known, the
/// cluster name is set, every member has a client URL.
///
/// # Environment
/// - `BACKUP_SPEC`: JSON backup spec, used when the file has no `spec` section.
/// - `AWS_S3_BUCKET`: default bucket when the spec leaves `s3Bucket` empty.
/// - `MY_POD_NAMESPACE`: namespace when the file sets none; falls back to `default`.
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::{anyhow, bail, Context, Result};
use etcd_backup_core::config::{BackupSpec, StorageSource, Timeouts, BACKUP_MOUNT_DIR};
use etcd_backup_core::error::ConfigError;
use etcd_backup_core::member::Member;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub const BACKUP_SPEC_ENV: &str = "BACKUP_SPEC";
pub const DEFAULT_BUCKET_ENV: &str = "AWS_S3_BUCKET";
pub const NAMESPACE_ENV: &str = "MY_POD_NAMESPACE";

const DEFAULT_NAMESPACE: &str = "default";

/// Client certificate material for secure members.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    pub ca_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub cluster_name: String,
    pub namespace: String,
    pub backup_dir: PathBuf,
    pub storage: StorageSource,
    pub interval: Duration,
    pub members: Vec<Member>,
    pub tls: Option<TlsFiles>,
    pub timeouts: Timeouts,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    namespace: Option<String>,
    backup_dir: Option<PathBuf>,
    spec: Option<BackupSpec>,
    #[serde(default)]
    members: Vec<RawMember>,
    tls: Option<TlsFiles>,
    #[serde(default)]
    timeouts: RawTimeouts,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    name: String,
    namespace: Option<String>,
    client_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTimeouts {
    dial_seconds: Option<u64>,
    request_seconds: Option<u64>,
    snapshot_seconds: Option<u64>,
}

impl RawTimeouts {
    fn resolve(&self) -> Result<Timeouts, ConfigError> {
        Timeouts::from_seconds(self.dial_seconds, self.request_seconds, self.snapshot_seconds)
    }
}

/// Load the config file at `path`. `etcd_cluster` overrides the spec's cluster name.
pub fn load_config<P: AsRef<Path>>(path: P, etcd_cluster: Option<&str>) -> Result<BackupConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    // An empty file is a valid config that takes everything from the environment.
    let raw: RawConfig = match serde_yaml::from_str::<Option<RawConfig>>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf.unwrap_or_default()
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let mut spec = match raw.spec {
        Some(spec) => spec,
        None => spec_from_env()?,
    };
    if let Some(name) = etcd_cluster.map(str::trim).filter(|n| !n.is_empty()) {
        info!(cluster = %name, "Cluster name overridden from command line");
        spec.cluster_name = name.to_string();
    }
    if spec.cluster_name.trim().is_empty() {
        return Err(ConfigError::MissingClusterName.into());
    }

    let default_bucket = env::var(DEFAULT_BUCKET_ENV).ok();
    let storage = spec.storage_source(default_bucket.as_deref())?;

    let namespace = raw
        .namespace
        .filter(|ns| !ns.trim().is_empty())
        .or_else(|| env::var(NAMESPACE_ENV).ok().filter(|ns| !ns.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let timeouts = raw.timeouts.resolve()?;

    let secure = raw.tls.is_some();
    let members = raw
        .members
        .into_iter()
        .map(|m| {
            let ns = m.namespace.unwrap_or_else(|| namespace.clone());
            match m.client_url {
                Some(url) => explicit_member(m.name, ns, url, secure),
                None => Ok(Member::derived(m.name, ns, secure)),
            }
        })
        .collect::<Result<Vec<Member>>>()?;
    if members.is_empty() {
        warn!(cluster = %spec.cluster_name, "No members configured; every backup cycle will find no running members");
    }

    let config = BackupConfig {
        cluster_name: spec.cluster_name.clone(),
        namespace,
        backup_dir: raw.backup_dir.unwrap_or_else(|| PathBuf::from(BACKUP_MOUNT_DIR)),
        storage,
        interval: spec.interval(),
        members,
        tls: raw.tls,
        timeouts,
    };
    info!(
        cluster = %config.cluster_name,
        namespace = %config.namespace,
        members = config.members.len(),
        interval = ?config.interval,
        secure,
        "Configuration loaded"
    );
    Ok(config)
}

/// A member with its own URL is secure exactly when the URL is `https`.
fn explicit_member(name: String, namespace: String, url: String, tls_configured: bool) -> Result<Member> {
    let secure = if url.starts_with("https://") {
        true
    } else if url.starts_with("http://") {
        false
    } else {
        bail!("member {name}: client_url {url:?} must start with http:// or https://");
    };
    if secure && !tls_configured {
        bail!("member {name}: client_url {url:?} is https but the config has no tls section");
    }
    Ok(Member::new(name, namespace, url, secure))
}

fn spec_from_env() -> Result<BackupSpec> {
    let raw = match env::var(BACKUP_SPEC_ENV) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => bail!("config has no spec section and {BACKUP_SPEC_ENV} is not set"),
    };
    info!("Using backup spec from {BACKUP_SPEC_ENV}");
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {BACKUP_SPEC_ENV} as JSON"))
}
