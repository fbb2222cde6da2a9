/// # etcd-backup CLI Interface (Module)
///
/// Command parsing and wiring for the `etcd-backup` binary. The engine itself
/// lives in [`etcd-backup-core`]; this module builds the concrete etcd client,
/// S3 object store and member list from a config file and hands them over.
///
/// ## Commands
/// - `run`: back up the cluster every interval until Ctrl-C.
/// - `latest`: print the newest stored backup and exit.
///
/// For programmatic or integration use, call [`run`] with a constructed [`Cli`].
///
/// [`etcd-backup-core`]: ../../etcd-backup-core/
use crate::discovery::StaticDiscovery;
use crate::etcd::EtcdMemberClient;
use crate::load_config::{load_config, BackupConfig};
use crate::s3::S3ObjectStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use etcd_backup_core::config::{scratch_dir, StorageSource};
use etcd_backup_core::retry::RetryPolicy;
use etcd_backup_core::scheduler::{Scheduler, SchedulerConfig};
use etcd_backup_core::store::VersionedStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// CLI for etcd-backup: periodic etcd snapshots into object storage.
#[derive(Parser)]
#[clap(
    name = "etcd-backup",
    version,
    about = "Periodically snapshot an etcd cluster into S3, skipping unchanged revisions"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the backup loop until interrupted
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Cluster name, overriding the one in the backup spec
        #[clap(long)]
        etcd_cluster: Option<String>,
    },
    /// Print the latest stored backup
    Latest {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run { config, etcd_cluster } => {
            let config = load_config(config, etcd_cluster.as_deref())?;
            tracing::info!(command = "run", cluster = %config.cluster_name, "Starting backup loop");

            let objects = connect_object_store(&config).await?;
            let store = VersionedStore::open(objects, scratch_dir(&config.backup_dir, &config.cluster_name))?;
            let client = Arc::new(EtcdMemberClient::new(config.timeouts, config.tls.as_ref())?);
            let discovery = StaticDiscovery::new(config.members.clone());

            let scheduler_config = SchedulerConfig {
                cluster_name: config.cluster_name.clone(),
                interval: config.interval,
                timeouts: config.timeouts,
                seed_retry: RetryPolicy::default(),
            };
            let mut scheduler = Scheduler::new(scheduler_config, discovery, client, store)
                .await
                .context("Failed to read the latest backup from the store")?;

            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
            scheduler.run(cancel).await;
            tracing::info!(command = "run", "Backup loop finished");
            Ok(())
        }
        Commands::Latest { config } => {
            let config = load_config(config, None)?;
            let objects = connect_object_store(&config).await?;
            let store = VersionedStore::new(objects, scratch_dir(&config.backup_dir, &config.cluster_name));
            match store.get_latest().await? {
                Some(record) => {
                    tracing::info!(command = "latest", key = %record.key(), "Latest backup found");
                    println!("{record}");
                }
                None => {
                    tracing::info!(command = "latest", "Store holds no backups");
                    println!("no backups stored for cluster {}", config.cluster_name);
                }
            }
            Ok(())
        }
    }
}

async fn connect_object_store(config: &BackupConfig) -> Result<S3ObjectStore> {
    match &config.storage {
        StorageSource::S3(source) => {
            S3ObjectStore::connect(source, &config.namespace, &config.cluster_name).await
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl-C, stopping");
            cancel.cancel();
        }
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
