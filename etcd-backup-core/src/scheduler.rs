//! Periodic backup loop with a skip-if-unchanged rule.
//!
//! The scheduler keeps one watermark: the highest revision known to be safely
//! stored. Each tick discovers the running members, asks the scout for the
//! freshest one and only captures when that revision is past the watermark.
//! The watermark moves only after a successful upload.
//!
//! # Navigation
//! - Construction and seeding: [`Scheduler::new`]
//! - One cycle: [`Scheduler::tick`]
//! - The loop: [`Scheduler::run`]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::SnapshotCapturer;
use crate::config::{effective_interval, Timeouts};
use crate::contract::{MemberClient, MemberDiscovery, ObjectStore};
use crate::error::{BackupError, DiscoveryError, StoreError};
use crate::record::{BackupRecord, Revision};
use crate::retry::{retry, RetryError, RetryPolicy};
use crate::scout::RevisionScout;
use crate::store::VersionedStore;

/// Static settings of one scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cluster_name: String,
    pub interval: Duration,
    pub timeouts: Timeouts,
    /// How hard to try reading the store at startup.
    pub seed_retry: RetryPolicy,
}

impl SchedulerConfig {
    pub fn new(cluster_name: impl Into<String>, interval_seconds: Option<u64>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            interval: effective_interval(interval_seconds),
            timeouts: Timeouts::default(),
            seed_retry: RetryPolicy::default(),
        }
    }
}

/// Result of a tick that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The freshest member is not past the watermark; nothing was captured.
    Unchanged { revision: Revision, watermark: Revision },
    /// A new backup was stored.
    Saved { key: String, revision: Revision, bytes: u64 },
}

pub struct Scheduler<D, C, O> {
    config: SchedulerConfig,
    discovery: D,
    scout: RevisionScout<C>,
    capturer: SnapshotCapturer<C>,
    store: VersionedStore<O>,
    watermark: Revision,
}

impl<D, C, O> Scheduler<D, C, O>
where
    D: MemberDiscovery,
    C: MemberClient,
    O: ObjectStore,
{
    /// Build a scheduler and seed its watermark from the newest stored backup
    /// (0 when there is none). Reading the store is retried per
    /// `config.seed_retry`; running out of attempts is fatal.
    pub async fn new(
        config: SchedulerConfig,
        discovery: D,
        client: Arc<C>,
        store: VersionedStore<O>,
    ) -> Result<Self, RetryError<StoreError>> {
        let latest = retry(&config.seed_retry, || store.get_latest(), |_| true).await?;
        let watermark = latest.map(|record| record.revision).unwrap_or(0);
        info!(cluster = %config.cluster_name, watermark, "[BACKUP] Seeded revision watermark from store");

        Ok(Self {
            scout: RevisionScout::new(Arc::clone(&client), &config.timeouts),
            capturer: SnapshotCapturer::new(client, config.timeouts),
            config,
            discovery,
            store,
            watermark,
        })
    }

    /// Highest revision known to be stored.
    pub fn watermark(&self) -> Revision {
        self.watermark
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one backup cycle.
    pub async fn tick(&mut self) -> Result<TickOutcome, BackupError> {
        let members = self
            .discovery
            .running_members(&self.config.cluster_name)
            .await
            .map_err(DiscoveryError::Listing)?;
        debug!(count = members.len(), "[BACKUP] Discovered running members");

        let (member, revision) = self.scout.select(&members).await?;
        if revision <= self.watermark {
            info!(
                revision,
                watermark = self.watermark,
                "[BACKUP] Revision unchanged since last backup, skipping"
            );
            return Ok(TickOutcome::Unchanged {
                revision,
                watermark: self.watermark,
            });
        }

        let capture = self.capturer.capture(&member).await?;
        let key = BackupRecord::new(&capture.software_version, revision).key();
        let bytes = self
            .store
            .put(&capture.software_version, revision, capture.stream)
            .await?;

        self.watermark = revision;
        info!(key = %key, revision, bytes, member = %member.name, "[BACKUP] Saved backup");
        Ok(TickOutcome::Saved { key, revision, bytes })
    }

    /// Tick every `interval` until `cancel` fires. The first tick happens one
    /// interval after the call. Tick failures are logged and the loop goes on.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            cluster = %self.config.cluster_name,
            interval = ?self.config.interval,
            "[BACKUP] Scheduler started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("[BACKUP] Cancelled during backup cycle");
                    break;
                }
                outcome = self.tick() => outcome,
            };
            if let Err(e) = outcome {
                error!(error = %e, watermark = self.watermark, "[BACKUP][ERROR] Backup cycle failed");
            }
        }
        info!(cluster = %self.config.cluster_name, "[BACKUP] Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SchedulerConfig::new("example", None);
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.seed_retry, RetryPolicy::default());
        assert_eq!(SchedulerConfig::new("example", Some(60)).interval, Duration::from_secs(60));
    }
}
