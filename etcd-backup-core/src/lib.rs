#![doc = "etcd-backup-core: backup engine for etcd-backup."]

//! This crate holds the whole backup engine and none of the network SDKs.
//! Concrete etcd and S3 clients live in the `etcd-backup` binary crate and plug
//! in through the traits in [`contract`].
//!
//! # Pipeline
//! [`scheduler::Scheduler`] drives one cycle per interval:
//! discover members → [`scout::RevisionScout`] picks the freshest one →
//! [`capture::SnapshotCapturer`] streams its snapshot →
//! [`store::VersionedStore`] stages and uploads it under a revision-ordered key.

pub mod capture;
pub mod config;
pub mod contract;
pub mod error;
pub mod member;
pub mod record;
pub mod retry;
pub mod scheduler;
pub mod scout;
pub mod store;
