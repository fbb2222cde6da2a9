//! [`ObjectStore`] on an S3 bucket, scoped to `<prefix>/v1/<namespace>/<cluster>`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use etcd_backup_core::config::{s3_key_prefix, S3Source};
use etcd_backup_core::contract::{BoxError, ObjectStore};
use tracing::{debug, info};

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Build a client for `source`. When the source names a credential
    /// directory, the AWS profile is read from its `credentials` and `config`
    /// files; otherwise the default provider chain applies.
    pub async fn connect(source: &S3Source, namespace: &str, cluster_name: &str) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(dir) = &source.credential_reference {
            let dir = PathBuf::from(dir);
            let files = ProfileFiles::builder()
                .with_file(ProfileFileKind::Credentials, dir.join("credentials"))
                .with_file(ProfileFileKind::Config, dir.join("config"))
                .build();
            loader = loader.profile_files(files);
            info!(dir = %dir.display(), "Loading AWS profile from credential directory");
        }
        let sdk_config = loader.load().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);

        let prefix = s3_key_prefix(&source.prefix, namespace, cluster_name);
        info!(bucket = %source.bucket, prefix = %prefix, "S3 client initialized");
        Ok(Self::new(client, source.bucket.clone(), prefix))
    }

    fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, name: &str, source: &Path) -> Result<(), BoxError> {
        let key = self.key(name);
        let body = ByteStream::from_path(source).await?;
        debug!(bucket = %self.bucket, key = %key, "Uploading object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, BoxError> {
        let dir = format!("{}/", self.prefix);
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&dir)
            .into_paginator()
            .send();

        let mut names = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page?;
            for object in page.contents() {
                if let Some(name) = object.key().and_then(|key| key.strip_prefix(&dir)) {
                    names.push(name.to_string());
                }
            }
        }
        debug!(bucket = %self.bucket, prefix = %self.prefix, count = names.len(), "Listed objects");
        Ok(names)
    }
}
