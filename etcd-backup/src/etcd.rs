//! [`MemberClient`] backed by `etcd-client`.
//!
//! Each call dials the member, does its work, and drops the connection before
//! returning. A snapshot stream owns its connection until the stream is dropped.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use etcd_backup_core::config::Timeouts;
use etcd_backup_core::contract::{BoxError, MemberClient, SnapshotStream};
use etcd_backup_core::member::Member;
use etcd_backup_core::record::Revision;
use etcd_client::{Certificate, Client, ConnectOptions, GetOptions, Identity, TlsOptions};
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::load_config::TlsFiles;

pub struct EtcdMemberClient {
    timeouts: Timeouts,
    tls: Option<TlsOptions>,
}

impl EtcdMemberClient {
    pub fn new(timeouts: Timeouts, tls: Option<&TlsFiles>) -> Result<Self> {
        let tls = tls.map(tls_options).transpose()?;
        Ok(Self { timeouts, tls })
    }

    async fn connect(&self, member: &Member, request_timeout: Duration) -> Result<Client, BoxError> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(self.timeouts.dial)
            .with_timeout(request_timeout);
        if member.secure_client {
            if let Some(tls) = &self.tls {
                options = options.with_tls(tls.clone());
            }
        }
        debug!(member = %member.name, url = %member.client_url, "Dialing member");
        let client = Client::connect([member.client_url.as_str()], Some(options)).await?;
        Ok(client)
    }
}

fn tls_options(files: &TlsFiles) -> Result<TlsOptions> {
    let read = |path: &std::path::Path| {
        std::fs::read(path).with_context(|| format!("Failed to read TLS file {}", path.display()))
    };
    let cert = read(&files.cert_file)?;
    let key = read(&files.key_file)?;
    let ca = read(&files.ca_file)?;
    Ok(TlsOptions::new()
        .ca_certificate(Certificate::from_pem(ca))
        .identity(Identity::from_pem(cert, key)))
}

#[async_trait]
impl MemberClient for EtcdMemberClient {
    async fn current_revision(&self, member: &Member) -> Result<Revision, BoxError> {
        let mut client = self.connect(member, self.timeouts.request).await?;
        let resp = client
            .get("/", Some(GetOptions::new().with_serializable()))
            .await?;
        let header = resp.header().ok_or("get response carries no header")?;
        Ok(header.revision())
    }

    async fn software_version(&self, member: &Member) -> Result<String, BoxError> {
        let mut client = self.connect(member, self.timeouts.request).await?;
        let status = client.status().await?;
        Ok(status.version().to_string())
    }

    async fn snapshot(&self, member: &Member) -> Result<SnapshotStream, BoxError> {
        let mut client = self.connect(member, self.timeouts.snapshot).await?;
        let streaming = client.snapshot().await?;

        let chunks = stream::unfold(Some((client, streaming)), |state| async move {
            let (client, mut streaming) = state?;
            match streaming.message().await {
                Ok(Some(resp)) => Some((Ok(resp.blob().to_vec()), Some((client, streaming)))),
                Ok(None) => None,
                Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e)), None)),
            }
        });
        Ok(chunks.boxed())
    }
}
