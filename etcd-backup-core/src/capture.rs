//! Pulls a full snapshot out of one member.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info};

use crate::config::Timeouts;
use crate::contract::{MemberClient, SnapshotStream};
use crate::error::CaptureError;
use crate::member::Member;

/// Output of a capture: the member's software version and its snapshot bytes.
pub struct Capture {
    pub software_version: String,
    /// Must be drained by the caller; dropping it closes the member connection.
    pub stream: SnapshotStream,
}

pub struct SnapshotCapturer<C> {
    client: Arc<C>,
    timeouts: Timeouts,
}

impl<C: MemberClient> SnapshotCapturer<C> {
    pub fn new(client: Arc<C>, timeouts: Timeouts) -> Self {
        Self { client, timeouts }
    }

    pub async fn capture(&self, member: &Member) -> Result<Capture, CaptureError> {
        let software_version = timeout(self.timeouts.short_call(), self.client.software_version(member))
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into()))
            .map_err(|source| {
                error!(member = %member.name, error = %source, "Failed to get member status");
                CaptureError::Status {
                    member: member.name.clone(),
                    source,
                }
            })?;
        debug!(member = %member.name, version = %software_version, "Got member software version");

        let deadline = deadline_after(self.timeouts.snapshot);
        let raw = timeout_at(deadline, self.client.snapshot(member))
            .await
            .unwrap_or_else(|elapsed| Err(elapsed.into()))
            .map_err(|source| {
                error!(member = %member.name, error = %source, "Failed to receive snapshot");
                CaptureError::SnapshotRequest {
                    member: member.name.clone(),
                    source,
                }
            })?;

        info!(member = %member.name, version = %software_version, "Snapshot stream opened");
        Ok(Capture {
            software_version,
            stream: bounded(raw, deadline, member.name.clone()),
        })
    }
}

/// Roughly 30 years; stands in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Ends `inner` with an error once `deadline` passes, and tags every stream
/// error as a [`CaptureError::Stream`]. Nothing is yielded after an error.
fn bounded(inner: SnapshotStream, deadline: Instant, member: String) -> SnapshotStream {
    stream::unfold(Some(inner), move |state| {
        let member = member.clone();
        async move {
            let mut inner = state?;
            match timeout_at(deadline, inner.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(inner))),
                Ok(Some(Err(e))) => Some((Err(stream_failure(member, e)), None)),
                Ok(None) => None,
                Err(_) => {
                    let e = io::Error::new(io::ErrorKind::TimedOut, "snapshot transfer deadline exceeded");
                    Some((Err(stream_failure(member, e)), None))
                }
            }
        }
    })
    .boxed()
}

fn stream_failure(member: String, source: io::Error) -> io::Error {
    error!(member = %member, error = %source, "Snapshot stream failed");
    let kind = source.kind();
    io::Error::new(kind, CaptureError::Stream { member, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockMemberClient;

    fn member() -> Member {
        Member::new("example-0000", "default", "http://example-0000:2379", false)
    }

    fn chunks(items: Vec<io::Result<Vec<u8>>>) -> SnapshotStream {
        stream::iter(items).boxed()
    }

    async fn drain(mut stream: SnapshotStream) -> (Vec<u8>, Option<io::Error>) {
        let mut bytes = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => bytes.extend(chunk),
                Err(e) => return (bytes, Some(e)),
            }
        }
        (bytes, None)
    }

    #[tokio::test]
    async fn streams_snapshot_with_version() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .times(1)
            .returning(|_| Ok("3.2.0".into()));
        client
            .expect_snapshot()
            .times(1)
            .returning(|_| Ok(chunks(vec![Ok(b"snap".to_vec()), Ok(b"shot".to_vec())])));

        let capturer = SnapshotCapturer::new(Arc::new(client), Timeouts::default());
        let capture = capturer.capture(&member()).await.expect("capture succeeds");
        assert_eq!(capture.software_version, "3.2.0");

        let (bytes, err) = drain(capture.stream).await;
        assert_eq!(bytes, b"snapshot");
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn status_failure_is_tagged() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .returning(|_| Err("connection refused".into()));
        client.expect_snapshot().never();

        let capturer = SnapshotCapturer::new(Arc::new(client), Timeouts::default());
        let err = capturer.capture(&member()).await.err().expect("status fails");
        assert!(matches!(err, CaptureError::Status { ref member, .. } if member == "example-0000"));
    }

    #[tokio::test]
    async fn snapshot_request_failure_is_tagged() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .returning(|_| Ok("3.2.0".into()));
        client
            .expect_snapshot()
            .returning(|_| Err("permission denied".into()));

        let capturer = SnapshotCapturer::new(Arc::new(client), Timeouts::default());
        let err = capturer.capture(&member()).await.err().expect("request fails");
        assert!(matches!(err, CaptureError::SnapshotRequest { .. }));
    }

    #[tokio::test]
    async fn mid_stream_failure_is_tagged_and_final() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .returning(|_| Ok("3.2.0".into()));
        client.expect_snapshot().returning(|_| {
            Ok(chunks(vec![
                Ok(b"part".to_vec()),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
                Ok(b"never".to_vec()),
            ]))
        });

        let capturer = SnapshotCapturer::new(Arc::new(client), Timeouts::default());
        let capture = capturer.capture(&member()).await.expect("capture opens");
        let mut stream = capture.stream;

        assert_eq!(stream.next().await.map(|r| r.ok()), Some(Some(b"part".to_vec())));
        let err = stream.next().await.expect("error item").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<CaptureError>())
            .expect("wrapped capture error");
        assert!(matches!(inner, CaptureError::Stream { .. }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transfer_hits_snapshot_deadline() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .returning(|_| Ok("3.2.0".into()));
        client.expect_snapshot().returning(|_| {
            let head = stream::iter(vec![Ok(b"head".to_vec())]);
            Ok(head.chain(stream::pending()).boxed())
        });

        let timeouts = Timeouts {
            snapshot: Duration::from_secs(30),
            ..Timeouts::default()
        };
        let capturer = SnapshotCapturer::new(Arc::new(client), timeouts);
        let capture = capturer.capture(&member()).await.expect("capture opens");

        let (bytes, err) = drain(capture.stream).await;
        assert_eq!(bytes, b"head");
        assert_eq!(err.expect("deadline error").kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn unrepresentable_timeouts_do_not_panic() {
        let mut client = MockMemberClient::new();
        client
            .expect_software_version()
            .returning(|_| Ok("3.2.0".into()));
        client
            .expect_snapshot()
            .returning(|_| Ok(chunks(vec![Ok(b"data".to_vec())])));

        let timeouts = Timeouts {
            dial: Duration::from_secs(u64::MAX),
            request: Duration::from_secs(u64::MAX),
            snapshot: Duration::from_secs(u64::MAX),
        };
        let capturer = SnapshotCapturer::new(Arc::new(client), timeouts);
        let capture = capturer.capture(&member()).await.expect("capture opens");

        let (bytes, err) = drain(capture.stream).await;
        assert_eq!(bytes, b"data");
        assert!(err.is_none());
    }
}
