//! Picks the member holding the highest revision.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::Timeouts;
use crate::contract::MemberClient;
use crate::error::DiscoveryError;
use crate::member::Member;
use crate::record::Revision;

pub struct RevisionScout<C> {
    client: Arc<C>,
    budget: Duration,
}

impl<C: MemberClient> RevisionScout<C> {
    pub fn new(client: Arc<C>, timeouts: &Timeouts) -> Self {
        Self {
            client,
            budget: timeouts.short_call(),
        }
    }

    /// Probe every candidate and return the one with the strictly greatest
    /// revision. Equal revisions go to the earlier candidate.
    pub async fn select(&self, candidates: &[Member]) -> Result<(Member, Revision), DiscoveryError> {
        if candidates.is_empty() {
            warn!("No running etcd members found");
            return Err(DiscoveryError::NoRunningMembers);
        }

        let answers = join_all(candidates.iter().map(|member| self.probe(member))).await;

        let mut best: Option<(&Member, Revision)> = None;
        for (member, answer) in candidates.iter().zip(answers) {
            let Some(revision) = answer else { continue };
            if best.map_or(true, |(_, max)| revision > max) {
                best = Some((member, revision));
            }
        }

        match best {
            Some((member, revision)) => {
                info!(member = %member.name, revision, "Selected member with max revision");
                Ok((member.clone(), revision))
            }
            None => {
                warn!(candidates = candidates.len(), "No reachable member");
                Err(DiscoveryError::NoReachableMember)
            }
        }
    }

    async fn probe(&self, member: &Member) -> Option<Revision> {
        match tokio::time::timeout(self.budget, self.client.current_revision(member)).await {
            Ok(Ok(revision)) => {
                info!(member = %member.name, revision, "Got member revision");
                Some(revision)
            }
            Ok(Err(e)) => {
                warn!(member = %member.name, url = %member.client_url, error = %e, "Failed to get revision from member");
                None
            }
            Err(_) => {
                warn!(member = %member.name, url = %member.client_url, budget = ?self.budget, "Member did not answer in time");
                None
            }
        }
    }
}
