use async_trait::async_trait;
use etcd_backup_core::contract::{BoxError, MemberDiscovery};
use etcd_backup_core::member::Member;
use tracing::debug;

/// Answers with the members listed in the config file. One config file
/// describes one cluster, so the list is returned as-is.
pub struct StaticDiscovery {
    members: Vec<Member>,
}

impl StaticDiscovery {
    pub fn new(members: Vec<Member>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl MemberDiscovery for StaticDiscovery {
    async fn running_members(&self, cluster_name: &str) -> Result<Vec<Member>, BoxError> {
        debug!(cluster = %cluster_name, count = self.members.len(), "Using configured member list");
        Ok(self.members.clone())
    }
}
