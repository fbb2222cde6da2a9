
/// Client port every etcd member listens on.
pub const CLIENT_PORT: u16 = 2379;

/// One etcd member as seen by a single scheduling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub namespace: String,
    pub client_url: String,
    /// Whether the client endpoint requires TLS.
    pub secure_client: bool,
}

impl Member {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        client_url: impl Into<String>,
        secure_client: bool,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            client_url: client_url.into(),
            secure_client,
        }
    }

    /// Build a member whose client URL is derived from its in-cluster DNS name,
    /// `<scheme>://<name>.<cluster>.<namespace>.svc:2379`.
    pub fn derived(name: impl Into<String>, namespace: impl Into<String>, secure_client: bool) -> Self {
        let name = name.into();
        let namespace = namespace.into();
        let scheme = if secure_client { "https" } else { "http" };
        let client_url = format!(
            "{scheme}://{name}.{cluster}.{namespace}.svc:{CLIENT_PORT}",
            cluster = cluster_name_from_member_name(&name),
        );
        Self {
            name,
            namespace,
            client_url,
            secure_client,
        }
    }
}

/// Member names are `<cluster>-<suffix>`; strips the suffix.
pub fn cluster_name_from_member_name(member_name: &str) -> &str {
    match member_name.rfind('-') {
        Some(i) => &member_name[..i],
        None => member_name,
    }
}
