use std::collections::HashSet;
use std::sync::Arc;

/// Set-membership check over sender ids.
pub trait SenderAllowlist: Send + Sync {
    fn contains(&self, sender: &str) -> bool;
}

/// Allow-list fixed at startup from `[security].privileged_users`.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowlist {
    senders: HashSet<String>,
}

impl StaticAllowlist {
    pub fn new<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let senders = senders
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { senders }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl SenderAllowlist for StaticAllowlist {
    fn contains(&self, sender: &str) -> bool {
        self.senders.contains(sender)
    }
}

/// Guards state-changing orchestration actions.
#[derive(Clone)]
pub struct PrivilegeGate {
    allowlist: Arc<dyn SenderAllowlist>,
}

impl PrivilegeGate {
    pub fn new(allowlist: Arc<dyn SenderAllowlist>) -> Self {
        Self { allowlist }
    }

    pub fn permits(&self, sender: &str, action: &str) -> bool {
        let allowed = !sender.is_empty() && self.allowlist.contains(sender);
        if !allowed {
            tracing::warn!("privileged action '{action}' denied for sender '{sender}'");
        }
        allowed
    }
}
