//! Bearer Credential Slot
//!
//! In-memory copy of the bearer token the REST layer attaches to requests.
//! Only the session holder installs or clears it; the REST layer reads it
//! and reports 401 responses through [`CredentialSlot::reject`].

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Shared bearer token plus a rejection signal
#[derive(Clone)]
pub struct CredentialSlot {
    inner: Arc<SlotInner>,
}

struct SlotInner {
    token: RwLock<Option<String>>,
    rejected: broadcast::Sender<Option<String>>,
}

impl CredentialSlot {
    pub fn new() -> Self {
        let (rejected, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SlotInner {
                token: RwLock::new(None),
                rejected,
            }),
        }
    }

    /// Current bearer token, if any
    pub fn bearer(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }

    pub(crate) fn install(&self, token: String) {
        if let Ok(mut guard) = self.inner.token.write() {
            *guard = Some(token);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut guard) = self.inner.token.write() {
            *guard = None;
        }
    }

    /// Report that the server refused `token`, the credential that was
    /// attached to the failed request
    pub fn reject(&self, token: Option<String>) {
        tracing::debug!("Credential rejected by server");
        let _ = self.inner.rejected.send(token);
    }

    pub fn subscribe_rejections(&self) -> broadcast::Receiver<Option<String>> {
        self.inner.rejected.subscribe()
    }
}

impl Default for CredentialSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_and_clear() {
        let slot = CredentialSlot::new();
        assert!(slot.bearer().is_none());

        slot.install("abc".to_string());
        assert_eq!(slot.clone().bearer().as_deref(), Some("abc"));

        slot.clear();
        assert!(slot.bearer().is_none());
    }

    #[tokio::test]
    async fn test_reject_notifies_subscribers() {
        let slot = CredentialSlot::new();
        let mut rx = slot.subscribe_rejections();
        slot.reject(Some("abc".to_string()));
        assert_eq!(rx.recv().await.unwrap().as_deref(), Some("abc"));
    }
}
