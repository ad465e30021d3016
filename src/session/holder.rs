//! Session Holder
//!
//! Owns the viewer identity, the durable credential store and the bearer
//! slot. Identity changes are published on a watch channel so views can
//! react to sign-in and sign-out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::credential::CredentialSlot;
use super::store::{CredentialStore, PersistedSession, StoreError};
use crate::api::{ApiError, AuthToken, LoginCredentials, PollBackend, RegisterData, User};

/// Tracks the authenticated viewer
pub struct SessionHolder {
    api: Arc<dyn PollBackend>,
    store: Arc<dyn CredentialStore>,
    credentials: CredentialSlot,
    identity: watch::Sender<Option<User>>,
    loading: AtomicBool,
}

impl SessionHolder {
    pub fn new(
        api: Arc<dyn PollBackend>,
        store: Arc<dyn CredentialStore>,
        credentials: CredentialSlot,
    ) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            api,
            store,
            credentials,
            identity,
            loading: AtomicBool::new(true),
        }
    }

    /// Rehydrate and revalidate a persisted session.
    ///
    /// Never fails: a missing, unreadable or rejected credential leaves the
    /// viewer anonymous with storage cleared.
    pub async fn init(&self) {
        match self.store.load() {
            Ok(Some(persisted)) => {
                self.credentials.install(persisted.access_token);
                match self.api.me().await {
                    Ok(user) => {
                        tracing::info!(user_id = user.id, "Session restored");
                        self.identity.send_replace(Some(user));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Stored credential rejected, signing out");
                        self.evict();
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("No stored session");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session unreadable, clearing");
                self.evict();
            }
        }
        self.loading.store(false, Ordering::SeqCst);
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, SessionError> {
        let token = self.api.login(credentials).await?;
        self.establish(token)
    }

    pub async fn register(&self, data: &RegisterData) -> Result<User, SessionError> {
        let token = self.api.register(data).await?;
        self.establish(token)
    }

    /// Sign in with a Google ID token
    pub async fn login_google(&self, credential: &str) -> Result<User, SessionError> {
        let token = self.api.login_google(credential).await?;
        self.establish(token)
    }

    /// Ask the server to end the session, then sign out locally whatever
    /// the server said.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            tracing::warn!(error = %e, "Server-side logout failed");
        }
        self.evict();
        tracing::info!("Signed out");
    }

    /// Drop the credential and profile from memory and storage
    pub fn evict(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear stored session");
        }
        self.credentials.clear();
        self.identity.send_if_modified(|current| current.take().is_some());
    }

    /// Evict the session whenever the REST layer reports that the current
    /// credential was refused.
    pub fn watch_rejections(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rejections = self.credentials.subscribe_rejections();
        let holder = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match rejections.recv().await {
                    Ok(rejected) => {
                        // A stale 401 must not sign out a newer session
                        if rejected.is_some() && rejected == holder.credentials.bearer() {
                            tracing::warn!("Credential rejected, signing out");
                            holder.evict();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn current_user(&self) -> Option<User> {
        self.identity.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.borrow().is_some()
    }

    /// True until `init()` has finished
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Receiver that observes every identity change
    pub fn watch_identity(&self) -> watch::Receiver<Option<User>> {
        self.identity.subscribe()
    }

    /// Persist first, then switch identity, so memory never runs ahead of
    /// storage.
    fn establish(&self, token: AuthToken) -> Result<User, SessionError> {
        let persisted = PersistedSession {
            access_token: token.access_token,
            user: token.user,
        };
        self.store.save(&persisted)?;
        self.credentials.install(persisted.access_token);
        self.identity.send_replace(Some(persisted.user.clone()));

        tracing::info!(user_id = persisted.user.id, "Signed in");
        Ok(persisted.user)
    }
}

/// Errors from sign-in operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}
