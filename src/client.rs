//! QuickPoll Client Context
//!
//! Explicitly constructed owner of every long-lived piece: REST client,
//! bearer slot, fan-out bus, connection manager, session holder and the
//! mutation controllers. Nothing is global; views borrow what they need
//! from here.

use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ApiError, PollBackend, PollId};
use crate::config::Config;
use crate::mutation::{LikeController, PollComposer, VoteController};
use crate::readmodel::{attach, attach_with_identity, PollDetailModel, PollListModel, ViewHandle};
use crate::realtime::{ConnectionManager, EventBus};
use crate::session::{CredentialSlot, CredentialStore, FileStore, SessionHolder};

/// Errors building the client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] ApiError),
}

/// A mounted view: the model plus the handle keeping it live
pub struct View<M> {
    pub model: Arc<M>,
    pub handle: ViewHandle,
}

pub struct QuickPollClient {
    config: Config,
    credentials: CredentialSlot,
    api: Arc<dyn PollBackend>,
    bus: Arc<EventBus>,
    connection: ConnectionManager,
    session: Arc<SessionHolder>,
    votes: Arc<VoteController>,
    likes: Arc<LikeController>,
    composer: PollComposer,
    rejection_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl QuickPollClient {
    /// Build against the configured server with a file-backed session store
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let credentials = CredentialSlot::new();
        let api = Arc::new(ApiClient::new(config.server.api_client(), credentials.clone())?);
        let store = Arc::new(FileStore::new(config.session.store_path()));
        let bus = Arc::new(EventBus::new(config.realtime.bus()));
        Ok(Self::from_parts(config, api, credentials, store, bus))
    }

    /// Build from explicit parts; `credentials` must be the slot `api` reads
    pub fn from_parts(
        config: Config,
        api: Arc<dyn PollBackend>,
        credentials: CredentialSlot,
        store: Arc<dyn CredentialStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        let connection = ConnectionManager::new(config.connection(), Arc::clone(&bus));
        let session = Arc::new(SessionHolder::new(
            Arc::clone(&api),
            store,
            credentials.clone(),
        ));

        Self {
            votes: Arc::new(VoteController::new(Arc::clone(&api))),
            likes: Arc::new(LikeController::new(Arc::clone(&api))),
            composer: PollComposer::new(Arc::clone(&api)),
            config,
            credentials,
            api,
            bus,
            connection,
            session,
            rejection_watcher: Mutex::new(None),
        }
    }

    /// Restore the session, start watching for rejected credentials and
    /// open the live connection.
    pub async fn start(&self) {
        self.session.init().await;

        if let Ok(mut watcher) = self.rejection_watcher.lock() {
            if watcher.is_none() {
                *watcher = Some(self.session.watch_rejections());
            }
        }

        if self.config.realtime.enabled {
            self.connection.connect();
        } else {
            tracing::info!("Live updates disabled");
        }

        tracing::info!(
            api_url = %self.config.server.api_url,
            signed_in = self.session.is_authenticated(),
            "QuickPoll client started"
        );
    }

    /// Close the live connection and stop background tasks
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        if let Some(watcher) = self.rejection_watcher.lock().ok().and_then(|mut w| w.take()) {
            watcher.abort();
        }
        tracing::info!("QuickPoll client stopped");
    }

    /// Load `page` of the poll list and keep it refreshed from the bus
    pub async fn open_list(&self, page: u32) -> View<PollListModel> {
        let model = Arc::new(PollListModel::new(
            Arc::clone(&self.api),
            self.config.server.page_size,
        ));
        let handle = attach(Arc::clone(&model), &self.bus);
        model.load(page).await;
        View { model, handle }
    }

    /// Load one poll and keep it refreshed from the bus and across
    /// identity changes
    pub async fn open_detail(&self, poll_id: PollId) -> View<PollDetailModel> {
        let model = Arc::new(
            PollDetailModel::new(Arc::clone(&self.api), poll_id)
                .with_controllers(Arc::clone(&self.votes), Arc::clone(&self.likes)),
        );
        let handle = attach_with_identity(Arc::clone(&model), &self.bus, self.session.watch_identity());
        model.load().await;
        View { model, handle }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn PollBackend> {
        &self.api
    }

    pub fn credentials(&self) -> &CredentialSlot {
        &self.credentials
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn session(&self) -> &Arc<SessionHolder> {
        &self.session
    }

    pub fn votes(&self) -> &Arc<VoteController> {
        &self.votes
    }

    pub fn likes(&self) -> &Arc<LikeController> {
        &self.likes
    }

    pub fn composer(&self) -> &PollComposer {
        &self.composer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LoginCredentials;
    use crate::mutation::{PollDraft, VoteOutcome};
    use crate::realtime::{ConnectionState, InboundEvent};
    use crate::session::MemoryStore;
    use crate::testing::{FakeBackend, MockServer};
    use std::time::Duration;
    use tokio::sync::watch;

    async fn wait_for<T>(rx: &mut watch::Receiver<T>, check: impl FnMut(&T) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(check))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_lunch_poll_end_to_end() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.server.api_url = server.api_url();
        config.realtime.reconnect_delay_ms = 50;
        config.session.store_path = Some(dir.path().join("session.json").to_string_lossy().to_string());
        assert_eq!(config.server.ws_url(), server.ws_url());

        let client = QuickPollClient::new(config).unwrap();
        client.start().await;
        wait_for(&mut client.connection().watch_state(), |s| *s == ConnectionState::Connected).await;
        assert!(!client.session().is_authenticated());

        // The welcome arrives once the server is ready to push
        tokio::time::timeout(Duration::from_secs(5), async {
            while !matches!(client.bus().latest(), Some(InboundEvent::Connected(_))) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let list = client.open_list(1).await;
        assert_eq!(list.model.state().total, 0);
        let mut list_rx = list.model.watch();

        let draft = PollDraft::new("Lunch?").option("Pizza").option("Sushi");
        let created = client.composer().submit(&draft).await.unwrap();

        // The poll_created push refreshes the list
        wait_for(&mut list_rx, |s| s.polls.iter().any(|p| p.title == "Lunch?")).await;
        assert_eq!(list.model.state().polls[0].total_votes, 0);

        let pizza = created.option_by_text("Pizza").unwrap().id;
        let outcome = client.votes().submit(created.id(), pizza).await.unwrap();
        assert!(matches!(outcome, VoteOutcome::Recorded(_)));

        // The vote_update push refreshes it again
        wait_for(&mut list_rx, |s| s.polls.first().map(|p| p.total_votes) == Some(1)).await;

        let detail = client.open_detail(created.id()).await;
        let detail = detail.model.state().detail.unwrap();
        assert_eq!(detail.poll.total_votes, 1);
        assert!(detail.user_voted);
        let results: Vec<_> = detail
            .results()
            .into_iter()
            .map(|(o, pct)| (o.option_text.clone(), pct))
            .collect();
        assert_eq!(results, vec![("Pizza".to_string(), 100), ("Sushi".to_string(), 0)]);

        client.shutdown().await;
        assert_eq!(client.connection().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_rejected_credential_signs_out() {
        let bus = Arc::new(EventBus::default());
        let backend = Arc::new(FakeBackend::with_bus(Arc::clone(&bus)));
        let mut config = Config::default();
        config.realtime.enabled = false;

        let client = QuickPollClient::from_parts(
            config,
            backend.clone(),
            backend.credentials(),
            Arc::new(MemoryStore::new()),
            bus,
        );
        client.start().await;

        client
            .session()
            .login(&LoginCredentials {
                email: "viewer@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        let mut identity = client.session().watch_identity();

        // A later 401 for the same credential evicts the session
        client.credentials().reject(client.credentials().bearer());
        wait_for(&mut identity, |u| u.is_none()).await;
        assert!(client.credentials().bearer().is_none());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_like_event_refreshes_open_detail() {
        let bus = Arc::new(EventBus::default());
        let backend = Arc::new(FakeBackend::with_bus(Arc::clone(&bus)));
        let poll = backend.seed_poll("Tabs or spaces?", &["Tabs", "Spaces"]);
        let mut config = Config::default();
        config.realtime.enabled = false;

        let client = QuickPollClient::from_parts(
            config,
            backend.clone(),
            backend.credentials(),
            Arc::new(MemoryStore::new()),
            bus,
        );
        client.start().await;

        let view = client.open_detail(poll.id()).await;
        let mut rx = view.model.watch();

        let state = client.likes().toggle(poll.id(), false).await.unwrap();
        assert_eq!(state.count, 1);

        wait_for(&mut rx, |s| {
            s.detail.as_ref().map(|d| (d.user_liked, d.poll.total_likes)) == Some((true, 1))
        })
        .await;
        assert!(client.likes().state(poll.id()).liked);
    }
}
