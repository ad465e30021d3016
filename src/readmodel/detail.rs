//! Poll detail read-model

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::refresh::Refresh;
use super::sequence::RequestSequence;
use crate::api::{ApiError, PollBackend, PollDetail, PollId};
use crate::mutation::{LikeController, VoteController};

/// A single poll with loading/error flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailState {
    pub detail: Option<PollDetail>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// The server answered 404
    pub not_found: bool,
}

/// Locally held detail of one poll
///
/// The viewer flags inside [`PollDetail`] belong to whoever was signed in
/// when it was fetched; [`PollDetailModel::viewer_changed`] drops them.
pub struct PollDetailModel {
    api: Arc<dyn PollBackend>,
    poll_id: PollId,
    state: watch::Sender<DetailState>,
    sequence: RequestSequence,
    mounted: AtomicBool,
    votes: Option<Arc<VoteController>>,
    likes: Option<Arc<LikeController>>,
}

impl PollDetailModel {
    pub fn new(api: Arc<dyn PollBackend>, poll_id: PollId) -> Self {
        let (state, _) = watch::channel(DetailState::default());
        Self {
            api,
            poll_id,
            state,
            sequence: RequestSequence::default(),
            mounted: AtomicBool::new(true),
            votes: None,
            likes: None,
        }
    }

    /// Seed the vote and like controllers from every applied detail
    pub fn with_controllers(mut self, votes: Arc<VoteController>, likes: Arc<LikeController>) -> Self {
        self.votes = Some(votes);
        self.likes = Some(likes);
        self
    }

    pub fn poll_id(&self) -> PollId {
        self.poll_id
    }

    pub async fn load(&self) {
        if !self.is_mounted() {
            return;
        }

        let seq = self.sequence.issue();
        self.state.send_modify(|s| s.is_loading = true);

        let result = self.api.get_poll(self.poll_id).await;

        if !self.is_mounted() {
            tracing::debug!(poll_id = self.poll_id, seq, "Detail view torn down, ignoring response");
            return;
        }

        let mut applied = None;
        self.state.send_modify(|s| {
            let fresh = self.sequence.settle(seq);
            s.is_loading = self.sequence.is_pending();
            if !fresh {
                tracing::debug!(poll_id = self.poll_id, seq, "Discarding stale detail response");
                return;
            }

            match result {
                Ok(detail) => {
                    applied = Some(detail.clone());
                    s.detail = Some(detail);
                    s.error = None;
                    s.not_found = false;
                }
                Err(e) => {
                    tracing::warn!(poll_id = self.poll_id, error = %e, "Failed to load poll");
                    s.not_found = matches!(e, ApiError::Rejected { status: 404, .. });
                    s.error = Some(e.user_message());
                }
            }
        });

        if let Some(detail) = applied {
            if let Some(votes) = &self.votes {
                votes.seed(&detail);
            }
            if let Some(likes) = &self.likes {
                likes.seed(&detail);
            }
        }
    }

    /// Forget viewer-relative data and any response still in flight for
    /// the previous viewer.
    pub fn viewer_changed(&self) {
        self.sequence.invalidate();
        self.state.send_modify(|s| {
            s.detail = None;
            s.error = None;
        });
        if let Some(votes) = &self.votes {
            votes.reset();
        }
        if let Some(likes) = &self.likes {
            likes.reset();
        }
    }

    pub fn state(&self) -> DetailState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DetailState> {
        self.state.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn teardown(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Refresh for PollDetailModel {
    async fn refresh(&self) {
        self.load().await;
    }

    fn teardown(&self) {
        PollDetailModel::teardown(self);
    }

    fn viewer_changed(&self) {
        PollDetailModel::viewer_changed(self);
    }
}
