//! Poll list read-model

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::refresh::Refresh;
use super::sequence::RequestSequence;
use crate::api::{Poll, PollBackend};

/// One page of poll summaries plus loading/error flags
#[derive(Debug, Clone, PartialEq)]
pub struct ListState {
    pub polls: Vec<Poll>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ListState {
    fn empty(page_size: u32) -> Self {
        Self {
            polls: Vec::new(),
            total: 0,
            page: 1,
            page_size,
            is_loading: false,
            error: None,
            last_updated: None,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64) as u32
    }
}

/// Locally held page of the poll list
pub struct PollListModel {
    api: Arc<dyn PollBackend>,
    state: watch::Sender<ListState>,
    sequence: RequestSequence,
    mounted: AtomicBool,
}

impl PollListModel {
    pub fn new(api: Arc<dyn PollBackend>, page_size: u32) -> Self {
        let (state, _) = watch::channel(ListState::empty(page_size.max(1)));
        Self {
            api,
            state,
            sequence: RequestSequence::default(),
            mounted: AtomicBool::new(true),
        }
    }

    /// Fetch `page`. Failures land in `error`; the previous polls are kept.
    pub async fn load(&self, page: u32) {
        if !self.is_mounted() {
            return;
        }

        let page = page.max(1);
        let page_size = self.state.borrow().page_size;
        let seq = self.sequence.issue();
        self.state.send_modify(|s| s.is_loading = true);

        let result = self.api.list_polls(page, page_size).await;

        if !self.is_mounted() {
            tracing::debug!(seq, "List view torn down, ignoring response");
            return;
        }

        self.state.send_modify(|s| {
            let fresh = self.sequence.settle(seq);
            s.is_loading = self.sequence.is_pending();
            if !fresh {
                tracing::debug!(seq, "Discarding stale list response");
                return;
            }

            match result {
                Ok(list) => {
                    s.polls = list.polls;
                    s.total = list.total;
                    s.page = list.page;
                    s.page_size = list.page_size;
                    s.error = None;
                    s.last_updated = Some(Utc::now());
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "Failed to load polls");
                    s.error = Some(e.user_message());
                }
            }
        });
    }

    /// Re-fetch the current page
    pub async fn reload(&self) {
        let page = self.state.borrow().page;
        self.load(page).await;
    }

    pub fn state(&self) -> ListState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ListState> {
        self.state.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Stop applying results; calls still in flight are ignored when they
    /// resolve.
    pub fn teardown(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Refresh for PollListModel {
    async fn refresh(&self) {
        self.reload().await;
    }

    fn teardown(&self) {
        PollListModel::teardown(self);
    }
}
