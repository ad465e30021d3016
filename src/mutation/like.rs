//! Like Controller
//!
//! Optimistic like/unlike. The flag and the displayed count flip before the
//! request resolves; on failure both are restored to the exact values they
//! had before the toggle, never re-derived.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::error::{MutationError, MutationResult};
use crate::api::{LikeStatus, PollBackend, PollDetail, PollId};

/// Per-poll like state as shown to the viewer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    /// Displayed like count; a local projection of the server total
    pub count: u64,
    pub in_flight: bool,
    pub error: Option<String>,
}

/// Per-poll states plus the generation `reset` bumps; a toggle started in
/// an older generation never writes back.
#[derive(Default)]
struct LikeTable {
    generation: u64,
    polls: HashMap<PollId, LikeState>,
}

pub struct LikeController {
    api: Arc<dyn PollBackend>,
    table: Mutex<LikeTable>,
}

impl LikeController {
    pub fn new(api: Arc<dyn PollBackend>) -> Self {
        Self {
            api,
            table: Mutex::new(LikeTable::default()),
        }
    }

    /// Adopt flag and count from a freshly fetched detail
    pub fn seed(&self, detail: &PollDetail) {
        self.reconcile(detail.id(), detail.user_liked, detail.poll.total_likes);
    }

    /// Take server values, unless a toggle is in flight for this poll
    pub fn reconcile(&self, poll_id: PollId, liked: bool, count: u64) {
        self.with_polls(|polls| {
            let state = polls.entry(poll_id).or_default();
            if state.in_flight {
                tracing::debug!(poll_id, "Skipping reconcile during toggle");
                return;
            }
            state.liked = liked;
            state.count = count;
        });
    }

    /// Flip the like state of `poll_id`, starting from `currently_liked`.
    ///
    /// Returns the state after the server answered. A second toggle for the
    /// same poll is refused with [`MutationError::Busy`] until the first one
    /// resolves.
    pub async fn toggle(&self, poll_id: PollId, currently_liked: bool) -> MutationResult<LikeState> {
        let (generation, snapshot) = self
            .with_table(|table| {
                let state = table.polls.entry(poll_id).or_default();
                if state.in_flight {
                    return None;
                }
                state.liked = currently_liked;
                let snapshot = state.clone();

                state.liked = !currently_liked;
                state.count = if currently_liked {
                    state.count.saturating_sub(1)
                } else {
                    state.count + 1
                };
                state.in_flight = true;
                state.error = None;
                Some((table.generation, snapshot))
            })
            .flatten()
            .ok_or(MutationError::Busy(poll_id))?;

        let result = if currently_liked {
            self.api.unlike(poll_id).await
        } else {
            self.api.like(poll_id).await.map(|_| ())
        };

        match result {
            Ok(()) => {
                tracing::debug!(poll_id, liked = !currently_liked, "Like toggled");
                Ok(self
                    .with_table(|table| {
                        if table.generation != generation {
                            tracing::debug!(poll_id, "Viewer changed during toggle, keeping reseeded state");
                            return table.polls.get(&poll_id).cloned().unwrap_or_default();
                        }
                        let state = table.polls.entry(poll_id).or_default();
                        state.in_flight = false;
                        state.clone()
                    })
                    .unwrap_or_default())
            }
            Err(e) => {
                tracing::warn!(poll_id, error = %e, "Like toggle failed, rolling back");
                let message = e.user_message();
                self.with_table(|table| {
                    if table.generation != generation {
                        return;
                    }
                    table.polls.insert(
                        poll_id,
                        LikeState {
                            error: Some(message),
                            ..snapshot
                        },
                    );
                });
                Err(MutationError::Api(e))
            }
        }
    }

    /// Read the server-held like fact. Never fails: an unreadable status is
    /// treated as "not liked".
    pub async fn check_like_status(&self, poll_id: PollId) -> LikeStatus {
        match self.api.like_status(poll_id).await {
            Ok(status) => {
                self.with_polls(|polls| {
                    let state = polls.entry(poll_id).or_default();
                    if !state.in_flight {
                        state.liked = status.liked;
                    }
                });
                status
            }
            Err(e) => {
                tracing::warn!(poll_id, error = %e, "Like status unavailable");
                LikeStatus::default()
            }
        }
    }

    pub fn state(&self, poll_id: PollId) -> LikeState {
        self.with_polls(|polls| polls.get(&poll_id).cloned())
            .flatten()
            .unwrap_or_default()
    }

    /// Forget every per-poll state, e.g. after the viewer changed. Toggles
    /// still in flight resolve without touching the fresh state.
    pub fn reset(&self) {
        self.with_table(|table| {
            table.generation += 1;
            table.polls.clear();
        });
    }

    fn with_polls<R>(&self, f: impl FnOnce(&mut HashMap<PollId, LikeState>) -> R) -> Option<R> {
        self.with_table(|table| f(&mut table.polls))
    }

    fn with_table<R>(&self, f: impl FnOnce(&mut LikeTable) -> R) -> Option<R> {
        self.table.lock().ok().map(|mut table| f(&mut table))
    }
}
