//! Vote Controller
//!
//! Votes are irreversible, so nothing is flipped before the server answers:
//! a failed submit leaves the local flags exactly as they were. When the
//! server refuses a vote because one already exists, the controller reads
//! the vote status and lands on the results view instead of an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::error::{MutationError, MutationResult};
use crate::api::{OptionId, PollBackend, PollDetail, PollId, VoteResponse, VoteStatus};

/// Per-poll vote state as shown to the viewer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteState {
    pub has_voted: bool,
    /// Option the viewer voted for, when known
    pub voted_option: Option<OptionId>,
    pub is_submitting: bool,
    pub error: Option<String>,
}

/// Which face of a poll to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteView {
    Ballot,
    Results,
}

/// Successful end states of a submit
#[derive(Debug, Clone, PartialEq)]
pub enum VoteOutcome {
    /// The server recorded this vote
    Recorded(VoteResponse),
    /// The server already held a vote from this viewer
    AlreadyVoted(VoteStatus),
}

#[derive(Default)]
struct VoteTable {
    /// Bumped by `reset`; submits from an older generation do not write back
    generation: u64,
    polls: HashMap<PollId, VoteState>,
}

pub struct VoteController {
    api: Arc<dyn PollBackend>,
    table: Mutex<VoteTable>,
}

impl VoteController {
    pub fn new(api: Arc<dyn PollBackend>) -> Self {
        Self {
            api,
            table: Mutex::new(VoteTable::default()),
        }
    }

    /// Adopt the viewer flags of a freshly fetched detail
    pub fn seed(&self, detail: &PollDetail) {
        self.update(detail.id(), |state| {
            if !state.is_submitting {
                state.has_voted = detail.user_voted;
                if !detail.user_voted {
                    state.voted_option = None;
                }
            }
        });
    }

    pub async fn submit(&self, poll_id: PollId, option_id: OptionId) -> MutationResult<VoteOutcome> {
        let generation = self
            .table
            .lock()
            .map(|mut table| {
                let state = table.polls.entry(poll_id).or_default();
                state.is_submitting = true;
                state.error = None;
                table.generation
            })
            .unwrap_or_default();

        let result = self.api.submit_vote(poll_id, option_id).await;

        match result {
            Ok(response) => {
                tracing::info!(poll_id, option_id, "Vote recorded");
                self.settle(generation, poll_id, |state| {
                    state.has_voted = true;
                    state.voted_option = Some(response.option_id);
                    state.is_submitting = false;
                });
                Ok(VoteOutcome::Recorded(response))
            }
            Err(e) => {
                if !e.is_transient() && !e.is_unauthorized() {
                    if let Ok(status) = self.api.vote_status(poll_id).await {
                        if status.voted {
                            tracing::info!(poll_id, "Viewer already voted, showing results");
                            self.settle(generation, poll_id, |state| {
                                state.has_voted = true;
                                state.voted_option = status.option_id;
                                state.is_submitting = false;
                            });
                            return Ok(VoteOutcome::AlreadyVoted(status));
                        }
                    }
                }

                tracing::warn!(poll_id, option_id, error = %e, "Vote failed");
                let message = e.user_message();
                self.settle(generation, poll_id, |state| {
                    state.is_submitting = false;
                    state.error = Some(message);
                });
                Err(MutationError::Api(e))
            }
        }
    }

    /// Recover the server-held vote fact. Never fails: an unreadable status
    /// is treated as "not voted".
    pub async fn check_status(&self, poll_id: PollId) -> VoteStatus {
        match self.api.vote_status(poll_id).await {
            Ok(status) => {
                self.update(poll_id, |state| {
                    if !state.is_submitting {
                        state.has_voted = status.voted;
                        state.voted_option = status.option_id;
                    }
                });
                status
            }
            Err(e) => {
                tracing::warn!(poll_id, error = %e, "Vote status unavailable");
                VoteStatus::not_voted()
            }
        }
    }

    pub fn state(&self, poll_id: PollId) -> VoteState {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.polls.get(&poll_id).cloned())
            .unwrap_or_default()
    }

    pub fn view(&self, poll_id: PollId) -> VoteView {
        if self.state(poll_id).has_voted {
            VoteView::Results
        } else {
            VoteView::Ballot
        }
    }

    /// Forget every per-poll state, e.g. after the viewer changed
    pub fn reset(&self) {
        if let Ok(mut table) = self.table.lock() {
            table.generation += 1;
            table.polls.clear();
        }
    }

    fn update(&self, poll_id: PollId, f: impl FnOnce(&mut VoteState)) {
        if let Ok(mut table) = self.table.lock() {
            f(table.polls.entry(poll_id).or_default());
        }
    }

    /// Apply the outcome of a submit started in `generation`
    fn settle(&self, generation: u64, poll_id: PollId, f: impl FnOnce(&mut VoteState)) {
        if let Ok(mut table) = self.table.lock() {
            if table.generation != generation {
                tracing::debug!(poll_id, "Viewer changed during vote, dropping outcome");
                return;
            }
            f(table.polls.entry(poll_id).or_default());
        }
    }
}
