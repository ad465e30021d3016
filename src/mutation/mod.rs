//! User-Initiated Writes
//!
//! Controllers for the three things a viewer can change:
//!
//! - **Votes**: pessimistic; flags change only after the server accepts
//! - **Likes**: optimistic; flip immediately, exact rollback on failure
//! - **Polls**: validated locally before any request is made
//!
//! Failures propagate to the caller as [`MutationError`] and are also
//! recorded in the per-poll state for display.

mod compose;
mod error;
mod like;
mod vote;

pub use compose::{
    PollComposer, PollDraft, ValidationError, MAX_DESCRIPTION_LEN, MAX_OPTIONS, MAX_OPTION_LEN,
    MAX_TITLE_LEN, MIN_OPTIONS, MIN_TITLE_LEN,
};
pub use error::{MutationError, MutationResult};
pub use like::{LikeController, LikeState};
pub use vote::{VoteController, VoteOutcome, VoteState, VoteView};
