//! Mutation error types

use thiserror::Error;

use super::compose::ValidationError;
use crate::api::{ApiError, PollId};

/// Errors from user-initiated writes
#[derive(Error, Debug)]
pub enum MutationError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("A like change for poll {0} is already in progress")]
    Busy(PollId),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl MutationError {
    /// Text to show next to the control that failed
    pub fn user_message(&self) -> String {
        match self {
            MutationError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Result type for mutation operations
pub type MutationResult<T> = Result<T, MutationError>;
