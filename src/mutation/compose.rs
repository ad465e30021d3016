//! Poll Composition
//!
//! Validates a poll draft before anything reaches the network, then submits
//! it. The limits mirror the ones the server enforces.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::error::MutationResult;
use crate::api::{PollBackend, PollCreate, PollDetail};

pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_OPTION_LEN: usize = 200;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

/// Why a draft cannot be submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a poll title")]
    EmptyTitle,

    #[error("Title must be at least {} characters", MIN_TITLE_LEN)]
    TitleTooShort,

    #[error("Title must be at most {} characters", MAX_TITLE_LEN)]
    TitleTooLong,

    #[error("Description must be at most {} characters", MAX_DESCRIPTION_LEN)]
    DescriptionTooLong,

    #[error("Please provide at least {} options", MIN_OPTIONS)]
    TooFewOptions,

    #[error("A poll can have at most {} options", MAX_OPTIONS)]
    TooManyOptions,

    #[error("Option {0} must be at most {max} characters", max = MAX_OPTION_LEN)]
    OptionTooLong(usize),

    #[error("Duplicate option: {0}")]
    DuplicateOption(String),
}

/// Poll being written by the viewer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollDraft {
    pub title: String,
    pub description: String,
    /// Option inputs, blanks included
    pub options: Vec<String>,
}

impl PollDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn option(mut self, text: impl Into<String>) -> Self {
        self.options.push(text.into());
        self
    }

    /// Check the draft and produce the request body.
    ///
    /// Text is trimmed, blank options are discarded and a blank description
    /// is sent as absent.
    pub fn validate(&self) -> Result<PollCreate, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let title_len = title.chars().count();
        if title_len < MIN_TITLE_LEN {
            return Err(ValidationError::TitleTooShort);
        }
        if title_len > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }

        let description = self.description.trim();
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::DescriptionTooLong);
        }

        let options: Vec<String> = self
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if options.len() < MIN_OPTIONS {
            return Err(ValidationError::TooFewOptions);
        }
        if options.len() > MAX_OPTIONS {
            return Err(ValidationError::TooManyOptions);
        }

        let mut seen = HashSet::new();
        for (index, option) in options.iter().enumerate() {
            if option.chars().count() > MAX_OPTION_LEN {
                return Err(ValidationError::OptionTooLong(index + 1));
            }
            if !seen.insert(option.as_str()) {
                return Err(ValidationError::DuplicateOption(option.clone()));
            }
        }

        Ok(PollCreate {
            title: title.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            options,
        })
    }
}

/// Submits validated drafts
pub struct PollComposer {
    api: Arc<dyn PollBackend>,
}

impl PollComposer {
    pub fn new(api: Arc<dyn PollBackend>) -> Self {
        Self { api }
    }

    /// Validate, then create. An invalid draft never reaches the network.
    pub async fn submit(&self, draft: &PollDraft) -> MutationResult<PollDetail> {
        let body = draft.validate()?;
        let detail = self.api.create_poll(&body).await?;
        tracing::info!(poll_id = detail.id(), title = %detail.poll.title, "Poll created");
        Ok(detail)
    }
}
