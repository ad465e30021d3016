//! Request/Response DTOs
//!
//! Wire types for the QuickPoll REST API. Aggregate counters on polls and
//! options are only ever read from the server, never set locally.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a poll
pub type PollId = i64;

/// Identifier of a poll option
pub type OptionId = i64;

// ============================================
// Polls
// ============================================

/// Poll summary as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub total_votes: u64,
    #[serde(default)]
    pub total_likes: u64,
}

/// A single answer of a poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub option_text: String,
    #[serde(default)]
    pub vote_count: u64,
}

/// Poll with its options and the viewer-relative flags
///
/// `user_voted` and `user_liked` belong to whoever made the request and
/// must not survive an identity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollDetail {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub user_voted: bool,
    #[serde(default)]
    pub user_liked: bool,
}

impl PollDetail {
    pub fn id(&self) -> PollId {
        self.poll.id
    }

    /// Share of the total vote held by `option`, rounded to a whole percent
    pub fn percentage(&self, option: &PollOption) -> u32 {
        let total = self.poll.total_votes;
        if total == 0 {
            return 0;
        }
        ((option.vote_count as f64 / total as f64) * 100.0).round() as u32
    }

    /// Result rows in display order
    pub fn results(&self) -> Vec<(&PollOption, u32)> {
        self.options
            .iter()
            .map(|option| (option, self.percentage(option)))
            .collect()
    }

    pub fn option(&self, id: OptionId) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == id)
    }

    pub fn option_by_text(&self, text: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.option_text == text)
    }
}

/// One page of poll summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollList {
    pub polls: Vec<Poll>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Body of `POST /api/polls`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<String>,
}

// ============================================
// Votes and likes
// ============================================

/// Body of `POST /api/polls/{id}/vote`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteCreate {
    pub option_id: OptionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub id: i64,
    pub poll_id: PollId,
    pub option_id: OptionId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub voted_at: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

/// Server-held vote fact for the current viewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub voted: bool,
    #[serde(default)]
    pub option_id: Option<OptionId>,
}

impl VoteStatus {
    pub fn not_voted() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub id: i64,
    pub poll_id: PollId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub liked_at: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeStatus {
    pub liked: bool,
}

// ============================================
// Authentication
// ============================================

/// Profile of an authenticated viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub oauth_provider: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Name to show for this viewer
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.email)
    }
}

fn default_true() -> bool {
    true
}

/// Successful login/registration response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Federated sign-in with a Google ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleAuthRequest {
    pub credential: String,
}

// ============================================
// Timestamps
// ============================================

/// Accepts RFC 3339 timestamps as well as the offset-less form the API emits
/// for naive database values (interpreted as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| parse_timestamp(&s).map_err(serde::de::Error::custom))
        .transpose()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", raw, e))
}
