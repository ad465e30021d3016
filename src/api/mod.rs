//! QuickPoll REST Layer
//!
//! Typed access to the QuickPoll HTTP API.
//!
//! ## Endpoints
//!
//! - `GET /api/polls?page&page_size` - one page of poll summaries
//! - `GET /api/polls/{id}` - poll detail with viewer flags
//! - `POST /api/polls` - create a poll
//! - `POST|GET /api/polls/{id}/vote` - vote, vote status
//! - `POST|DELETE|GET /api/polls/{id}/like` - like, unlike, like status
//! - `/api/auth/{register,login,google,me,logout}` - identity
//!
//! Authenticated calls carry `Authorization: Bearer <token>` when a
//! credential is installed; a 401 is reported to the session holder.

mod client;
mod dto;
mod error;

pub use client::{ApiClient, ApiClientConfig, PollBackend};
pub use dto::{
    AuthToken, GoogleAuthRequest, LikeResponse, LikeStatus, LoginCredentials, OptionId, Poll,
    PollCreate, PollDetail, PollId, PollList, PollOption, RegisterData, User, VoteCreate,
    VoteResponse, VoteStatus,
};
pub use error::{ApiError, ApiResult};
