//! # QuickPoll
//!
//! Live client for the QuickPoll polling service: create polls, vote once
//! per poll, like polls and watch results change as other viewers act.
//!
//! ## Features
//!
//! - **Live updates**: one WebSocket with automatic reconnection
//! - **Fan-out**: typed broadcast of server pushes to any number of views
//! - **Optimistic likes**: instant feedback with exact rollback on failure
//! - **Consistent views**: push events trigger re-fetches, stale responses
//!   are discarded
//! - **Sessions**: persisted, revalidated on start, evicted on 401
//!
//! ## Modules
//!
//! - [`api`]: REST client and wire types
//! - [`realtime`]: connection manager and event bus
//! - [`mutation`]: vote, like and poll-creation controllers
//! - [`readmodel`]: list/detail caches and the refresh loop
//! - [`session`]: identity and credential storage
//! - [`client`]: the context object wiring it all together
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quickpoll::{Config, PollDraft, QuickPollClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = QuickPollClient::new(Config::load_default())?;
//!     client.start().await;
//!
//!     // Live list of polls
//!     let list = client.open_list(1).await;
//!
//!     let poll = client
//!         .composer()
//!         .submit(&PollDraft::new("Lunch?").option("Pizza").option("Sushi"))
//!         .await?;
//!     client.votes().submit(poll.id(), poll.options[0].id).await?;
//!
//!     println!("{} polls", list.model.state().total);
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod mutation;
pub mod readmodel;
pub mod realtime;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use api::{ApiClient, ApiError, Poll, PollBackend, PollDetail, PollOption};
pub use client::{ClientError, QuickPollClient, View};
pub use config::Config;
pub use mutation::{LikeController, MutationError, PollDraft, VoteController, VoteOutcome};
pub use readmodel::{PollDetailModel, PollListModel, ViewHandle};
pub use realtime::{ConnectionManager, EventBus, EventKind, InboundEvent};
pub use session::SessionHolder;
