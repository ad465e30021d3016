//! Read-Models
//!
//! Display-oriented projections of server-held poll data. Each model has a
//! single re-fetch entry point, absorbs read failures into an `error` field
//! and stops applying results once torn down.
//!
//! Push events never patch local state: they only trigger a re-fetch (see
//! [`attach`]).

mod detail;
mod list;
mod refresh;
mod sequence;

pub use detail::{DetailState, PollDetailModel};
pub use list::{ListState, PollListModel};
pub use refresh::{attach, attach_with_identity, Refresh, ViewHandle};
