//! Real-Time Push Layer
//!
//! Keeps a live WebSocket to the server and fans its events out to views.
//!
//! ## Architecture
//!
//! - **ConnectionManager**: one connection, reconnect on drop
//! - **EventBus**: typed broadcast of decoded events to subscribers
//! - **Messages**: the inbound event union and its wire format
//!
//! ## Data Flow
//!
//! 1. The server pushes `{"type": ..., "data": ...}` frames on `/ws`
//! 2. ConnectionManager decodes them; malformed frames are logged and dropped
//! 3. EventBus re-broadcasts each event to every subscriber of its kind
//! 4. Read-models treat each event as a signal to re-fetch

mod bus;
mod connection;
mod messages;

pub use bus::{BusConfig, EventBus, Subscription};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, ReconnectPolicy};
pub use messages::{
    ConnectedPayload, DecodeError, EventKind, InboundEvent, LikeUpdatePayload,
    PollCreatedPayload, VoteUpdatePayload,
};
