//! Session and Identity
//!
//! Tracks who the viewer is. The [`SessionHolder`] is the only component
//! that reads or writes the durable credential store and the in-memory
//! bearer slot.
//!
//! ## Lifecycle
//!
//! 1. `init()` rehydrates a persisted credential and validates it with
//!    `GET /api/auth/me`; any failure leaves the viewer anonymous.
//! 2. `login`/`register`/`login_google` persist token and profile together.
//! 3. `logout()` and any 401 from the REST layer clear both together.

mod credential;
mod holder;
mod store;

pub use credential::CredentialSlot;
pub use holder::{SessionError, SessionHolder};
pub use store::{CredentialStore, FileStore, MemoryStore, PersistedSession, StoreError};
