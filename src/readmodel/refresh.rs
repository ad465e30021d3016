//! Fan-out driven refresh
//!
//! A mounted view subscribes to the poll-change kinds on the bus and issues
//! one re-fetch per event, whatever poll the event names. Refreshes are
//! neither coalesced nor cancelled; the sequence guard inside each model
//! keeps the freshest response.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::User;
use crate::realtime::{EventBus, EventKind};

/// A read-model that can be re-fetched and torn down
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    async fn refresh(&self);

    /// Stop applying results of calls that resolve later
    fn teardown(&self);

    /// The signed-in viewer changed; drop viewer-relative data
    fn viewer_changed(&self) {}
}

/// Keeps a model wired to the bus until dropped
pub struct ViewHandle {
    model: Arc<dyn Refresh>,
    tasks: Vec<JoinHandle<()>>,
    triggered: Arc<AtomicU64>,
}

impl ViewHandle {
    /// Refreshes started by events so far
    pub fn refreshes_triggered(&self) -> u64 {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Tear the view down explicitly
    pub fn detach(self) {}
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.model.teardown();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Refresh `model` on every poll-change event published on `bus`
pub fn attach<M: Refresh>(model: Arc<M>, bus: &EventBus) -> ViewHandle {
    attach_inner(model, bus, None)
}

/// Like [`attach`], and additionally drop viewer data and refresh whenever
/// the identity changes
pub fn attach_with_identity<M: Refresh>(
    model: Arc<M>,
    bus: &EventBus,
    identity: watch::Receiver<Option<User>>,
) -> ViewHandle {
    attach_inner(model, bus, Some(identity))
}

fn attach_inner<M: Refresh>(
    model: Arc<M>,
    bus: &EventBus,
    identity: Option<watch::Receiver<Option<User>>>,
) -> ViewHandle {
    let triggered = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::new();

    let mut events = bus.subscribe(&EventKind::POLL_CHANGES);
    {
        let model = Arc::clone(&model);
        let triggered = Arc::clone(&triggered);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                tracing::debug!(kind = %event.kind(), poll_id = ?event.poll_id(), "Refreshing view");
                triggered.fetch_add(1, Ordering::SeqCst);
                let model = Arc::clone(&model);
                tokio::spawn(async move { model.refresh().await });
            }
        }));
    }

    if let Some(mut identity) = identity {
        let model = Arc::clone(&model);
        tasks.push(tokio::spawn(async move {
            while identity.changed().await.is_ok() {
                let user_id = identity.borrow_and_update().as_ref().map(|u| u.id);
                tracing::debug!(?user_id, "Viewer changed, refetching");
                model.viewer_changed();
                model.refresh().await;
            }
        }));
    }

    ViewHandle {
        model,
        tasks,
        triggered,
    }
}
