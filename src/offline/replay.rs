//! Deferred work that replays when connectivity returns.
//!
//! Registration only records a tag; the work itself lives behind
//! [`ReplayHandler`] so callers can plug in real replay logic later. Pending
//! tasks are in-memory only, so delivery is best-effort: a crash between
//! registration and replay loses the task. That limitation is accepted until
//! a durable offline-action queue exists.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::lock::mutex_lock;

const SOURCE: &str = "offline::replay";

/// A pending unit of deferred work, identified by its tag.
#[derive(Debug, Clone)]
pub struct ReplayTask {
    pub id: Uuid,
    pub tag: String,
    pub registered_at: OffsetDateTime,
}

/// Extension point invoked once per pending task when connectivity returns.
#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn replay(&self, task: &ReplayTask);
}

/// Default handler; it logs the tag and does nothing else.
#[derive(Debug, Default)]
pub struct NoopReplayHandler;

#[async_trait]
impl ReplayHandler for NoopReplayHandler {
    async fn replay(&self, task: &ReplayTask) {
        debug!(target = "scorta::replay", tag = %task.tag, "No replay handler installed");
    }
}

/// Records pending replay tags and fires the handler for each once the
/// network is back.
pub struct ReplayRegistrar {
    pending: Mutex<VecDeque<ReplayTask>>,
    handler: Arc<dyn ReplayHandler>,
}

impl ReplayRegistrar {
    pub fn new(handler: Arc<dyn ReplayHandler>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            handler,
        }
    }

    /// Record a pending tag. A tag already pending is not queued again, so
    /// repeated registrations before a replay collapse into one task.
    pub fn register(&self, tag: &str) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "register");
        if pending.iter().any(|task| task.tag == tag) {
            debug!(target = "scorta::replay", tag, "Replay tag already pending");
            return;
        }

        let task = ReplayTask {
            id: Uuid::new_v4(),
            tag: tag.to_string(),
            registered_at: OffsetDateTime::now_utc(),
        };
        info!(
            target = "scorta::replay",
            task_id = %task.id,
            tag,
            "Replay task registered"
        );
        pending.push_back(task);
    }

    /// Pending tags in registration order.
    pub fn pending_tags(&self) -> Vec<String> {
        mutex_lock(&self.pending, SOURCE, "pending_tags")
            .iter()
            .map(|task| task.tag.clone())
            .collect()
    }

    /// Drain every pending task and run the handler for each, returning how
    /// many replayed. Tasks are consumed even when the handler is a no-op.
    pub async fn fire(&self) -> usize {
        let tasks: Vec<ReplayTask> = {
            let mut pending = mutex_lock(&self.pending, SOURCE, "fire");
            pending.drain(..).collect()
        };

        for task in &tasks {
            info!(
                target = "scorta::replay",
                task_id = %task.id,
                tag = %task.tag,
                "Replaying deferred work"
            );
            self.handler.replay(task).await;
        }
        tasks.len()
    }

    /// Watch a connectivity signal and fire on every offline-to-online edge.
    /// The task ends when the sending side is dropped.
    pub fn spawn_connectivity_listener(
        self: &Arc<Self>,
        mut online: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registrar = Arc::clone(self);
        // Snapshot before spawning; whatever value the first poll observes
        // is compared against this baseline.
        let mut was_online = *online.borrow();
        tokio::spawn(async move {
            while online.changed().await.is_ok() {
                let is_online = *online.borrow();
                if is_online && !was_online {
                    let replayed = registrar.fire().await;
                    info!(
                        target = "scorta::replay",
                        replayed, "Connectivity restored"
                    );
                }
                was_online = is_online;
            }
        })
    }
}
