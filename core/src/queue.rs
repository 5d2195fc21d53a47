//! Generation Job Queue: at most one in-flight generation per project, FIFO
//! within a project, projects independent of each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use slide_chatgpt::Transport;
use slide_common::CancelHandle;
use slide_protocol::{Clarification, ClarificationAnswer, Event, ItemId, QueueItem, QueueStatus};

use crate::config::Config;
use crate::error::EngineError;
use crate::session::SessionStore;

/// Handle to the queue. Clones share the same state.
#[derive(Clone)]
pub struct GenerationQueue {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) config: Arc<Config>,
    events: mpsc::UnboundedSender<Event>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    lanes: HashMap<String, Lane>,
    items: HashMap<ItemId, QueueItem>,
    /// Typed errors of failed items, until taken or pruned.
    failures: HashMap<ItemId, EngineError>,
}

#[derive(Default)]
struct Lane {
    pending: VecDeque<ItemId>,
    running: Option<(ItemId, CancelHandle)>,
    /// A drain task is alive for this project.
    draining: bool,
}

impl GenerationQueue {
    /// Creates the queue and the receiving end of its event stream.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        config: Config,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(Inner {
                transport,
                store,
                config: Arc::new(config),
                events: tx,
                state: Mutex::new(QueueState::default()),
            }),
        };
        (queue, rx)
    }

    /// Queues one user turn. Starts it right away when the project is idle.
    pub async fn submit(
        &self,
        project_id: impl Into<String>,
        prompt: impl Into<String>,
        images: Vec<String>,
    ) -> ItemId {
        let item = QueueItem::new(project_id, prompt, images);
        let item_id = item.id;
        let project_id = item.project_id.clone();

        let start_drain = {
            let mut state = self.inner.state.lock().await;
            state.items.insert(item_id, item);
            let lane = state.lanes.entry(project_id.clone()).or_default();
            lane.pending.push_back(item_id);
            let idle = !lane.draining;
            lane.draining = true;
            idle
        };
        info!("queued {item_id} for project {project_id}");
        self.emit(Event::StatusChanged {
            item_id,
            status: QueueStatus::Queued,
        });

        if start_drain {
            let queue = self.clone();
            tokio::spawn(async move { queue.drain(project_id).await });
        }
        item_id
    }

    /// Submits the user's reply to a clarification as the next turn.
    pub async fn answer(
        &self,
        project_id: impl Into<String>,
        clarification: &Clarification,
        answer: &ClarificationAnswer,
    ) -> ItemId {
        self.submit(project_id, answer.to_prompt(clarification), Vec::new())
            .await
    }

    /// Cancels a queued or running item. Returns false when the item is
    /// unknown or already finished.
    pub async fn cancel(&self, item_id: ItemId) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(project_id) = state
            .items
            .get(&item_id)
            .filter(|item| !item.is_finished())
            .map(|item| item.project_id.clone())
        else {
            return false;
        };
        let Some(lane) = state.lanes.get_mut(&project_id) else {
            return false;
        };

        if let Some((running, handle)) = &lane.running {
            if *running == item_id {
                info!("cancelling running item {item_id}");
                handle.cancel();
                return true;
            }
        }

        let before = lane.pending.len();
        lane.pending.retain(|id| *id != item_id);
        if lane.pending.len() == before {
            return false;
        }
        info!("cancelled queued item {item_id}");
        drop(state);
        self.fail(item_id, EngineError::Cancelled).await;
        true
    }

    /// Marks an item failed, keeps its typed error and emits the terminal
    /// events.
    pub(crate) async fn fail(&self, item_id: ItemId, err: EngineError) {
        let message = err.to_string();
        let status = err.status();
        {
            let mut state = self.inner.state.lock().await;
            if let Some(item) = state.items.get_mut(&item_id) {
                item.status = QueueStatus::Error;
                item.error = Some(message.clone());
            }
            state.failures.insert(item_id, err);
        }
        self.emit(Event::StatusChanged {
            item_id,
            status: QueueStatus::Error,
        });
        self.emit(Event::Failed {
            item_id,
            message,
            status,
        });
    }

    /// The error a failed item ended with. Each error can be taken once.
    pub async fn take_failure(&self, item_id: ItemId) -> Option<EngineError> {
        self.inner.state.lock().await.failures.remove(&item_id)
    }

    /// Drops the records of finished items and returns how many went.
    /// Snapshots of those items are no longer available afterwards.
    pub async fn prune_finished(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let finished: Vec<ItemId> = state
            .items
            .values()
            .filter(|item| item.is_finished())
            .map(|item| item.id)
            .collect();
        for item_id in &finished {
            state.items.remove(item_id);
            state.failures.remove(item_id);
        }
        debug!("pruned {} finished item(s)", finished.len());
        finished.len()
    }

    /// Current record of an item.
    pub async fn snapshot(&self, item_id: ItemId) -> Option<QueueItem> {
        self.inner.state.lock().await.items.get(&item_id).cloned()
    }

    async fn drain(&self, project_id: String) {
        loop {
            let next = {
                let mut state = self.inner.state.lock().await;
                let Some(lane) = state.lanes.get_mut(&project_id) else {
                    return;
                };
                match lane.pending.pop_front() {
                    Some(item_id) => {
                        let cancel = CancelHandle::new();
                        lane.running = Some((item_id, cancel.clone()));
                        (item_id, cancel)
                    }
                    None => {
                        state.lanes.remove(&project_id);
                        return;
                    }
                }
            };
            self.run_item(next.0, next.1).await;
        }
    }

    pub(crate) fn emit(&self, event: Event) {
        // Nobody listening is not an error for the engine.
        let _ = self.inner.events.send(event);
    }

    /// Runs `f` against the stored record of `item_id`.
    pub(crate) async fn update_item<R>(
        &self,
        item_id: ItemId,
        f: impl FnOnce(&mut QueueItem) -> R,
    ) -> Option<R> {
        self.inner.state.lock().await.items.get_mut(&item_id).map(f)
    }
}
