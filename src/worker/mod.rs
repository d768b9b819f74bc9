//! Download Worker (spec.md §4.6).
//!
//! One [`WorkerPool`] per process; at most one active fetch loop per item
//! (spec.md §8 "at-most-one-worker-per-item"), each driving a bounded set of
//! concurrent HTTP fetches. The worker holds only the ids and handles it
//! needs and calls into the aggregator through its public methods rather
//! than holding a back-reference, so there is no cyclic object graph
//! (spec.md §9 "cyclic ownership").

mod config;
mod fetch;

pub use config::WorkerConfig;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dtg_common::{Error, ItemId, Result};
use dtg_db::models::Task;
use dtg_db::pool::{get_conn, DbPool};
use dtg_db::queries::{items, tasks};
use parking_lot::RwLock;
use tokio::task::{JoinHandle, JoinSet};

use crate::aggregator::Aggregator;
use fetch::FetchOutcome;

/// Cooperative pause/cancel signalling for one item's fetch loop. Checked
/// between chunks inside [`fetch::fetch_task`], never while holding a lock
/// (spec.md §4.6 "Suspension points").
pub struct ItemControl {
    pub(crate) pause_requested: AtomicBool,
    pub(crate) cancel_requested: AtomicBool,
}

impl ItemControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pause_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        })
    }
}

struct ActiveWorker {
    control: Arc<ItemControl>,
    handle: JoinHandle<()>,
}

pub struct WorkerPool {
    db_pool: DbPool,
    aggregator: Arc<Aggregator>,
    client: reqwest::Client,
    config: WorkerConfig,
    active: RwLock<HashMap<ItemId, ActiveWorker>>,
}

impl WorkerPool {
    pub fn new(db_pool: DbPool, aggregator: Arc<Aggregator>, config: WorkerConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Arc::new(Self {
            db_pool,
            aggregator,
            client,
            config,
            active: RwLock::new(HashMap::new()),
        })
    }

    /// True if an item currently has a running fetch loop.
    pub fn is_active(&self, item_id: &ItemId) -> bool {
        self.active.read().contains_key(item_id)
    }

    /// Start fetching an item's outstanding tasks (spec.md §4.6 "start").
    pub fn start(self: &Arc<Self>, item_id: &ItemId, downloads_root: &Path) -> Result<()> {
        if self.is_active(item_id) {
            return Err(Error::invalid_state(format!(
                "worker already running for item {item_id}"
            )));
        }

        let conn = get_conn(&self.db_pool)?;
        let item = items::get_item(&conn, item_id)?
            .ok_or_else(|| Error::item_not_found(item_id.as_str()))?;
        drop(conn);

        if !item.state.can_start() {
            return Err(Error::invalid_state(format!(
                "cannot start item {item_id} in state {}",
                item.state
            )));
        }

        self.aggregator.mark_in_progress(item_id)?;

        let control = ItemControl::new();
        let this = Arc::clone(self);
        let owned_item_id = item_id.clone();
        let root = downloads_root.to_path_buf();
        let control_for_loop = Arc::clone(&control);

        let handle = tokio::spawn(async move {
            this.run_item(owned_item_id, root, control_for_loop).await;
        });

        self.active
            .write()
            .insert(item_id.clone(), ActiveWorker { control, handle });
        Ok(())
    }

    /// Request a pause (spec.md §4.6 "pause"). Returns once the flag is set;
    /// the actual `paused` transition happens asynchronously once in-flight
    /// fetches have surrendered their resume tokens.
    pub fn pause(&self, item_id: &ItemId) -> Result<()> {
        let active = self.active.read();
        let worker = active
            .get(item_id)
            .ok_or_else(|| Error::invalid_state(format!("no active worker for item {item_id}")))?;
        worker.control.pause_requested.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Abort in-flight fetches without persisting resume tokens and delete
    /// all of the item's tasks (spec.md §4.6 "cancel"). Partial files under
    /// the item's root are left for the caller's removal flow to clean up.
    pub fn cancel(&self, item_id: &ItemId) -> Result<()> {
        let worker = self
            .active
            .write()
            .remove(item_id)
            .ok_or_else(|| Error::invalid_state(format!("no active worker for item {item_id}")))?;

        worker.control.cancel_requested.store(true, Ordering::Relaxed);
        worker.handle.abort();

        let conn = get_conn(&self.db_pool)?;
        tasks::delete_tasks_for_item(&conn, item_id)?;
        Ok(())
    }

    async fn run_item(self: Arc<Self>, item_id: ItemId, root: PathBuf, control: Arc<ItemControl>) {
        let mut in_flight: JoinSet<(Task, Result<FetchOutcome>)> = JoinSet::new();

        loop {
            if control.cancel_requested.load(Ordering::Relaxed) {
                in_flight.shutdown().await;
                break;
            }

            let paused = control.pause_requested.load(Ordering::Relaxed);
            let have_room = !paused && in_flight.len() < self.config.concurrency;

            if have_room {
                match self.pop_next_task(&item_id) {
                    Ok(Some(task)) => {
                        self.spawn_fetch(&mut in_flight, &root, &control, task);
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.escalate(&item_id, e);
                        in_flight.shutdown().await;
                        break;
                    }
                }
            }

            if in_flight.is_empty() {
                if paused {
                    if let Err(e) = self.aggregator.mark_paused(&item_id) {
                        tracing::error!(%item_id, error = %e, "failed to persist pause");
                    }
                }
                break;
            }

            match in_flight.join_next().await {
                Some(Ok((task, outcome))) => {
                    if let Err(e) = self.handle_outcome(&item_id, task, outcome) {
                        self.escalate(&item_id, e);
                        in_flight.shutdown().await;
                        break;
                    }
                }
                Some(Err(join_err)) => {
                    tracing::error!(%item_id, error = %join_err, "fetch task panicked");
                }
                None => break,
            }
        }

        self.active.write().remove(&item_id);
    }

    fn pop_next_task(&self, item_id: &ItemId) -> Result<Option<Task>> {
        let conn = get_conn(&self.db_pool)?;
        let next = tasks::next_pending_task(&conn, item_id)?;
        if let Some(task) = &next {
            tasks::start_task(&conn, item_id, &task.source_url)?;
        }
        Ok(next)
    }

    fn spawn_fetch(
        &self,
        in_flight: &mut JoinSet<(Task, Result<FetchOutcome>)>,
        root: &Path,
        control: &Arc<ItemControl>,
        task: Task,
    ) {
        let client = self.client.clone();
        let config = self.config.clone();
        let db_pool = self.db_pool.clone();
        let aggregator = Arc::clone(&self.aggregator);
        let root = root.to_path_buf();
        let control = Arc::clone(control);

        in_flight.spawn(async move {
            let outcome =
                fetch::fetch_task(&client, &config, &db_pool, &aggregator, &root, &task, &control).await;
            (task, outcome)
        });
    }

    fn handle_outcome(&self, item_id: &ItemId, task: Task, outcome: Result<FetchOutcome>) -> Result<()> {
        match outcome {
            Ok(FetchOutcome::Completed) => {
                let conn = get_conn(&self.db_pool)?;
                tasks::delete_task(&conn, item_id, &task.source_url)?;
                drop(conn);
                self.aggregator.task_finished(item_id)
            }
            Ok(FetchOutcome::Paused { resume_token }) => {
                let conn = get_conn(&self.db_pool)?;
                tasks::set_resume_token(&conn, item_id, &task.source_url, Some(&resume_token))?;
                tasks::requeue_task(&conn, item_id, &task.source_url)
            }
            Ok(FetchOutcome::Cancelled) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn escalate(&self, item_id: &ItemId, error: Error) {
        let message = error.to_string();
        let result = match &error {
            Error::DbFailure(_) => self.aggregator.mark_db_failure(item_id, &message),
            _ if error.is_resumable() => self.aggregator.mark_interrupted(item_id, &message),
            _ => self.aggregator.mark_failed(item_id, &message),
        };
        if let Err(e) = result {
            tracing::error!(%item_id, error = %e, "failed to persist escalation");
        }
    }
}
