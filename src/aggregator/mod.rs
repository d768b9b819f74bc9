//! Progress Aggregator & Item State Machine (spec.md §4.7).
//!
//! Owns the single authority for item lifecycle transitions and progress
//! reporting. Every transition is persisted to the task store before the
//! corresponding [`ItemEvent`] is broadcast, satisfying the persist-then-
//! notify ordering spec.md §5 requires. The worker holds an `Arc<Aggregator>`
//! and calls into it; the aggregator holds no reference back to the worker
//! (spec.md §9 "cyclic ownership").

mod types;

pub use types::ItemEvent;

use std::sync::Arc;

use dtg_common::{Error, ItemId, ItemState, Result};
use dtg_db::pool::{get_conn, DbPool};
use dtg_db::queries::{items, tasks};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub struct Aggregator {
    pool: DbPool,
    event_tx: broadcast::Sender<ItemEvent>,
}

impl Aggregator {
    pub fn new(pool: DbPool) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self { pool, event_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: ItemEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("no subscribers for item event");
        }
    }

    fn transition(&self, item_id: &ItemId, state: ItemState, error: Option<&str>) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        items::set_state(&conn, item_id, state, error)?;
        self.emit(ItemEvent::StateChanged {
            item_id: item_id.clone(),
            state,
            error: error.map(str::to_string),
        });
        Ok(())
    }

    /// Planner finished building metadata for a freshly added item.
    pub fn mark_metadata_loaded(&self, item_id: &ItemId) -> Result<()> {
        self.transition(item_id, ItemState::MetadataLoaded, None)
    }

    /// Worker started fetching.
    pub fn mark_in_progress(&self, item_id: &ItemId) -> Result<()> {
        self.transition(item_id, ItemState::InProgress, None)
    }

    /// Worker honored a pause request.
    pub fn mark_paused(&self, item_id: &ItemId) -> Result<()> {
        self.transition(item_id, ItemState::Paused, None)
    }

    /// Worker escalated a retryable (5xx/timeout/IO) failure after
    /// exhausting its retry budget; the item remains resumable.
    pub fn mark_interrupted(&self, item_id: &ItemId, error: &str) -> Result<()> {
        self.transition(item_id, ItemState::Interrupted, Some(error))
    }

    /// Worker escalated a terminal (4xx/malformed) failure.
    pub fn mark_failed(&self, item_id: &ItemId, error: &str) -> Result<()> {
        self.transition(item_id, ItemState::Failed, Some(error))
    }

    /// Caller requested removal.
    pub fn mark_removed(&self, item_id: &ItemId) -> Result<()> {
        self.transition(item_id, ItemState::Removed, None)
    }

    /// Any store operation failed outside the ordinary task lifecycle.
    pub fn mark_db_failure(&self, item_id: &ItemId, error: &str) -> Result<()> {
        self.transition(item_id, ItemState::DbFailure, Some(error))
    }

    /// Report a successful byte range. Reads `downloadedSize` back from the
    /// store rather than accepting a caller-supplied running total, which is
    /// what makes per-task byte tracking resume-safe (spec.md §11 Open
    /// Question #1): a re-fetched segment's progress is only ever the sum of
    /// `bytes_downloaded` columns, never an additive counter the caller could
    /// double-apply. `estimatedSize` is read from the item row, where the
    /// planner recorded it once at plan time.
    ///
    /// If the item is currently paused, the state is re-asserted as paused
    /// rather than left to drift, so a progress report racing a pause
    /// request can never be observed as `inProgress` (spec.md §4.7 last
    /// paragraph).
    pub fn report_progress(&self, item_id: &ItemId) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        let bytes_so_far = tasks::total_bytes_downloaded(&conn, item_id)?;
        let item = items::get_item(&conn, item_id)?
            .ok_or_else(|| Error::item_not_found(item_id.as_str()))?;

        if item.state == ItemState::Paused {
            items::set_state(&conn, item_id, ItemState::Paused, None)?;
        }

        self.emit(ItemEvent::Progress {
            item_id: item_id.clone(),
            bytes_so_far,
            estimated_total: item.estimated_size_bytes,
        });
        Ok(())
    }

    /// Called once a task's row has been deleted following its successful
    /// fetch. If the item has no tasks left, it has finished.
    pub fn task_finished(&self, item_id: &ItemId) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        let remaining = tasks::remaining_task_count(&conn, item_id)?;
        drop(conn);

        if remaining == 0 {
            self.transition(item_id, ItemState::Completed, None)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtg_common::TaskType;
    use dtg_db::models::{Item, Task};
    use dtg_db::pool::init_memory_pool;
    use chrono::Utc;

    fn seed_item(pool: &DbPool, id: &ItemId) {
        let conn = get_conn(pool).unwrap();
        let now = Utc::now();
        items::upsert_item(
            &conn,
            &Item {
                id: id.clone(),
                source_master_url: "https://cdn/master.m3u8".to_string(),
                root_path: "/data/item".to_string(),
                state: ItemState::New,
                error_message: None,
                selected_variant: None,
                estimated_size_bytes: 1_000_000,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
    }

    fn seed_task(pool: &DbPool, id: &ItemId, source_url: &str) {
        let mut conn = get_conn(pool).unwrap();
        let now = Utc::now();
        tasks::insert_tasks(
            &mut conn,
            &[Task {
                item_id: id.clone(),
                source_url: source_url.to_string(),
                task_type: TaskType::Video,
                order_num: 0,
                destination_path: "video/a.ts".to_string(),
                status: dtg_common::TaskStatus::Pending,
                bytes_downloaded: 0,
                total_bytes: None,
                retry_count: 0,
                resume_token: None,
                last_error: None,
                updated_at: now,
            }],
        )
        .unwrap();
    }

    #[test]
    fn test_transitions_persist_and_emit() {
        let pool = init_memory_pool().unwrap();
        let item_id = ItemId::new("movie-1");
        seed_item(&pool, &item_id);

        let aggregator = Aggregator::new(pool.clone());
        let mut rx = aggregator.subscribe();

        aggregator.mark_in_progress(&item_id).unwrap();

        let conn = get_conn(&pool).unwrap();
        let item = items::get_item(&conn, &item_id).unwrap().unwrap();
        assert_eq!(item.state, ItemState::InProgress);

        let event = rx.try_recv().unwrap();
        match event {
            ItemEvent::StateChanged { state, .. } => assert_eq!(state, ItemState::InProgress),
            _ => panic!("expected StateChanged"),
        }
    }

    #[test]
    fn test_task_finished_completes_item_when_empty() {
        let pool = init_memory_pool().unwrap();
        let item_id = ItemId::new("movie-1");
        seed_item(&pool, &item_id);
        seed_task(&pool, &item_id, "https://cdn/seg0.ts");

        let aggregator = Aggregator::new(pool.clone());

        // One task still outstanding: no transition yet.
        aggregator.task_finished(&item_id).unwrap();
        let conn = get_conn(&pool).unwrap();
        let item = items::get_item(&conn, &item_id).unwrap().unwrap();
        assert_eq!(item.state, ItemState::New);
        drop(conn);

        tasks::delete_task(&get_conn(&pool).unwrap(), &item_id, "https://cdn/seg0.ts").unwrap();
        aggregator.task_finished(&item_id).unwrap();

        let conn = get_conn(&pool).unwrap();
        let item = items::get_item(&conn, &item_id).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Completed);
    }

    #[test]
    fn test_late_progress_while_paused_stays_paused() {
        let pool = init_memory_pool().unwrap();
        let item_id = ItemId::new("movie-1");
        seed_item(&pool, &item_id);
        seed_task(&pool, &item_id, "https://cdn/seg0.ts");

        let aggregator = Aggregator::new(pool.clone());
        aggregator.mark_in_progress(&item_id).unwrap();
        aggregator.mark_paused(&item_id).unwrap();

        aggregator.report_progress(&item_id).unwrap();

        let conn = get_conn(&pool).unwrap();
        let item = items::get_item(&conn, &item_id).unwrap().unwrap();
        assert_eq!(item.state, ItemState::Paused);
    }
}
