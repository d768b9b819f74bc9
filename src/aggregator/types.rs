//! Observer events delivered by the aggregator (spec.md §6 "Observer
//! callbacks", §4.7).

use dtg_common::{ItemId, ItemState};
use serde::{Deserialize, Serialize};

/// One notification delivered to subscribers after the corresponding state
/// change has already been persisted (spec.md §4.7 persist-then-notify
/// ordering, §5 ordering guarantee (i)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ItemEvent {
    /// An item's lifecycle state changed.
    StateChanged {
        item_id: ItemId,
        state: ItemState,
        error: Option<String>,
    },
    /// A successful byte range was persisted for one of an item's tasks.
    Progress {
        item_id: ItemId,
        bytes_so_far: i64,
        estimated_total: i64,
    },
}

impl ItemEvent {
    pub fn item_id(&self) -> &ItemId {
        match self {
            ItemEvent::StateChanged { item_id, .. } => item_id,
            ItemEvent::Progress { item_id, .. } => item_id,
        }
    }
}
