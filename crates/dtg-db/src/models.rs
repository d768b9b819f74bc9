//! Rust models matching the database schema (spec.md §3, §4.5).

use chrono::{DateTime, Utc};
use dtg_common::{ItemId, ItemState, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};

/// A download item: one requested HLS asset, tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub source_master_url: String,
    /// Filesystem root this item's tasks are downloaded under, e.g.
    /// `<downloads_root>/<safe(item_id)>`.
    pub root_path: String,
    pub state: ItemState,
    pub error_message: Option<String>,
    /// JSON-serialized record of the selector's chosen variant/renditions,
    /// kept so a resumed item doesn't need to re-run selection.
    pub selected_variant: Option<String>,
    /// The planner's one-time size estimate, used as the denominator for
    /// progress reporting (spec.md §4.3, §4.7).
    pub estimated_size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single fetch task planned for an item (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub item_id: ItemId,
    pub source_url: String,
    pub task_type: TaskType,
    /// FIFO order number within the item; ties are broken by `source_url`.
    pub order_num: i64,
    pub destination_path: String,
    pub status: TaskStatus,
    pub bytes_downloaded: i64,
    pub total_bytes: Option<i64>,
    pub retry_count: i64,
    /// Opaque resume token surrendered on pause, consumed on resume
    /// (spec.md §4.6 pause/resume).
    pub resume_token: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_roundtrip_serde() {
        let item = Item {
            id: ItemId::new("movie-1"),
            source_master_url: "https://cdn/master.m3u8".to_string(),
            root_path: "/data/movie-1".to_string(),
            state: ItemState::New,
            error_message: None,
            selected_variant: None,
            estimated_size_bytes: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&item).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }

    #[test]
    fn test_task_roundtrip_serde() {
        let task = Task {
            item_id: ItemId::new("movie-1"),
            source_url: "https://cdn/video/seg0.m4s".to_string(),
            task_type: TaskType::Video,
            order_num: 0,
            destination_path: "video/abc.m4s".to_string(),
            status: TaskStatus::Pending,
            bytes_downloaded: 0,
            total_bytes: None,
            retry_count: 0,
            resume_token: None,
            last_error: None,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }
}
