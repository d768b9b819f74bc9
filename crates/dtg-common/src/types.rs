//! Core domain enums shared across the download manager: the fetch-task
//! type taxonomy (spec.md §3) and the item lifecycle state machine
//! (spec.md §4.7). Both follow the lowercase, round-tripping enum style
//! the teacher uses for its own domain enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A download task's logical content type; also the name of its
/// subdirectory under an item's root (spec.md §6 filesystem layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Video,
    Audio,
    Text,
    Key,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Text => write!(f, "text"),
            Self::Key => write!(f, "key"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "text" => Ok(Self::Text),
            "key" => Ok(Self::Key),
            _ => Err(format!("unknown task type: {s}")),
        }
    }
}

/// Item lifecycle states (spec.md §4.7).
///
/// `InProgress` and `Paused` form a cycle via worker pause/start; `Interrupted`
/// is a transient escalation that must be re-started or paused explicitly.
/// `Removed`, `Failed`, and `DbFailure` are reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemState {
    New,
    MetadataLoaded,
    InProgress,
    Paused,
    Interrupted,
    Completed,
    Removed,
    Failed,
    DbFailure,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::MetadataLoaded => "metadataLoaded",
            Self::InProgress => "inProgress",
            Self::Paused => "paused",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
            Self::Removed => "removed",
            Self::Failed => "failed",
            Self::DbFailure => "dbFailure",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "metadataLoaded" => Ok(Self::MetadataLoaded),
            "inProgress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "interrupted" => Ok(Self::Interrupted),
            "completed" => Ok(Self::Completed),
            "removed" => Ok(Self::Removed),
            "failed" => Ok(Self::Failed),
            "dbFailure" => Ok(Self::DbFailure),
            _ => Err(format!("unknown item state: {s}")),
        }
    }
}

impl ItemState {
    /// Whether `start` may be called while in this state (spec.md §4.6,
    /// "at-most-one-worker-per-item").
    pub fn can_start(self) -> bool {
        matches!(
            self,
            Self::New | Self::MetadataLoaded | Self::Paused | Self::Interrupted
        )
    }

    pub fn can_pause(self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Removed | Self::Failed | Self::Completed)
    }
}

/// A single fetch task's lifecycle (spec.md §4.3, §4.6). Distinct from
/// `ItemState`: an item aggregates many tasks, and its own state only
/// moves to `completed` once every task under it reaches `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}
