//! Typed ID wrapper around the caller-provided item identifier.
//!
//! Unlike the rest of the workspace's identifiers this one is not generated
//! internally: the host application supplies an opaque string when it adds
//! an item, and that string is the item's primary identity for the lifetime
//! of the download (it is also what the filesystem root directory name and
//! the playback URL are derived from).

use serde::{Deserialize, Serialize};

/// Caller-provided unique identifier for an offline item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a caller-supplied id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_roundtrip_serde() {
        let id = ItemId::new("movie-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"movie-42\"");
        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_item_id_display() {
        let id = ItemId::new("abc");
        assert_eq!(format!("{}", id), "abc");
    }

    #[test]
    fn test_item_id_equality_is_by_value() {
        assert_eq!(ItemId::new("x"), ItemId::from("x".to_string()));
        assert_ne!(ItemId::new("x"), ItemId::new("y"));
    }

    #[test]
    fn test_item_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ItemId::new("a"));
        assert!(set.contains(&ItemId::new("a")));
    }
}
