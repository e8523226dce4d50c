//! The filestore node: one entry in the tracked tree over a backend mount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Active,
    Missing,
    Inconsistent,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyState {
    Consistent,
    Inconsistent,
    Missing,
}

/// A tracked filesystem entry on a single backend mount.
///
/// Invariants (spec §3):
/// - at most one non-deleted node per `(backend_mount_id, path)`;
/// - a non-root node's parent is a directory with `depth = child.depth - 1`;
/// - `kind = Directory` implies `size_bytes == 0` (own contribution only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub backend_mount_id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub name: String,
    pub depth: i32,
    pub kind: NodeKind,
    pub state: NodeState,
    pub size_bytes: i64,
    pub checksum: Option<String>,
    pub content_hash: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub version: i64,
    pub consistency_state: ConsistencyState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub consistency_checked_at: Option<DateTime<Utc>>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl Node {
    pub fn is_active(&self) -> bool {
        matches!(self.state, NodeState::Active)
    }
}

/// Normalise a POSIX-ish path: strip leading/trailing slashes, collapse
/// `.`, reject `..` (escapes the mount root, spec §3/§4.2).
pub fn normalize_path(raw: &str) -> Result<String, crate::error::CoreError> {
    let mut segments = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                return Err(crate::error::CoreError::InvalidPath(format!(
                    "path escapes mount root: {raw}"
                )))
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

pub fn path_depth(normalized: &str) -> i32 {
    if normalized.is_empty() {
        0
    } else {
        normalized.matches('/').count() as i32 + 1
    }
}

pub fn parent_path(normalized: &str) -> Option<String> {
    if normalized.is_empty() {
        return None;
    }
    match normalized.rsplit_once('/') {
        Some((parent, _)) => Some(parent.to_string()),
        None => Some(String::new()),
    }
}

pub fn file_name(normalized: &str) -> String {
    normalized.rsplit('/').next().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_trailing_slashes() {
        assert_eq!(normalize_path("/a/b/").unwrap(), "a/b");
        assert_eq!(normalize_path("a//b").unwrap(), "a/b");
    }

    #[test]
    fn rejects_parent_escape() {
        assert!(normalize_path("a/../b").is_err());
    }

    #[test]
    fn depth_and_parent() {
        assert_eq!(path_depth("a/b/c"), 3);
        assert_eq!(parent_path("a/b/c").unwrap(), "a/b");
        assert_eq!(parent_path("a").unwrap(), "");
        assert_eq!(parent_path(""), None);
        assert_eq!(file_name("a/b/c"), "c");
    }
}
