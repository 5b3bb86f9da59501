//! Core types shared across Concord components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::ENTRY_SEPARATOR;

/// Published hashes of consistent secure settings, keyed by setting key.
///
/// Values are raw `"<salt>:<hash>"` strings exactly as stored in cluster
/// metadata. The map is only ever replaced wholesale.
pub type PublishedHashes = BTreeMap<String, String>;

/// One parsed published entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEntry {
    /// Base64 (URL-safe, unpadded) salt text
    pub salt: String,
    /// Base64 (standard) hash text
    pub hash: String,
}

impl PublishedEntry {
    pub fn new(salt: String, hash: String) -> Self {
        Self { salt, hash }
    }

    /// Split a raw entry into salt and hash.
    ///
    /// Returns `None` unless the value has exactly two non-empty
    /// separator-delimited parts.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(ENTRY_SEPARATOR);
        let salt = parts.next()?;
        let hash = parts.next()?;
        if parts.next().is_some() || salt.is_empty() || hash.is_empty() {
            return None;
        }
        Some(Self::new(salt.to_string(), hash.to_string()))
    }
}

impl fmt::Display for PublishedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.salt, ENTRY_SEPARATOR, self.hash)
    }
}

/// Priority of a cluster state update task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    Normal,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Role a node is configured to start with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Elects itself and publishes hashes
    Coordinator,
    /// Only verifies against what is published
    Follower,
}

impl Default for NodeRole {
    fn default() -> Self {
        Self::Follower
    }
}

/// Outcome of one consistency check, as exposed to health callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Node that ran the check
    pub node_id: String,

    /// `Some(true)` if consistent, `Some(false)` on soft disagreement,
    /// `None` if the check aborted with a fatal error
    pub consistent: Option<bool>,

    /// Fatal error message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Cluster state version the check read
    pub cluster_version: u64,

    /// Timestamp of the check (Unix epoch seconds)
    pub checked_at: i64,
}

impl ConsistencyReport {
    pub fn new(node_id: String, cluster_version: u64, outcome: Result<bool, String>) -> Self {
        let (consistent, error) = match outcome {
            Ok(consistent) => (Some(consistent), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            node_id,
            consistent,
            error,
            cluster_version,
            checked_at: chrono::Utc::now().timestamp(),
        }
    }

    /// True only for a completed check that found no discrepancy
    pub fn is_healthy(&self) -> bool {
        self.consistent == Some(true)
    }
}
