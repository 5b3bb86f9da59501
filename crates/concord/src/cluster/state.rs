//! Cluster state snapshots and the coordination interfaces.
//!
//! The replication mechanism itself lives behind [`ClusterService`]. Concord
//! only needs to read a versioned snapshot, submit a serialized update, and
//! hear about leadership changes.

use std::sync::Arc;

use concord_common::{ConcordError, PublishedHashes, Priority, Result};

/// Cluster-wide metadata relevant to consistent settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    hashes_of_consistent_settings: Arc<PublishedHashes>,
}

impl Metadata {
    pub fn new(hashes: PublishedHashes) -> Self {
        Self {
            hashes_of_consistent_settings: Arc::new(hashes),
        }
    }

    pub fn hashes_of_consistent_settings(&self) -> &PublishedHashes {
        &self.hashes_of_consistent_settings
    }

    /// Copy of this metadata with the published hashes swapped out whole
    pub fn with_hashes_of_consistent_settings(&self, hashes: Arc<PublishedHashes>) -> Self {
        Self {
            hashes_of_consistent_settings: hashes,
        }
    }
}

/// Snapshot of the cluster as seen by one node
#[derive(Debug, Clone)]
pub struct ClusterState {
    version: u64,
    metadata: Metadata,
    local_node_id: String,
    leader_node_id: Option<String>,
}

impl ClusterState {
    pub fn new(
        version: u64,
        metadata: Metadata,
        local_node_id: String,
        leader_node_id: Option<String>,
    ) -> Self {
        Self {
            version,
            metadata,
            local_node_id,
            leader_node_id,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn local_node_id(&self) -> &str {
        &self.local_node_id
    }

    /// True if the node holding this snapshot is the elected coordinator
    pub fn is_local_node_elected_leader(&self) -> bool {
        self.leader_node_id.as_deref() == Some(self.local_node_id.as_str())
    }
}

/// Result of executing an update task against the current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Leave the state (and its version) as is
    Unchanged,
    /// Replace the metadata, producing a new version
    Replace(Metadata),
}

/// A unit of work applied to the cluster state, one at a time
pub trait ClusterStateUpdateTask: Send {
    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// Compute the new state from `current`
    fn execute(&mut self, current: &ClusterState) -> Result<TaskOutcome>;

    /// Called when the task could not be executed or applied
    fn on_failure(&mut self, source: &str, error: &ConcordError);

    /// Called once the outcome has been applied
    fn on_applied(&mut self, _source: &str, _outcome: &TaskOutcome) {}
}

/// Read and update access to the replicated cluster state
pub trait ClusterService: Send + Sync {
    /// Latest state known to this node
    fn state(&self) -> ClusterState;

    /// Queue `task` for serialized execution. Failures are reported through
    /// [`ClusterStateUpdateTask::on_failure`], never returned here.
    fn submit_state_update_task(&self, source: &str, task: Box<dyn ClusterStateUpdateTask>);
}

/// Notified when the local node becomes or stops being the coordinator
pub trait LeadershipListener: Send + Sync {
    fn on_leader(&self);
    fn off_leader(&self);
}
