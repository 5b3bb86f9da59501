//! In-process cluster state shared by any number of node handles.
//!
//! Updates are applied one at a time under a single lock, which gives the
//! total order over metadata versions that a real consensus layer would.
//! The version only moves when a task actually replaces the metadata.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use concord_common::{ConcordError, PublishedHashes};

use super::state::{
    ClusterService, ClusterState, ClusterStateUpdateTask, LeadershipListener, Metadata, TaskOutcome,
};

#[derive(Default)]
struct Shared {
    version: u64,
    metadata: Metadata,
    leader: Option<String>,
}

struct Registration {
    node_id: String,
    listener: Arc<dyn LeadershipListener>,
}

/// In-process cluster with shared versioned metadata
#[derive(Clone, Default)]
pub struct LocalCluster {
    shared: Arc<Mutex<Shared>>,
    listeners: Arc<Mutex<Vec<Registration>>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from already published hashes (e.g. copied from a coordinator)
    pub fn with_published_hashes(hashes: PublishedHashes) -> Self {
        let cluster = Self::new();
        {
            let mut shared = cluster.lock_shared();
            shared.metadata = Metadata::new(hashes);
            shared.version = 1;
        }
        cluster
    }

    /// Handle through which `node_id` sees and updates the cluster
    pub fn node(&self, node_id: impl Into<String>) -> LocalNode {
        LocalNode {
            node_id: node_id.into(),
            cluster: self.clone(),
        }
    }

    pub fn add_leadership_listener(
        &self,
        node_id: impl Into<String>,
        listener: Arc<dyn LeadershipListener>,
    ) {
        self.lock_listeners().push(Registration {
            node_id: node_id.into(),
            listener,
        });
    }

    /// Make `node_id` the coordinator (or clear the coordinator with `None`),
    /// notifying the listeners of the old and new coordinator.
    pub fn elect(&self, node_id: Option<&str>) {
        let previous = {
            let mut shared = self.lock_shared();
            let previous = shared.leader.take();
            shared.leader = node_id.map(str::to_string);
            previous
        };

        if previous.as_deref() == node_id {
            tracing::debug!(leader = ?node_id, "Leader unchanged");
            return;
        }
        tracing::info!(previous = ?previous, leader = ?node_id, "Leader changed");

        let registrations: Vec<(String, Arc<dyn LeadershipListener>)> = self
            .lock_listeners()
            .iter()
            .map(|r| (r.node_id.clone(), r.listener.clone()))
            .collect();

        if let Some(previous) = previous.as_deref() {
            for (id, listener) in &registrations {
                if id == previous {
                    listener.off_leader();
                }
            }
        }
        if let Some(leader) = node_id {
            for (id, listener) in &registrations {
                if id == leader {
                    listener.on_leader();
                }
            }
        }
    }

    pub fn leader(&self) -> Option<String> {
        self.lock_shared().leader.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock_shared().version
    }

    pub fn published_hashes(&self) -> PublishedHashes {
        self.lock_shared().metadata.hashes_of_consistent_settings().clone()
    }

    fn snapshot(&self, local_node_id: &str) -> ClusterState {
        let shared = self.lock_shared();
        ClusterState::new(
            shared.version,
            shared.metadata.clone(),
            local_node_id.to_string(),
            shared.leader.clone(),
        )
    }

    fn apply(&self, node_id: &str, source: &str, mut task: Box<dyn ClusterStateUpdateTask>) {
        let result = {
            let mut shared = self.lock_shared();
            if shared.leader.as_deref() != Some(node_id) {
                Err(ConcordError::Cluster(format!(
                    "node [{node_id}] is not the elected coordinator"
                )))
            } else {
                let current = ClusterState::new(
                    shared.version,
                    shared.metadata.clone(),
                    node_id.to_string(),
                    shared.leader.clone(),
                );
                task.execute(&current).map(|outcome| {
                    if let TaskOutcome::Replace(metadata) = &outcome {
                        shared.metadata = metadata.clone();
                        shared.version += 1;
                    }
                    (outcome, shared.version)
                })
            }
        };

        match result {
            Ok((outcome, version)) => {
                tracing::debug!(
                    source = source,
                    version = version,
                    changed = matches!(outcome, TaskOutcome::Replace(_)),
                    "Cluster state update applied"
                );
                task.on_applied(source, &outcome);
            }
            Err(e) => task.on_failure(source, &e),
        }
    }

    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One node's view of a [`LocalCluster`]
#[derive(Clone)]
pub struct LocalNode {
    node_id: String,
    cluster: LocalCluster,
}

impl ClusterService for LocalNode {
    fn state(&self) -> ClusterState {
        self.cluster.snapshot(&self.node_id)
    }

    fn submit_state_update_task(&self, source: &str, task: Box<dyn ClusterStateUpdateTask>) {
        tracing::trace!(
            node = %self.node_id,
            source = source,
            priority = ?task.priority(),
            "Submitting cluster state update"
        );
        self.cluster.apply(&self.node_id, source, task);
    }
}
