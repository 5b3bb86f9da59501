//! Coordinator-only publication of consistent setting hashes.
//!
//! A [`HashesPublisher`] carries the hashes computed for one leadership
//! term. [`TermPublisher`] builds a fresh one every time the local node is
//! elected and drops it when leadership is lost.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

use concord_common::constants::PUBLISH_TASK_SOURCE;
use concord_common::{ConcordError, Priority, PublishedHashes, Result};

use super::state::{
    ClusterService, ClusterState, ClusterStateUpdateTask, LeadershipListener, TaskOutcome,
};
use crate::consistency::ConsistentSettingsService;

/// Where the publisher of the current term stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherState {
    /// Not the coordinator, or nothing attempted yet
    Idle,
    /// Update submitted, not yet applied
    Submitted,
    /// Our hashes replaced the published ones
    Published,
    /// Published hashes already matched ours
    NoOp,
    /// Submission failed; waits for the next election
    Failed,
}

type SharedState = Arc<Mutex<PublisherState>>;

fn set_state(state: &SharedState, value: PublisherState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Publishes hashes eagerly computed for one leadership term
pub struct HashesPublisher {
    computed: Arc<PublishedHashes>,
    cluster: Arc<dyn ClusterService>,
    state: SharedState,
}

impl HashesPublisher {
    pub fn new(computed: PublishedHashes, cluster: Arc<dyn ClusterService>) -> Self {
        Self {
            computed: Arc::new(computed),
            cluster,
            state: Arc::new(Mutex::new(PublisherState::Idle)),
        }
    }

    pub fn state(&self) -> PublisherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LeadershipListener for HashesPublisher {
    fn on_leader(&self) {
        let current = self.cluster.state();
        if current.metadata().hashes_of_consistent_settings() == self.computed.as_ref() {
            tracing::debug!("Nothing to publish. What is already published matches this node's view.");
            set_state(&self.state, PublisherState::NoOp);
            return;
        }

        set_state(&self.state, PublisherState::Submitted);
        self.cluster.submit_state_update_task(
            PUBLISH_TASK_SOURCE,
            Box::new(PublishHashesTask {
                computed: self.computed.clone(),
                state: self.state.clone(),
            }),
        );
    }

    fn off_leader(&self) {
        tracing::trace!("No longer the coordinator, nothing to do");
        set_state(&self.state, PublisherState::Idle);
    }
}

/// Replaces the published hashes unless they already match
struct PublishHashesTask {
    computed: Arc<PublishedHashes>,
    state: SharedState,
}

impl ClusterStateUpdateTask for PublishHashesTask {
    fn priority(&self) -> Priority {
        Priority::Urgent
    }

    fn execute(&mut self, current: &ClusterState) -> Result<TaskOutcome> {
        let metadata = current.metadata();
        if metadata.hashes_of_consistent_settings() == self.computed.as_ref() {
            tracing::debug!("Nothing to publish. What is already published matches this node's view.");
            return Ok(TaskOutcome::Unchanged);
        }
        Ok(TaskOutcome::Replace(
            metadata.with_hashes_of_consistent_settings(self.computed.clone()),
        ))
    }

    fn on_failure(&mut self, source: &str, error: &ConcordError) {
        tracing::error!(source = source, error = %error, "Unable to publish secure settings hashes");
        set_state(&self.state, PublisherState::Failed);
    }

    fn on_applied(&mut self, _source: &str, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Unchanged => set_state(&self.state, PublisherState::NoOp),
            TaskOutcome::Replace(_) => {
                tracing::info!(settings = self.computed.len(), "Published secure settings hashes");
                set_state(&self.state, PublisherState::Published);
            }
        }
    }
}

/// Publisher of the current term, if any
enum Term {
    Idle,
    Active(HashesPublisher),
    /// The hashes could not be computed at election
    BuildFailed,
}

/// Builds a fresh [`HashesPublisher`] at each election of the local node
pub struct TermPublisher {
    service: Arc<ConsistentSettingsService>,
    current: Mutex<Term>,
}

impl TermPublisher {
    pub fn new(service: Arc<ConsistentSettingsService>) -> Self {
        Self {
            service,
            current: Mutex::new(Term::Idle),
        }
    }

    /// State of the current term's publisher, `Idle` between terms
    pub fn state(&self) -> PublisherState {
        match &*self.current.lock().unwrap_or_else(PoisonError::into_inner) {
            Term::Idle => PublisherState::Idle,
            Term::Active(publisher) => publisher.state(),
            Term::BuildFailed => PublisherState::Failed,
        }
    }
}

impl LeadershipListener for TermPublisher {
    fn on_leader(&self) {
        let term = match self.service.new_hash_publisher() {
            Ok(publisher) => {
                publisher.on_leader();
                Term::Active(publisher)
            }
            Err(e) => {
                tracing::error!(error = %e, "Unable to compute secure settings hashes");
                Term::BuildFailed
            }
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = term;
    }

    fn off_leader(&self) {
        let term = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            Term::Idle,
        );
        if let Term::Active(publisher) = term {
            publisher.off_leader();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{LocalCluster, LocalNode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn computed() -> PublishedHashes {
        PublishedHashes::from([("bootstrap.password".to_string(), "c2FsdA:aGFzaA==".to_string())])
    }

    #[test]
    fn test_publishes_on_leader() {
        let cluster = LocalCluster::new();
        let node = Arc::new(cluster.node("node-1"));
        cluster.elect(Some("node-1"));

        let publisher = HashesPublisher::new(computed(), node);
        publisher.on_leader();

        assert_eq!(publisher.state(), PublisherState::Published);
        assert_eq!(cluster.published_hashes(), computed());
        assert_eq!(cluster.version(), 1);
    }

    /// Forwards to a [`LocalNode`] and counts submissions
    struct CountingNode {
        inner: LocalNode,
        submitted: AtomicUsize,
    }

    impl ClusterService for CountingNode {
        fn state(&self) -> ClusterState {
            self.inner.state()
        }

        fn submit_state_update_task(&self, source: &str, task: Box<dyn ClusterStateUpdateTask>) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            self.inner.submit_state_update_task(source, task);
        }
    }

    #[test]
    fn test_identical_published_map_is_noop() {
        let cluster = LocalCluster::with_published_hashes(computed());
        let node = Arc::new(CountingNode {
            inner: cluster.node("node-1"),
            submitted: AtomicUsize::new(0),
        });
        cluster.elect(Some("node-1"));

        let publisher = HashesPublisher::new(computed(), node.clone());
        publisher.on_leader();

        assert_eq!(publisher.state(), PublisherState::NoOp);
        assert_eq!(node.submitted.load(Ordering::SeqCst), 0);
        assert_eq!(cluster.version(), 1);
    }

    #[test]
    fn test_changed_map_is_submitted_once() {
        let cluster = LocalCluster::new();
        let node = Arc::new(CountingNode {
            inner: cluster.node("node-1"),
            submitted: AtomicUsize::new(0),
        });
        cluster.elect(Some("node-1"));

        let publisher = HashesPublisher::new(computed(), node.clone());
        publisher.on_leader();

        assert_eq!(publisher.state(), PublisherState::Published);
        assert_eq!(node.submitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_term_publisher_reports_failed_build() {
        use crate::settings::{SecureSetting, Settings};

        let cluster = LocalCluster::new();
        // Declarations are not filtered here, so building the map fails
        let service = ConsistentSettingsService::new(
            Arc::new(Settings::new().with_secure("plain.password", "s3cret")),
            Arc::new(cluster.node("node-1")),
            vec![SecureSetting::new("plain.password", false).into()],
        )
        .unwrap();
        let term = Arc::new(TermPublisher::new(Arc::new(service)));
        cluster.add_leadership_listener("node-1", term.clone());

        assert_eq!(term.state(), PublisherState::Idle);
        cluster.elect(Some("node-1"));
        assert_eq!(term.state(), PublisherState::Failed);
        assert!(cluster.published_hashes().is_empty());

        cluster.elect(None);
        assert_eq!(term.state(), PublisherState::Idle);
    }

    #[test]
    fn test_failed_submission_is_not_retried() {
        let cluster = LocalCluster::new();
        let node = Arc::new(cluster.node("node-2"));
        cluster.elect(Some("node-1"));

        let publisher = HashesPublisher::new(computed(), node);
        publisher.on_leader();

        assert_eq!(publisher.state(), PublisherState::Failed);
        assert!(cluster.published_hashes().is_empty());
    }

    #[test]
    fn test_off_leader_returns_to_idle_and_keeps_data() {
        let cluster = LocalCluster::new();
        let node = Arc::new(cluster.node("node-1"));
        cluster.elect(Some("node-1"));

        let publisher = HashesPublisher::new(computed(), node);
        publisher.on_leader();
        publisher.off_leader();

        assert_eq!(publisher.state(), PublisherState::Idle);
        assert_eq!(cluster.published_hashes(), computed());
    }
}
