//! Cluster coordination modules.
//!
//! Implements:
//! - Cluster state snapshots and the coordination traits
//! - In-process shared cluster state (`LocalCluster`)
//! - Coordinator-only hash publication

mod local;
mod publisher;
mod state;

pub use local::{LocalCluster, LocalNode};
pub use publisher::{HashesPublisher, PublisherState, TermPublisher};
pub use state::{
    ClusterService, ClusterState, ClusterStateUpdateTask, LeadershipListener, Metadata, TaskOutcome,
};
