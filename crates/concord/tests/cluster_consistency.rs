//! Multi-node scenarios over the in-process cluster.

use std::sync::Arc;

use concord::ConsistentSettingsService;
use concord::cluster::{LocalCluster, PublisherState, TermPublisher};
use concord::settings::{AffixSetting, SecureSetting, SettingDeclaration, Settings};
use concord_common::ConcordError;

struct Node {
    service: Arc<ConsistentSettingsService>,
    publisher: Arc<TermPublisher>,
}

fn declarations() -> Vec<SettingDeclaration> {
    vec![
        SecureSetting::consistent("bootstrap.password").into(),
        AffixSetting::consistent("remote", "secure_password").into(),
    ]
}

fn join(cluster: &LocalCluster, node_id: &str, settings: Settings) -> Node {
    let service = Arc::new(
        ConsistentSettingsService::new(
            Arc::new(settings),
            Arc::new(cluster.node(node_id)),
            declarations(),
        )
        .unwrap(),
    );
    let publisher = Arc::new(TermPublisher::new(service.clone()));
    cluster.add_leadership_listener(node_id, publisher.clone());
    Node { service, publisher }
}

fn settings(bootstrap: &str) -> Settings {
    Settings::new()
        .with_secure("bootstrap.password", bootstrap.to_string())
        .with_value("remote.east.url", "https://east")
        .with_secure("remote.east.secure_password", "east-secret")
}

#[test]
fn test_three_nodes_agree_after_election() {
    let cluster = LocalCluster::new();
    let nodes: Vec<Node> = ["node-1", "node-2", "node-3"]
        .iter()
        .map(|id| join(&cluster, id, settings("s3cret")))
        .collect();

    cluster.elect(Some("node-1"));

    assert_eq!(nodes[0].publisher.state(), PublisherState::Published);
    assert_eq!(cluster.published_hashes().len(), 2);
    for node in &nodes {
        assert!(node.service.are_all_consistent().unwrap());
    }
}

#[test]
fn test_divergent_follower_is_flagged_without_failing() {
    let cluster = LocalCluster::new();
    let leader = join(&cluster, "node-1", settings("s3cret"));
    let follower = join(&cluster, "node-2", settings("stale"));

    cluster.elect(Some("node-1"));

    assert!(leader.service.are_all_consistent().unwrap());
    assert!(!follower.service.are_all_consistent().unwrap());
}

#[test]
fn test_new_coordinator_republishes_its_own_view() {
    let cluster = LocalCluster::new();
    let first = join(&cluster, "node-1", settings("old"));
    let second = join(&cluster, "node-2", settings("new"));

    cluster.elect(Some("node-1"));
    let published_by_first = cluster.published_hashes();
    assert!(!second.service.are_all_consistent().unwrap());

    cluster.elect(Some("node-2"));

    assert_eq!(first.publisher.state(), PublisherState::Idle);
    assert_eq!(second.publisher.state(), PublisherState::Published);
    assert_ne!(cluster.published_hashes(), published_by_first);
    assert!(second.service.are_all_consistent().unwrap());
    assert!(!first.service.are_all_consistent().unwrap());
}

#[test]
fn test_reelection_publishes_fresh_salts() {
    let cluster = LocalCluster::new();
    let node = join(&cluster, "node-1", settings("s3cret"));

    cluster.elect(Some("node-1"));
    let first_term = cluster.published_hashes();
    let first_version = cluster.version();

    cluster.elect(None);
    assert_eq!(cluster.published_hashes(), first_term);

    cluster.elect(Some("node-1"));
    assert_eq!(node.publisher.state(), PublisherState::Published);
    assert_eq!(cluster.version(), first_version + 1);
    assert_ne!(cluster.published_hashes(), first_term);
    assert!(node.service.are_all_consistent().unwrap());
}

#[test]
fn test_follower_missing_template_namespace() {
    let cluster = LocalCluster::new();
    let _leader = join(&cluster, "node-1", settings("s3cret"));
    // No remote.east configured on this node
    let lagging = join(
        &cluster,
        "node-2",
        Settings::new().with_secure("bootstrap.password", "s3cret"),
    );

    cluster.elect(Some("node-1"));

    assert!(!lagging.service.are_all_consistent().unwrap());
}

#[test]
fn test_coordinator_with_missing_hash_aborts_check() {
    let cluster = LocalCluster::new();
    // Elected before it registered a publisher
    cluster.elect(Some("node-1"));
    let node = join(&cluster, "node-1", settings("s3cret"));

    let err = node.service.are_all_consistent().unwrap_err();
    assert!(matches!(err, ConcordError::CoordinatorInconsistent { .. }));
    assert!(err.is_protocol_violation());
}

#[test]
fn test_corrupt_metadata_aborts_every_check() {
    let corrupt = concord_common::PublishedHashes::from([(
        "bootstrap.password".to_string(),
        "only-one-part".to_string(),
    )]);
    let cluster = LocalCluster::with_published_hashes(corrupt);
    let follower = join(&cluster, "node-2", settings("s3cret"));

    assert!(matches!(
        follower.service.are_all_consistent(),
        Err(ConcordError::MalformedPublishedHash { .. })
    ));
}
