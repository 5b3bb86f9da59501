//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use concord::cluster::{LocalCluster, TermPublisher};
use concord::settings::{SettingDeclaration, Settings, consistent_declarations};
use concord::ConsistentSettingsService;
use concord_common::{ConsistencyReport, NodeRole};

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Node identifier in the cluster
    pub node_id: String,

    /// In-process cluster this node belongs to
    pub cluster: LocalCluster,

    /// Hash publication and consistency checks
    pub service: Arc<ConsistentSettingsService>,

    /// Publisher rebuilt at every election of this node
    pub publisher: Arc<TermPublisher>,

    /// Most recent consistency check
    pub last_report: Arc<RwLock<Option<ConsistencyReport>>>,
}

impl AppState {
    /// Create application state from config, loading the keystore and any
    /// already published hashes
    pub fn new(config: AppConfig) -> Result<Self> {
        let settings = config.load_settings()?;
        let cluster = match config.load_published_hashes()? {
            Some(hashes) => {
                tracing::info!(count = hashes.len(), "Seeding published hashes");
                LocalCluster::with_published_hashes(hashes)
            }
            None => LocalCluster::new(),
        };
        let declarations = config.declarations();
        Self::build(config, settings, declarations, cluster)
    }

    /// Wire the service and publisher for this node without electing it
    pub fn build(
        config: AppConfig,
        settings: Settings,
        declarations: Vec<SettingDeclaration>,
        cluster: LocalCluster,
    ) -> Result<Self> {
        let total = declarations.len();
        let declarations = consistent_declarations(declarations);
        if declarations.len() < total {
            tracing::warn!(
                skipped = total - declarations.len(),
                "Ignoring declarations that are not consistency-checked"
            );
        }

        let node_id = config.node_id.clone();
        let service = ConsistentSettingsService::new(
            Arc::new(settings),
            Arc::new(cluster.node(node_id.clone())),
            declarations,
        )
        .context("Failed to initialize consistent settings service")?;
        let service = Arc::new(service);

        let publisher = Arc::new(TermPublisher::new(service.clone()));
        cluster.add_leadership_listener(node_id.clone(), publisher.clone());

        Ok(Self {
            config,
            node_id,
            cluster,
            service,
            publisher,
            last_report: Arc::new(RwLock::new(None)),
        })
    }

    pub fn is_coordinator(&self) -> bool {
        self.cluster.leader().as_deref() == Some(self.node_id.as_str())
    }

    /// Elect this node if it is configured as coordinator
    pub async fn start_role(&self) -> Result<()> {
        if self.config.role == NodeRole::Coordinator {
            self.elect(Some(self.node_id.clone())).await?;
        }
        Ok(())
    }

    /// Change the coordinator. Hashes are computed on a blocking thread.
    pub async fn elect(&self, leader: Option<String>) -> Result<()> {
        let cluster = self.cluster.clone();
        tokio::task::spawn_blocking(move || cluster.elect(leader.as_deref()))
            .await
            .context("Election task panicked")?;
        Ok(())
    }

    /// Run the consistency check on a blocking thread and remember it
    pub async fn run_check(&self) -> Result<ConsistencyReport> {
        let service = self.service.clone();
        let report = tokio::task::spawn_blocking(move || service.report())
            .await
            .context("Consistency check task panicked")?;

        match (report.consistent, report.error.as_deref()) {
            (Some(true), _) => tracing::debug!(version = report.cluster_version, "Secure settings are consistent"),
            (Some(false), _) => tracing::warn!(version = report.cluster_version, "Secure settings are NOT consistent"),
            (None, error) => tracing::error!(error = ?error, "Consistency check aborted"),
        }

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    pub async fn last_report(&self) -> Option<ConsistencyReport> {
        self.last_report.read().await.clone()
    }
}

/// Periodically run the consistency check until shutdown
pub async fn consistency_worker(
    state: AppState,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let interval = Duration::from_secs(state.config.check_interval_secs.max(1));
    tracing::info!(interval = ?interval, "🔎 Consistency checker started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = state.run_check().await {
                    tracing::error!(error = %e, "Consistency check failed to run");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🔎 Consistency checker shutting down");
                break;
            }
        }
    }
}
