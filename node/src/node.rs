//! The civic node: owns the engine and its collaborators, and runs the
//! background scheduler and the network servers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use civic_fanout::ChangeFanout;
use civic_rpc::RpcServer;
use civic_store::{MemoryStore, StoreSnapshot};
use civic_types::{AuthorityNotifier, Clock, SystemClock};
use civic_verification::{Collaborators, IssueEngine, LogNotifier};
use civic_websocket::WebSocketServer;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::shutdown::ShutdownController;

/// File name of the issue snapshot inside `data_dir`.
pub const SNAPSHOT_FILE: &str = "issues.snapshot";

pub struct CivicNode {
    pub config: NodeConfig,
    pub engine: Arc<IssueEngine>,
    pub store: Arc<MemoryStore>,
    pub fanout: ChangeFanout,
    pub clock: Arc<dyn Clock>,
    pub shutdown: Arc<ShutdownController>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl CivicNode {
    /// Build a node on the system clock, escalating to the log.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_collaborators(config, Arc::new(SystemClock), Arc::new(LogNotifier))
    }

    /// Build a node with an injected clock and authority notifier.
    ///
    /// Restores the store from `data_dir` when a snapshot exists and aligns
    /// the fan-out with the restored revisions.
    pub fn with_collaborators(
        config: NodeConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn AuthorityNotifier>,
    ) -> Result<Self, NodeError> {
        config.validate()?;

        let snapshot_path = config.data_dir.join(SNAPSHOT_FILE);
        let store = match StoreSnapshot::read_from(&snapshot_path)? {
            Some(snapshot) => {
                let store = MemoryStore::from_snapshot(snapshot)?;
                tracing::info!(
                    path = %snapshot_path.display(),
                    issues = store.issue_count()?,
                    "restored issue snapshot"
                );
                store
            }
            None => {
                tracing::info!(path = %snapshot_path.display(), "no snapshot found, starting empty");
                MemoryStore::new()
            }
        };
        let store = Arc::new(store);

        let fanout = ChangeFanout::new();
        let existing = civic_store::IssueStore::list_issues(store.as_ref())?;
        fanout.resume_from(existing.iter());

        let engine = IssueEngine::new(
            config.engine.clone(),
            Collaborators {
                store: store.clone(),
                clock: clock.clone(),
                publisher: Arc::new(fanout.clone()),
                notifier,
            },
        )?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            store,
            fanout,
            clock,
            shutdown: Arc::new(ShutdownController::new()),
            task_handles: Vec::new(),
        })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.config.data_dir.join(SNAPSHOT_FILE)
    }

    /// Spawn the scheduler and, when enabled, the RPC and WebSocket servers.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        tracing::info!(
            data_dir = %self.config.data_dir.display(),
            scheduler_interval_secs = self.config.scheduler_interval_secs,
            "civic node starting"
        );
        self.spawn_scheduler();

        if self.config.enable_rpc {
            let server = RpcServer::new(self.config.rpc_port, self.engine.clone());
            let shutdown = self.shutdown.signalled();
            self.task_handles.push(tokio::spawn(async move {
                if let Err(e) = server.start(shutdown).await {
                    tracing::error!(error = %e, "RPC server stopped");
                }
            }));
        }

        if self.config.enable_websocket {
            let server = WebSocketServer::new(self.config.websocket_port, self.fanout.clone());
            let shutdown = self.shutdown.signalled();
            self.task_handles.push(tokio::spawn(async move {
                if let Err(e) = server.start(shutdown).await {
                    tracing::error!(error = %e, "WebSocket server stopped");
                }
            }));
        }
        Ok(())
    }

    /// Run a scheduler pass every `scheduler_interval_secs` until shutdown.
    /// The first pass runs immediately.
    fn spawn_scheduler(&mut self) {
        let engine = Arc::clone(&self.engine);
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = Duration::from_secs(self.config.scheduler_interval_secs);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("scheduler task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = engine.run_scheduler_tick() {
                            tracing::error!(error = %e, "scheduler pass failed");
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Write the full store to the snapshot file.
    pub fn save_snapshot(&self) -> Result<(), NodeError> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let snapshot = self.store.snapshot(self.clock.now())?;
        let issues = snapshot.issues.len();
        snapshot.write_to(&self.snapshot_path())?;
        tracing::info!(issues, path = %self.snapshot_path().display(), "issue snapshot saved");
        Ok(())
    }

    /// Signal all tasks, wait for them, then persist the store.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("civic node stopping");
        self.shutdown.shutdown();

        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.save_snapshot()?;
        tracing::info!("civic node stopped");
        Ok(())
    }
}
