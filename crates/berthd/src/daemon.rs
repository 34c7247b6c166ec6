//! Daemon assembly: state store, blueprint registry and allocator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use berth_core::BerthConfig;
use berth_engine::{Allocator, BlueprintRegistry, LeaseQueue, PollConfig, WorkerPool};
use berth_state::{LocalLockService, StateStore};

const DEFAULT_CONFIG: &str = "berth.toml";

/// Load `path`, or `./berth.toml` if it exists, or an empty config.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BerthConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            warn!("no berth.toml found, running without blueprints");
            return Ok(BerthConfig::default());
        }
    };
    let config = BerthConfig::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    info!(path = %path.display(), blueprints = config.blueprints.len(), "configuration loaded");
    Ok(config)
}

pub struct Daemon {
    pub config: BerthConfig,
    pub store: StateStore,
    pub registry: Arc<BlueprintRegistry>,
    pub allocator: Arc<Allocator>,
    pub poll: PollConfig,
}

impl Daemon {
    pub fn open(config: BerthConfig, data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(|| config.data_dir());
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        // ── State store ──────────────────────────────────────────
        let db_path = data_dir.join("berth.redb");
        let store = StateStore::open(&db_path)?;
        info!(path = ?db_path, "state store opened");

        // ── Blueprints ───────────────────────────────────────────
        let poll = PollConfig::from_config(&config)?;
        let mut registry = BlueprintRegistry::new(store.clone(), poll);
        berth_blueprints::register_all(&mut registry);
        registry.load(&config.blueprints)?;
        let registry = Arc::new(registry);

        // ── Allocator ────────────────────────────────────────────
        let lock_timeout = config.lock_timeout()?;
        let allocator = Arc::new(Allocator::new(
            registry.clone(),
            Arc::new(LocalLockService::new()),
            lock_timeout,
        ));

        Ok(Self {
            config,
            store,
            registry,
            allocator,
            poll,
        })
    }

    /// Start a worker pool over a fresh queue holding every pending lease.
    pub fn start_workers(&self, workers: usize) -> anyhow::Result<(Arc<LeaseQueue>, WorkerPool)> {
        let queue = Arc::new(LeaseQueue::new(self.store.clone()));
        let pool = WorkerPool::spawn(workers, queue.clone(), self.allocator.clone());
        let resumed = queue.enqueue_pending()?;
        if resumed > 0 {
            info!(resumed, "pending leases queued");
        }
        Ok((queue, pool))
    }

    /// Run workers until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            blueprints = self.registry.all().len(),
            workers = self.config.workers(),
            "berth daemon starting"
        );
        let (_queue, workers) = self.start_workers(self.config.workers())?;

        tokio::signal::ctrl_c()
            .await
            .context("failed to install Ctrl-C handler")?;
        info!("shutdown signal received");

        workers.shutdown().await;
        info!("berth daemon stopped");
        Ok(())
    }
}
