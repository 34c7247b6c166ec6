//! Lease queue and allocation workers.
//!
//! Callers create pending leases through [`LeaseQueue::queue_for_activation`];
//! a [`WorkerPool`] drains the queue and runs the [`Allocator`] once per
//! lease. Failed allocations are logged and never retried: the lease is
//! already broken and the caller must request a new one.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use berth_core::{Lease, LeaseId, LeaseStatus};
use berth_state::StateStore;

use crate::allocator::Allocator;
use crate::error::{EngineError, EngineResult};
use crate::log::ScopeLog;
use crate::poll::{PollConfig, poll_until};

pub struct LeaseQueue {
    store: StateStore,
    tx: mpsc::UnboundedSender<LeaseId>,
    rx: Mutex<mpsc::UnboundedReceiver<LeaseId>>,
}

impl LeaseQueue {
    pub fn new(store: StateStore) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn enqueue(&self, lease_id: LeaseId) {
        if self.tx.send(lease_id).is_err() {
            warn!(lease = lease_id, "lease queue closed");
        }
    }

    /// Persist a new pending lease and queue it for allocation.
    pub fn queue_for_activation(&self, mut lease: Lease) -> EngineResult<Lease> {
        if lease.status != LeaseStatus::Pending {
            return Err(EngineError::InvalidTransition(format!(
                "only pending leases can be queued, not {}",
                lease.status
            )));
        }
        self.store.insert_lease(&mut lease)?;
        ScopeLog::new(self.store.clone())
            .with_lease(lease.id)
            .info(format!("queued {} lease", lease.resource_type));
        self.enqueue(lease.id);
        Ok(lease)
    }

    /// Queue every persisted pending lease, e.g. after a restart.
    pub fn enqueue_pending(&self) -> EngineResult<usize> {
        let pending = self.store.leases_with_status(&[LeaseStatus::Pending])?;
        for lease in &pending {
            self.enqueue(lease.id);
        }
        Ok(pending.len())
    }

    /// Wait for the next queued lease.
    pub async fn next(&self) -> Option<LeaseId> {
        self.rx.lock().await.recv().await
    }
}

/// A fixed set of tasks pulling from one [`LeaseQueue`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn spawn(workers: usize, queue: Arc<LeaseQueue>, allocator: Arc<Allocator>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = (0..workers.max(1))
            .map(|worker| {
                let queue = queue.clone();
                let allocator = allocator.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    run_worker(worker, queue, allocator, shutdown).await;
                })
            })
            .collect::<Vec<_>>();
        info!(workers = handles.len(), "allocation workers started");
        Self {
            handles,
            shutdown_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop taking new leases and wait for in-flight allocations.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "allocation worker panicked");
            }
        }
        info!("allocation workers stopped");
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<LeaseQueue>,
    allocator: Arc<Allocator>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "allocation worker started");
    loop {
        tokio::select! {
            next = queue.next() => {
                let Some(lease_id) = next else {
                    break;
                };
                debug!(worker, lease = lease_id, "allocating lease");
                if let Err(e) = allocator.allocate(lease_id).await {
                    warn!(worker, lease = lease_id, error = %e, "lease allocation failed");
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
    debug!(worker, "allocation worker stopped");
}

/// Poll a lease until it is active.
///
/// A lease that breaks fails the wait with its broken reason.
pub async fn wait_until_active(
    store: &StateStore,
    lease_id: LeaseId,
    poll: &PollConfig,
) -> EngineResult<Lease> {
    let what = format!("waiting for lease {lease_id} to become active");
    poll_until(poll, &what, move || async move {
        let lease = store
            .get_lease(lease_id)?
            .ok_or(EngineError::NoSuchLease(lease_id))?;
        match lease.status {
            LeaseStatus::Active => Ok(Some(lease)),
            LeaseStatus::Pending | LeaseStatus::Acquiring => Ok(None),
            LeaseStatus::Broken => Err(EngineError::LeaseBroken {
                lease: lease_id,
                reason: lease.broken_reason.unwrap_or_default(),
            }),
            LeaseStatus::Released => Err(EngineError::LeaseNotActive(lease_id)),
        }
    })
    .await
}
