//! Named advisory locks.
//!
//! Allocation for a blueprint must be serialized across every worker, so
//! the allocator takes a named lock before it inspects the pool. The
//! [`LockService`] trait is the seam for a shared lock backend; the
//! in-process [`LocalLockService`] is enough when all workers share one
//! state store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};

/// Held lock. Released when dropped.
pub struct LockGuard {
    name: String,
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, inner: impl Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            _inner: Box::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock = %self.name, "lock released");
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("name", &self.name).finish()
    }
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Wait up to `timeout` for the named lock.
    async fn acquire(&self, name: &str, timeout: Duration) -> StateResult<LockGuard>;
}

/// In-process lock service keyed by name.
#[derive(Default)]
pub struct LocalLockService {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalLockService {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }
}

#[async_trait]
impl LockService for LocalLockService {
    async fn acquire(&self, name: &str, timeout: Duration) -> StateResult<LockGuard> {
        let handle = self.handle(name);
        match tokio::time::timeout(timeout, handle.lock_owned()).await {
            Ok(guard) => {
                debug!(lock = %name, "lock acquired");
                Ok(LockGuard::new(name, guard))
            }
            Err(_) => {
                warn!(lock = %name, ?timeout, "lock acquisition timed out");
                Err(StateError::LockTimeout {
                    name: name.to_string(),
                    waited: timeout,
                })
            }
        }
    }
}
