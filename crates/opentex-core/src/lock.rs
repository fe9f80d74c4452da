//! Per-project writer locks
//!
//! Every mutation of a project (save, delete, import, compile) holds the
//! project's lock, so one project has at most one writer at a time. Reads
//! are not locked; two saves of the same file stay last-write-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::name::SafeName;

#[derive(Debug, Default)]
pub struct ProjectLocks {
    locks: Mutex<HashMap<SafeName, Arc<AsyncMutex<()>>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `project`
    pub async fn acquire(&self, project: &SafeName) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody is holding or waiting on
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(project.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
