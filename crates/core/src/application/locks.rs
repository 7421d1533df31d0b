// Per-node lifecycle locks
//
// Keyed by node name, not by record instance: two `Node` values carrying the
// same name serialize against each other. Entries are created lazily and
// never removed.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

static GLOBAL_NODE_LOCKS: Lazy<Arc<NodeLocks>> = Lazy::new(|| Arc::new(NodeLocks::new()));

/// Lock table: node name → mutex
#[derive(Default)]
pub struct NodeLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table shared by every supervisor
    pub fn global() -> Arc<NodeLocks> {
        Arc::clone(&GLOBAL_NODE_LOCKS)
    }

    pub fn lock_for(&self, node: &str) -> Arc<Mutex<()>> {
        // Fast path avoids cloning the key for existing entries
        if let Some(lock) = self.locks.get(node) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(node.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Wait for exclusive lifecycle access to `node`
    pub async fn acquire(&self, node: &str) -> OwnedMutexGuard<()> {
        self.lock_for(node).lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_serializes() {
        let locks = NodeLocks::new();
        let guard = locks.acquire("worker1").await;

        let blocked = tokio::time::timeout(Duration::from_millis(30), locks.acquire("worker1")).await;
        assert!(blocked.is_err());

        let other = tokio::time::timeout(Duration::from_millis(30), locks.acquire("worker2")).await;
        assert!(other.is_ok());

        drop(guard);
        let freed = tokio::time::timeout(Duration::from_millis(30), locks.acquire("worker1")).await;
        assert!(freed.is_ok());
    }

    #[test]
    fn test_entries_are_shared_and_kept() {
        let locks = NodeLocks::new();
        let a = locks.lock_for("n");
        let b = locks.lock_for("n");
        assert!(Arc::ptr_eq(&a, &b));
        drop(a);
        drop(b);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&NodeLocks::global(), &NodeLocks::global()));
    }
}
