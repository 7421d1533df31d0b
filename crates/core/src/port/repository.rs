// Record Repository Ports (Broker, Queue, Node persistence)

use crate::domain::{Broker, BrokerId, BrokerKey, NewBroker, Node, Queue};
use crate::error::Result;
use async_trait::async_trait;

/// Broker record persistence
#[async_trait]
pub trait BrokerRepository: Send + Sync {
    /// Insert a new broker; fails on a duplicate (hostname, port, vhost)
    async fn insert(&self, broker: &NewBroker) -> Result<Broker>;

    async fn find_by_id(&self, id: BrokerId) -> Result<Option<Broker>>;

    async fn find_by_key(&self, key: &BrokerKey) -> Result<Option<Broker>>;

    /// The broker flagged default, if any
    async fn find_default(&self) -> Result<Option<Broker>>;

    /// Flag `id` as default and clear the flag everywhere else
    async fn set_default(&self, id: BrokerId) -> Result<()>;

    async fn list(&self) -> Result<Vec<Broker>>;
}

/// Queue record persistence
#[async_trait]
pub trait QueueRepository: Send + Sync {
    async fn insert(&self, queue: &Queue) -> Result<()>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Queue>>;

    async fn update(&self, queue: &Queue) -> Result<()>;

    async fn list(&self) -> Result<Vec<Queue>>;

    async fn list_enabled(&self) -> Result<Vec<Queue>>;
}

/// Node record persistence (including queue assignments)
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn insert(&self, node: &Node) -> Result<()>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Node>>;

    /// Persist every field, replacing the stored queue assignments
    async fn update(&self, node: &Node) -> Result<()>;

    /// Returns false if no such node existed
    async fn delete(&self, name: &str) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Node>>;

    async fn list_enabled(&self) -> Result<Vec<Node>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory broker repository
    #[derive(Default)]
    pub struct InMemoryBrokerRepository {
        brokers: Mutex<BTreeMap<BrokerId, Broker>>,
    }

    impl InMemoryBrokerRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BrokerRepository for InMemoryBrokerRepository {
        async fn insert(&self, broker: &NewBroker) -> Result<Broker> {
            let mut brokers = self.brokers.lock().unwrap();
            let key = broker.key();
            if brokers.values().any(|b| b.key() == key) {
                return Err(AppError::Conflict(format!(
                    "Broker {}:{}{} already exists",
                    key.hostname, key.port, key.virtual_host
                )));
            }
            let id = brokers.keys().next_back().copied().unwrap_or(0) + 1;
            let stored = broker.clone().into_broker(id);
            brokers.insert(id, stored.clone());
            Ok(stored)
        }

        async fn find_by_id(&self, id: BrokerId) -> Result<Option<Broker>> {
            Ok(self.brokers.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_key(&self, key: &BrokerKey) -> Result<Option<Broker>> {
            Ok(self
                .brokers
                .lock()
                .unwrap()
                .values()
                .find(|b| &b.key() == key)
                .cloned())
        }

        async fn find_default(&self) -> Result<Option<Broker>> {
            Ok(self
                .brokers
                .lock()
                .unwrap()
                .values()
                .find(|b| b.is_default)
                .cloned())
        }

        async fn set_default(&self, id: BrokerId) -> Result<()> {
            let mut brokers = self.brokers.lock().unwrap();
            if !brokers.contains_key(&id) {
                return Err(AppError::NotFound(format!("Broker {} not found", id)));
            }
            for (bid, broker) in brokers.iter_mut() {
                broker.is_default = *bid == id;
            }
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Broker>> {
            Ok(self.brokers.lock().unwrap().values().cloned().collect())
        }
    }

    /// In-memory queue repository
    #[derive(Default)]
    pub struct InMemoryQueueRepository {
        queues: Mutex<BTreeMap<String, Queue>>,
    }

    impl InMemoryQueueRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl QueueRepository for InMemoryQueueRepository {
        async fn insert(&self, queue: &Queue) -> Result<()> {
            let mut queues = self.queues.lock().unwrap();
            if queues.contains_key(&queue.name) {
                return Err(AppError::Conflict(format!(
                    "Queue {} already exists",
                    queue.name
                )));
            }
            queues.insert(queue.name.clone(), queue.clone());
            Ok(())
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<Queue>> {
            Ok(self.queues.lock().unwrap().get(name).cloned())
        }

        async fn update(&self, queue: &Queue) -> Result<()> {
            match self.queues.lock().unwrap().get_mut(&queue.name) {
                Some(stored) => {
                    *stored = queue.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Queue {} not found", queue.name))),
            }
        }

        async fn list(&self) -> Result<Vec<Queue>> {
            Ok(self.queues.lock().unwrap().values().cloned().collect())
        }

        async fn list_enabled(&self) -> Result<Vec<Queue>> {
            Ok(self
                .queues
                .lock()
                .unwrap()
                .values()
                .filter(|q| q.is_enabled)
                .cloned()
                .collect())
        }
    }

    /// In-memory node repository, counting updates
    #[derive(Default)]
    pub struct InMemoryNodeRepository {
        nodes: Mutex<BTreeMap<String, Node>>,
        updates: AtomicUsize,
    }

    impl InMemoryNodeRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeRepository for InMemoryNodeRepository {
        async fn insert(&self, node: &Node) -> Result<()> {
            let mut nodes = self.nodes.lock().unwrap();
            if nodes.contains_key(&node.name) {
                return Err(AppError::Conflict(format!(
                    "Node {} already exists",
                    node.name
                )));
            }
            nodes.insert(node.name.clone(), node.clone());
            Ok(())
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<Node>> {
            Ok(self.nodes.lock().unwrap().get(name).cloned())
        }

        async fn update(&self, node: &Node) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            match self.nodes.lock().unwrap().get_mut(&node.name) {
                Some(stored) => {
                    *stored = node.clone();
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Node {} not found", node.name))),
            }
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            Ok(self.nodes.lock().unwrap().remove(name).is_some())
        }

        async fn list(&self) -> Result<Vec<Node>> {
            Ok(self.nodes.lock().unwrap().values().cloned().collect())
        }

        async fn list_enabled(&self) -> Result<Vec<Node>> {
            Ok(self
                .nodes
                .lock()
                .unwrap()
                .values()
                .filter(|n| n.is_enabled)
                .cloned()
                .collect())
        }
    }
}
