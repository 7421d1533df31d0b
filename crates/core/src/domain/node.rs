// Node Domain Model

use serde::{Deserialize, Serialize};

use super::broker::BrokerId;
use super::queue::QueueName;

/// Node identifier (unique name)
pub type NodeName = String;

/// Prefix of the per-node direct-consume queue (`dq.<name>`)
pub const DIRECT_QUEUE_PREFIX: &str = "dq.";

/// Supervised worker node and its desired configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    /// Assigned work queues (order only matters for display)
    pub queues: Vec<QueueName>,
    pub max_concurrency: u32,
    pub min_concurrency: u32,
    pub is_enabled: bool,
    pub created_at: i64, // epoch ms
    /// `None` ⇒ the default broker is used
    pub broker_id: Option<BrokerId>,
}

impl Node {
    pub fn new(name: impl Into<String>, created_at: i64) -> Self {
        Self {
            name: name.into(),
            queues: Vec::new(),
            max_concurrency: 1,
            min_concurrency: 1,
            is_enabled: true,
            created_at,
            broker_id: None,
        }
    }

    pub fn direct_queue(&self) -> String {
        format!("{}{}", DIRECT_QUEUE_PREFIX, self.name)
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.queues.iter().any(|q| q == queue)
    }

    /// Returns false when the queue was already assigned
    pub fn assign_queue(&mut self, queue: impl Into<String>) -> bool {
        let queue = queue.into();
        if self.has_queue(&queue) {
            return false;
        }
        self.queues.push(queue);
        true
    }

    /// Returns false when the queue was not assigned
    pub fn unassign_queue(&mut self, queue: &str) -> bool {
        let before = self.queues.len();
        self.queues.retain(|q| q != queue);
        self.queues.len() != before
    }

    /// Update only the provided autoscale bounds
    pub fn set_autoscale(&mut self, max: Option<u32>, min: Option<u32>) {
        if let Some(max) = max {
            self.max_concurrency = max;
        }
        if let Some(min) = min {
            self.min_concurrency = min;
        }
    }
}
