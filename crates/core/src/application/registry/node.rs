// Node Registry - stored node records and their queue assignments
//
// Changes made here are local only; the supervisor applies them to running
// nodes.

use std::sync::Arc;
use tracing::info;

use crate::domain::{BrokerId, Node, QueueName};
use crate::error::{AppError, Result};
use crate::port::{BrokerRepository, IdProvider, NodeRepository, QueueRepository, TimeProvider};

/// Parameters for adding a node
#[derive(Debug, Clone)]
pub struct NewNode {
    /// `None` ⇒ a generated unique name
    pub name: Option<String>,
    pub queues: Vec<QueueName>,
    pub max_concurrency: u32,
    pub min_concurrency: u32,
    pub broker_id: Option<BrokerId>,
}

impl Default for NewNode {
    fn default() -> Self {
        Self {
            name: None,
            queues: Vec::new(),
            max_concurrency: 1,
            min_concurrency: 1,
            broker_id: None,
        }
    }
}

/// Which nodes a bulk queue assignment applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    Enabled,
    Names(Vec<String>),
}

/// Split a comma-separated queue list, dropping blanks and duplicates
pub fn parse_queue_list(raw: &str) -> Vec<QueueName> {
    let mut queues: Vec<QueueName> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !queues.iter().any(|q| q == name) {
            queues.push(name.to_string());
        }
    }
    queues
}

pub struct NodeRegistry {
    nodes: Arc<dyn NodeRepository>,
    queues: Arc<dyn QueueRepository>,
    brokers: Arc<dyn BrokerRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl NodeRegistry {
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        queues: Arc<dyn QueueRepository>,
        brokers: Arc<dyn BrokerRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            nodes,
            queues,
            brokers,
            id_provider,
            time_provider,
        }
    }

    /// Create a node record
    ///
    /// # Errors
    /// - AppError::Conflict if a node with that name exists
    /// - AppError::NotFound if a queue or the broker is not stored
    pub async fn add(&self, req: NewNode) -> Result<Node> {
        let name = match req.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.id_provider.generate_id(),
        };
        if self.nodes.find_by_name(&name).await?.is_some() {
            return Err(AppError::Conflict(format!("Node {} already exists", name)));
        }

        let mut node = Node::new(name, self.time_provider.now_millis());
        node.max_concurrency = req.max_concurrency;
        node.min_concurrency = req.min_concurrency;

        for queue in req.queues {
            self.ensure_queue(&queue).await?;
            node.assign_queue(queue);
        }
        if let Some(id) = req.broker_id {
            if self.brokers.find_by_id(id).await?.is_none() {
                return Err(AppError::NotFound(format!("Broker {} not found", id)));
            }
            node.broker_id = Some(id);
        }

        self.nodes.insert(&node).await?;
        info!(node = %node.name, queues = ?node.queues, "Node added");
        Ok(node)
    }

    pub async fn get(&self, name: &str) -> Result<Node> {
        self.nodes
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Node {} not found", name)))
    }

    pub async fn all(&self) -> Result<Vec<Node>> {
        self.nodes.list().await
    }

    pub async fn enabled(&self) -> Result<Vec<Node>> {
        self.nodes.list_enabled().await
    }

    /// Delete the record (the process, if any, is left alone)
    pub async fn remove(&self, name: &str) -> Result<()> {
        if !self.nodes.delete(name).await? {
            return Err(AppError::NotFound(format!("Node {} not found", name)));
        }
        info!(node = %name, "Node removed");
        Ok(())
    }

    pub async fn enable(&self, name: &str) -> Result<Node> {
        self.set_enabled(name, true).await
    }

    pub async fn disable(&self, name: &str) -> Result<Node> {
        self.set_enabled(name, false).await
    }

    /// Assign `queue` to every node matching `filter`; returns those nodes
    pub async fn add_queue_to_nodes(&self, queue: &str, filter: &NodeFilter) -> Result<Vec<Node>> {
        self.ensure_queue(queue).await?;

        let mut changed = Vec::new();
        for mut node in self.select(filter).await? {
            node.assign_queue(queue);
            self.nodes.update(&node).await?;
            changed.push(node);
        }
        Ok(changed)
    }

    /// Unassign `queue` from matching nodes that have it; returns those nodes
    pub async fn remove_queue_from_nodes(
        &self,
        queue: &str,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>> {
        let mut changed = Vec::new();
        for mut node in self.select(filter).await? {
            if node.unassign_queue(queue) {
                self.nodes.update(&node).await?;
                changed.push(node);
            }
        }
        Ok(changed)
    }

    async fn select(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        match filter {
            NodeFilter::All => self.nodes.list().await,
            NodeFilter::Enabled => self.nodes.list_enabled().await,
            NodeFilter::Names(names) => {
                let mut nodes = Vec::with_capacity(names.len());
                for name in names {
                    nodes.push(self.get(name).await?);
                }
                Ok(nodes)
            }
        }
    }

    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        match self.queues.find_by_name(queue).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Queue {} not found", queue))),
        }
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<Node> {
        let mut node = self.get(name).await?;
        node.is_enabled = enabled;
        self.nodes.update(&node).await?;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Queue;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::repository::mocks::{
        InMemoryBrokerRepository, InMemoryNodeRepository, InMemoryQueueRepository,
    };
    use crate::port::time_provider::FixedTimeProvider;

    async fn registry_with_queues(names: &[&str]) -> NodeRegistry {
        let queues = Arc::new(InMemoryQueueRepository::new());
        for name in names {
            queues.insert(&Queue::new(*name, 0)).await.unwrap();
        }
        NodeRegistry::new(
            Arc::new(InMemoryNodeRepository::new()),
            queues,
            Arc::new(InMemoryBrokerRepository::new()),
            Arc::new(SequentialIdProvider::new("node")),
            Arc::new(FixedTimeProvider(5)),
        )
    }

    #[test]
    fn test_parse_queue_list() {
        assert_eq!(parse_queue_list("a, b,,a ,c"), vec!["a", "b", "c"]);
        assert!(parse_queue_list(" , ").is_empty());
    }

    #[tokio::test]
    async fn test_add_generates_name_and_validates_queues() {
        let registry = registry_with_queues(&["images"]).await;

        let node = registry
            .add(NewNode {
                queues: vec!["images".to_string()],
                ..NewNode::default()
            })
            .await
            .unwrap();
        assert_eq!(node.name, "node-1");
        assert_eq!(node.queues, vec!["images"]);
        assert_eq!(node.created_at, 5);

        let missing = registry
            .add(NewNode {
                name: Some("w2".to_string()),
                queues: vec!["nope".to_string()],
                ..NewNode::default()
            })
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let unknown_broker = registry
            .add(NewNode {
                name: Some("w3".to_string()),
                broker_id: Some(9),
                ..NewNode::default()
            })
            .await;
        assert!(matches!(unknown_broker, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_duplicate_name_conflicts() {
        let registry = registry_with_queues(&[]).await;
        let req = NewNode {
            name: Some("w1".to_string()),
            ..NewNode::default()
        };
        registry.add(req.clone()).await.unwrap();
        assert!(matches!(registry.add(req).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_bulk_queue_assignment() {
        let registry = registry_with_queues(&["q"]).await;
        for name in ["a", "b", "c"] {
            registry
                .add(NewNode {
                    name: Some(name.to_string()),
                    ..NewNode::default()
                })
                .await
                .unwrap();
        }
        registry.disable("c").await.unwrap();

        let added = registry
            .add_queue_to_nodes("q", &NodeFilter::Enabled)
            .await
            .unwrap();
        assert_eq!(added.len(), 2);
        assert!(registry.get("a").await.unwrap().has_queue("q"));
        assert!(!registry.get("c").await.unwrap().has_queue("q"));

        let removed = registry
            .remove_queue_from_nodes("q", &NodeFilter::All)
            .await
            .unwrap();
        let names: Vec<String> = removed.into_iter().map(|n| n.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = registry_with_queues(&[]).await;
        registry
            .add(NewNode {
                name: Some("gone".to_string()),
                ..NewNode::default()
            })
            .await
            .unwrap();

        registry.remove("gone").await.unwrap();
        assert!(matches!(registry.remove("gone").await, Err(AppError::NotFound(_))));
    }
}
