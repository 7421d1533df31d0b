// Queue Registry

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::domain::Queue;
use crate::error::{AppError, Result};
use crate::port::{QueueRepository, TimeProvider};

/// Declaration used when adding a queue
#[derive(Debug, Clone, Default)]
pub struct QueueSpec {
    pub name: String,
    pub exchange: Option<String>,
    pub exchange_type: Option<String>,
    pub routing_key: Option<String>,
    /// Extra consumer options, stored as a JSON object
    pub options: Map<String, Value>,
}

impl QueueSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

pub struct QueueRegistry {
    repo: Arc<dyn QueueRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueRegistry {
    pub fn new(repo: Arc<dyn QueueRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            repo,
            time_provider,
        }
    }

    /// Get or create a queue by name; an existing declaration is kept as is
    pub async fn add(&self, spec: QueueSpec) -> Result<Queue> {
        if spec.name.trim().is_empty() {
            return Err(AppError::Validation("Queue name cannot be empty".to_string()));
        }
        if let Some(existing) = self.repo.find_by_name(&spec.name).await? {
            return Ok(existing);
        }

        let mut queue = Queue::new(spec.name, self.time_provider.now_millis());
        queue.exchange = spec.exchange;
        queue.exchange_type = spec.exchange_type;
        queue.routing_key = spec.routing_key;
        queue.options = if spec.options.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&Value::Object(spec.options))?)
        };

        self.repo.insert(&queue).await?;
        info!(queue = %queue.name, "Queue added");
        Ok(queue)
    }

    pub async fn get(&self, name: &str) -> Result<Queue> {
        self.repo
            .find_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name)))
    }

    pub async fn all(&self) -> Result<Vec<Queue>> {
        self.repo.list().await
    }

    pub async fn enabled(&self) -> Result<Vec<Queue>> {
        self.repo.list_enabled().await
    }

    pub async fn enable(&self, name: &str) -> Result<Queue> {
        self.set_enabled(name, true).await
    }

    pub async fn disable(&self, name: &str) -> Result<Queue> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<Queue> {
        let mut queue = self.get(name).await?;
        queue.is_enabled = enabled;
        self.repo.update(&queue).await?;
        Ok(queue)
    }
}
