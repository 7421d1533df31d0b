// Queue Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{DomainError, Result};

/// Queue identifier (unique name)
pub type QueueName = String;

/// Argument keys owned by the consumer declaration; queue options may not override them
const DECLARATION_KEYS: [&str; 4] = ["queue", "exchange", "exchange_type", "routing_key"];

/// Queue record (persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub name: QueueName,
    pub exchange: Option<String>,
    pub exchange_type: Option<String>,
    pub routing_key: Option<String>,
    pub is_enabled: bool,
    pub created_at: i64, // epoch ms

    /// Additional JSON encoded queue options
    pub options: Option<String>,
}

impl Queue {
    pub fn new(name: impl Into<String>, created_at: i64) -> Self {
        Self {
            name: name.into(),
            exchange: None,
            exchange_type: None,
            routing_key: None,
            is_enabled: true,
            created_at,
            options: None,
        }
    }

    /// Deserialize the stored options payload (absent or blank ⇒ empty map)
    pub fn options_map(&self) -> Result<Map<String, Value>> {
        let raw = match self.options.as_deref().map(str::trim) {
            None | Some("") => return Ok(Map::new()),
            Some(raw) => raw,
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DomainError::InvalidQueueOptions {
                queue: self.name.clone(),
                reason: format!("expected a JSON object, got {}", other),
            }),
            Err(e) => Err(DomainError::InvalidQueueOptions {
                queue: self.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Resolve the consumer declaration sent with `add_consumer`
    ///
    /// Exchange and routing key default to the queue name; the exchange type
    /// stays unset when not declared.
    pub fn consumer_declaration(&self) -> Result<ConsumerDeclaration> {
        let options = self.options_map()?;
        if let Some(key) = DECLARATION_KEYS.iter().find(|k| options.contains_key(**k)) {
            return Err(DomainError::ReservedOption {
                queue: self.name.clone(),
                key: key.to_string(),
            });
        }

        Ok(ConsumerDeclaration {
            queue: self.name.clone(),
            exchange: non_empty(&self.exchange).unwrap_or(&self.name).to_string(),
            exchange_type: self.exchange_type.clone(),
            routing_key: non_empty(&self.routing_key)
                .unwrap_or(&self.name)
                .to_string(),
            options,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Fully resolved `add_consumer` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerDeclaration {
    pub queue: QueueName,
    pub exchange: String,
    pub exchange_type: Option<String>,
    pub routing_key: String,
    pub options: Map<String, Value>,
}

impl ConsumerDeclaration {
    /// Flatten into control command arguments (declared options merged in)
    pub fn into_arguments(self) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("queue".to_string(), Value::String(self.queue));
        args.insert("exchange".to_string(), Value::String(self.exchange));
        args.insert(
            "exchange_type".to_string(),
            self.exchange_type.map(Value::String).unwrap_or(Value::Null),
        );
        args.insert("routing_key".to_string(), Value::String(self.routing_key));
        args.extend(self.options);
        args
    }
}

/// A queue given either by name or as an already loaded record
#[derive(Debug, Clone)]
pub enum QueueRef {
    Name(QueueName),
    Record(Queue),
}

impl QueueRef {
    pub fn name(&self) -> &str {
        match self {
            QueueRef::Name(name) => name,
            QueueRef::Record(queue) => &queue.name,
        }
    }
}

impl From<Queue> for QueueRef {
    fn from(queue: Queue) -> Self {
        QueueRef::Record(queue)
    }
}

impl From<&Queue> for QueueRef {
    fn from(queue: &Queue) -> Self {
        QueueRef::Record(queue.clone())
    }
}

impl From<&str> for QueueRef {
    fn from(name: &str) -> Self {
        QueueRef::Name(name.to_string())
    }
}

impl From<String> for QueueRef {
    fn from(name: String) -> Self {
        QueueRef::Name(name)
    }
}
