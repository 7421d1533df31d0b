// Table rows for list commands

use scs_core::domain::{Broker, Node, Queue};
use tabled::Tabled;

#[derive(Tabled)]
pub struct NodeRow {
    name: String,
    enabled: bool,
    queues: String,
    autoscale: String,
    broker: String,
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            enabled: node.is_enabled,
            queues: node.queues.join(","),
            autoscale: format!("{},{}", node.max_concurrency, node.min_concurrency),
            broker: node
                .broker_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "default".to_string()),
        }
    }
}

#[derive(Tabled)]
pub struct QueueRow {
    name: String,
    enabled: bool,
    exchange: String,
    exchange_type: String,
    routing_key: String,
    options: String,
}

impl From<&Queue> for QueueRow {
    fn from(queue: &Queue) -> Self {
        let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        Self {
            name: queue.name.clone(),
            enabled: queue.is_enabled,
            exchange: or_dash(&queue.exchange),
            exchange_type: or_dash(&queue.exchange_type),
            routing_key: or_dash(&queue.routing_key),
            options: or_dash(&queue.options),
        }
    }
}

#[derive(Tabled)]
pub struct BrokerRow {
    id: i64,
    url: String,
    default: bool,
}

impl From<&Broker> for BrokerRow {
    fn from(broker: &Broker) -> Self {
        Self {
            id: broker.id,
            // Display masks the password
            url: broker.to_string(),
            default: broker.is_default,
        }
    }
}
