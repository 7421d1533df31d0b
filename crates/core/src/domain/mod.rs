// Domain Layer - Supervised records and control messages

pub mod broker;
pub mod control;
pub mod error;
pub mod node;
pub mod queue;

// Re-exports
pub use broker::{Broker, BrokerId, BrokerKey, NewBroker};
pub use control::{find_reply, is_truthy, ControlCommand, ControlReply, ControlRequest};
pub use error::DomainError;
pub use node::{Node, NodeName, DIRECT_QUEUE_PREFIX};
pub use queue::{ConsumerDeclaration, Queue, QueueName, QueueRef};
