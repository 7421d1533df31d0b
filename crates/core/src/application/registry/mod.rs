// Record registries - get-or-create semantics over the repository ports

mod broker;
mod node;
mod queue;

pub use broker::BrokerRegistry;
pub use node::{parse_queue_list, NewNode, NodeFilter, NodeRegistry};
pub use queue::{QueueRegistry, QueueSpec};
