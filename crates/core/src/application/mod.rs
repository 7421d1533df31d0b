// Application Layer - Control protocol, supervision and record management

pub mod constants;
pub mod control;
pub mod locks;
pub mod pool;
pub mod registry;
pub mod supervisor;

// Re-exports
pub use control::ControlChannel;
pub use locks::NodeLocks;
pub use pool::{ConnectionPool, PoolRegistry, PooledConnection};
pub use registry::{BrokerRegistry, NewNode, NodeFilter, NodeRegistry, QueueRegistry, QueueSpec};
pub use supervisor::{NodeLayout, NodeSupervisor, QueueSyncReport};
