// SCS Infrastructure - SQLite Adapter
// Implements: BrokerRepository, QueueRepository, NodeRepository

mod broker_repository;
mod connection;
mod error;
mod migration;
mod node_repository;
mod queue_repository;

pub use broker_repository::SqliteBrokerRepository;
pub use connection::create_pool;
pub use migration::run_migrations;
pub use node_repository::SqliteNodeRepository;
pub use queue_repository::SqliteQueueRepository;
