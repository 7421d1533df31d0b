// Port Layer - Interfaces for external collaborators

pub mod id_provider; // For deterministic testing
pub mod process_launcher;
pub mod process_probe;
pub mod repository;
pub mod time_provider;
pub mod transport;

// Re-exports
pub use id_provider::IdProvider;
pub use process_launcher::{LaunchAction, LaunchOutcome, LauncherError, ProcessLauncher};
pub use process_probe::{ProbeError, ProcessProbe};
pub use repository::{BrokerRepository, NodeRepository, QueueRepository};
pub use time_provider::TimeProvider;
pub use transport::{BrokerConnection, Connector, TransportError};
