// SCS Infrastructure - System Adapters
// Implements: ProcessProbe, ProcessLauncher, Connector

pub mod celery_transport;
pub mod multi_launcher;
pub mod pidfile_probe;

pub use celery_transport::{CeleryConnection, CeleryConnector};
pub use multi_launcher::MultiLauncher;
pub use pidfile_probe::PidfileProbe;
