// Supervisor configuration (plain data; loading lives in the binary)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::constants::*;
use crate::domain::NewBroker;

/// Settings shared by the supervisor, its adapters and the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Working directory of supervised nodes (pidfiles and logfiles live here)
    pub workdir: PathBuf,
    /// `%n` is replaced with the node name
    pub pidfile_template: String,
    pub logfile_template: String,
    pub loglevel: String,
    /// Connections per broker pool
    pub pool_limit: usize,
    pub broadcast_timeout_ms: u64,
    pub launcher_program: String,
    pub launcher_prefix_args: Vec<String>,
    pub control_program: String,
    pub control_prefix_args: Vec<String>,
    pub default_broker: BrokerDefaults,
}

impl SupervisorConfig {
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            pidfile_template: DEFAULT_PIDFILE_TEMPLATE.to_string(),
            logfile_template: DEFAULT_LOGFILE_TEMPLATE.to_string(),
            loglevel: DEFAULT_LOGLEVEL.to_string(),
            pool_limit: DEFAULT_POOL_LIMIT,
            broadcast_timeout_ms: DEFAULT_BROADCAST_TIMEOUT.as_millis() as u64,
            launcher_program: DEFAULT_LAUNCHER_PROGRAM.to_string(),
            launcher_prefix_args: Vec::new(),
            control_program: DEFAULT_CONTROL_PROGRAM.to_string(),
            control_prefix_args: Vec::new(),
            default_broker: BrokerDefaults::default(),
        }
    }
}

/// Broker created on demand when no default broker is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerDefaults {
    pub hostname: String,
    pub port: u16,
    pub userid: String,
    pub password: String,
    pub virtual_host: String,
}

impl Default for BrokerDefaults {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            userid: DEFAULT_BROKER_USER.to_string(),
            password: DEFAULT_BROKER_PASSWORD.to_string(),
            virtual_host: DEFAULT_BROKER_VHOST.to_string(),
        }
    }
}

impl From<&BrokerDefaults> for NewBroker {
    fn from(d: &BrokerDefaults) -> Self {
        NewBroker {
            hostname: d.hostname.clone(),
            port: d.port,
            userid: d.userid.clone(),
            password: d.password.clone(),
            virtual_host: d.virtual_host.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.workdir, PathBuf::from("/var/run/scs"));
        assert_eq!(config.pidfile_template, "celeryd@%n.pid");
        assert_eq!(config.broadcast_timeout(), Duration::from_secs(1));
        assert_eq!(config.default_broker.port, 5672);
        assert_eq!(config.default_broker.virtual_host, "/");
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: SupervisorConfig =
            serde_json::from_str(r#"{"pool_limit": 3, "default_broker": {"hostname": "mq"}}"#)
                .unwrap();
        assert_eq!(config.pool_limit, 3);
        assert_eq!(config.default_broker.hostname, "mq");
        assert_eq!(config.default_broker.userid, "guest");
        assert_eq!(config.loglevel, "DEBUG");
    }
}
