// Broker connection pools
//
// One bounded pool per broker identity, created lazily and shared by every
// caller addressing that broker. Acquiring blocks while the pool is
// exhausted; a leased connection returns to the pool when its guard drops.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::domain::{Broker, BrokerKey, ControlReply, ControlRequest};
use crate::port::{BrokerConnection, Connector, TransportError};

/// Bounded connection pool for one broker
pub struct ConnectionPool {
    broker: Broker,
    connector: Arc<dyn Connector>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn BrokerConnection>>>,
    limit: usize,
}

impl ConnectionPool {
    /// A limit of 0 is raised to 1
    pub fn new(broker: Broker, connector: Arc<dyn Connector>, limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            broker,
            connector,
            permits: Arc::new(Semaphore::new(limit)),
            idle: Mutex::new(Vec::new()),
            limit,
        }
    }

    /// Lease a connection, waiting until one is available
    ///
    /// Reuses an idle connection when possible, otherwise opens a new one.
    /// The permit is given back if connecting fails.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, TransportError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::ConnectFailed("connection pool closed".to_string()))?;

        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!(broker = %self.broker, "Opening broker connection");
                self.connector.connect(&self.broker).await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Connections that can be leased right now without waiting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, conn: Box<dyn BrokerConnection>) {
        if conn.is_open() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(conn);
        } else {
            debug!(broker = %self.broker, "Discarding closed broker connection");
        }
    }
}

/// A leased connection; returned to its pool on drop
pub struct PooledConnection {
    conn: Option<Box<dyn BrokerConnection>>,
    pool: Arc<ConnectionPool>,
    // Dropped after `Drop::drop` has put the connection back
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub async fn broadcast(
        &mut self,
        request: &ControlRequest,
    ) -> Result<Vec<ControlReply>, TransportError> {
        match self.conn.as_mut() {
            Some(conn) => conn.broadcast(request).await,
            None => Err(TransportError::ConnectFailed(
                "connection already released".to_string(),
            )),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Process-wide registry of pools keyed by broker identity
pub struct PoolRegistry {
    pools: DashMap<BrokerKey, Arc<ConnectionPool>>,
    connector: Arc<dyn Connector>,
    limit: usize,
}

impl PoolRegistry {
    pub fn new(connector: Arc<dyn Connector>, limit: usize) -> Self {
        Self {
            pools: DashMap::new(),
            connector,
            limit,
        }
    }

    /// The pool for `broker`, created on first use
    pub fn pool_for(&self, broker: &Broker) -> Arc<ConnectionPool> {
        self.pools
            .entry(broker.key())
            .or_insert_with(|| {
                Arc::new(ConnectionPool::new(
                    broker.clone(),
                    Arc::clone(&self.connector),
                    self.limit,
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ControlCommand, NewBroker};
    use crate::port::transport::mocks::{MockConnector, SimulatedFleet};
    use serde_json::Map;
    use std::time::Duration;

    fn broker(host: &str) -> Broker {
        NewBroker {
            hostname: host.to_string(),
            port: 5672,
            userid: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
        }
        .into_broker(1)
    }

    fn ping(node: &str) -> ControlRequest {
        ControlRequest::for_node(
            ControlCommand::Ping,
            Map::new(),
            node,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_connection_is_reused_after_release() {
        let fleet = SimulatedFleet::new();
        let connector = Arc::new(MockConnector::new(fleet));
        let pool = Arc::new(ConnectionPool::new(broker("mq"), connector.clone(), 2));

        {
            let mut conn = pool.acquire().await.unwrap();
            conn.broadcast(&ping("w")).await.unwrap();
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.idle_count(), 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_acquire_blocks_when_exhausted() {
        let fleet = SimulatedFleet::new();
        let connector = Arc::new(MockConnector::new(fleet));
        let pool = Arc::new(ConnectionPool::new(broker("mq"), connector, 1));

        let held = pool.acquire().await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err(), "second acquire must wait for a release");

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_returns_permit() {
        let fleet = SimulatedFleet::new();
        let connector = Arc::new(MockConnector::new(fleet));
        connector.set_fail_connect(true);
        let pool = Arc::new(ConnectionPool::new(broker("mq"), connector, 1));

        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_registry_keys_by_broker_identity() {
        let fleet = SimulatedFleet::new();
        let registry = PoolRegistry::new(Arc::new(MockConnector::new(fleet)), 4);

        let a = registry.pool_for(&broker("mq-a"));
        let mut same_endpoint = broker("mq-a");
        same_endpoint.id = 99;
        let a_again = registry.pool_for(&same_endpoint);
        let b = registry.pool_for(&broker("mq-b"));

        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
        assert_eq!(a.limit(), 4);
    }
}
