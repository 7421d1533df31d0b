// Control Channel - one command to one node, one reply back

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::application::pool::PoolRegistry;
use crate::domain::{find_reply, Broker, ControlCommand, ControlRequest};

/// Sends a remote command to exactly one node and waits for its reply
///
/// Every call leases its own connection from the broker's pool; there is no
/// lock across queries.
pub struct ControlChannel {
    pools: Arc<PoolRegistry>,
    timeout: Duration,
}

impl ControlChannel {
    /// `timeout` is handed to the transport with every broadcast
    pub fn new(pools: Arc<PoolRegistry>, timeout: Duration) -> Self {
        Self { pools, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Broadcast `command` to `node` through `broker` and return its payload
    ///
    /// # Returns
    /// `None` when the node did not answer, including when the broker could
    /// not be reached or the broadcast failed. Callers decide what silence
    /// means.
    pub async fn query(
        &self,
        node: &str,
        broker: &Broker,
        command: ControlCommand,
        arguments: Map<String, Value>,
    ) -> Option<Value> {
        let request = ControlRequest::for_node(command, arguments, node, self.timeout);
        let pool = self.pools.pool_for(broker);

        let replies = {
            let mut conn = match pool.acquire().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(node = %node, command = %command, broker = %broker, error = %e,
                        "Broker unavailable for control command");
                    return None;
                }
            };
            let outcome = conn.broadcast(&request).await;
            match outcome {
                Ok(replies) => replies,
                Err(e) => {
                    warn!(node = %node, command = %command, error = %e, "Broadcast failed");
                    return None;
                }
            }
            // connection goes back to the pool here, on every path
        };

        let payload = find_reply(&replies, node).cloned();
        if payload.is_none() {
            debug!(
                node = %node,
                command = %command,
                replies = replies.len(),
                "No reply from node"
            );
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ControlReply, NewBroker};
    use crate::port::transport::mocks::{MockConnector, SimulatedFleet};
    use serde_json::json;

    fn broker() -> Broker {
        NewBroker {
            hostname: "mq".to_string(),
            port: 5672,
            userid: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
        }
        .into_broker(1)
    }

    fn channel(fleet: Arc<SimulatedFleet>) -> (ControlChannel, Arc<MockConnector>, Arc<PoolRegistry>) {
        let connector = Arc::new(MockConnector::new(fleet));
        let pools = Arc::new(PoolRegistry::new(connector.clone(), 2));
        (
            ControlChannel::new(pools.clone(), Duration::from_millis(250)),
            connector,
            pools,
        )
    }

    #[tokio::test]
    async fn test_query_returns_destination_reply() {
        let fleet = SimulatedFleet::new();
        fleet.join("worker1");
        let (channel, _, _) = channel(fleet.clone());

        let reply = channel
            .query("worker1", &broker(), ControlCommand::Ping, Map::new())
            .await;

        assert_eq!(reply, Some(json!({"ok": "pong"})));
        let requests = fleet.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].destination, vec!["worker1"]);
        assert!(requests[0].reply);
        assert_eq!(requests[0].timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_silent_node_is_no_reply() {
        let fleet = SimulatedFleet::new();
        fleet.push_extra_reply(ControlReply::new("someone-else", json!({"ok": "pong"})));
        let (channel, _, _) = channel(fleet);

        let reply = channel
            .query("worker1", &broker(), ControlCommand::Ping, Map::new())
            .await;
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_duplicate_replies_first_wins() {
        let fleet = SimulatedFleet::new();
        fleet.join("worker1");
        fleet.push_extra_reply(ControlReply::new("worker1", json!("late duplicate")));
        let (channel, _, _) = channel(fleet);

        let reply = channel
            .query("worker1", &broker(), ControlCommand::Ping, Map::new())
            .await;
        assert_eq!(reply, Some(json!({"ok": "pong"})));
    }

    #[tokio::test]
    async fn test_transport_failures_are_no_reply_and_release() {
        let fleet = SimulatedFleet::new();
        fleet.join("worker1");
        let (channel, connector, pools) = channel(fleet.clone());

        fleet.set_fail_broadcast(true);
        let reply = channel
            .query("worker1", &broker(), ControlCommand::Stats, Map::new())
            .await;
        assert_eq!(reply, None);
        assert_eq!(pools.pool_for(&broker()).available(), 2);

        fleet.set_fail_broadcast(false);
        connector.set_fail_connect(true);
        let reply = channel
            .query("worker1", &broker(), ControlCommand::Stats, Map::new())
            .await;
        assert_eq!(reply, None);
        assert_eq!(pools.pool_for(&broker()).available(), 2);
    }
}
