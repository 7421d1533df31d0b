// Broker Transport Port
// Connections to a broker and the broadcast-with-replies primitive

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Broker, ControlReply, ControlRequest};

/// Transport errors
///
/// These never leave the control channel: an unreachable broker and a
/// silent node both surface as "no reply".
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Broadcast failed: {0}")]
    CommandFailed(String),

    #[error("Broadcast timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid reply: {0}")]
    InvalidReply(String),
}

/// An open broker connection
#[async_trait]
pub trait BrokerConnection: Send {
    /// Broadcast `request` and collect replies until the request timeout
    ///
    /// Replies are returned in arrival order; the list may contain records
    /// from nodes other than the destination.
    async fn broadcast(
        &mut self,
        request: &ControlRequest,
    ) -> Result<Vec<ControlReply>, TransportError>;

    /// Broken connections are discarded instead of returning to the pool
    fn is_open(&self) -> bool {
        true
    }
}

/// Opens connections to a broker
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, broker: &Broker) -> Result<Box<dyn BrokerConnection>, TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ControlCommand;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    struct SimulatedNode {
        active_queues: BTreeMap<String, Value>,
        autoscale: Option<(Value, Value)>,
    }

    /// Cooperating remote nodes answering control commands in memory
    #[derive(Default)]
    pub struct SimulatedFleet {
        nodes: Mutex<HashMap<String, SimulatedNode>>,
        extra_replies: Mutex<Vec<ControlReply>>,
        muted: Mutex<HashSet<(String, ControlCommand)>>,
        requests: Mutex<Vec<ControlRequest>>,
        fail_broadcast: AtomicBool,
        latency: Mutex<Duration>,
    }

    impl SimulatedFleet {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Bring a node online (it answers from now on)
        pub fn join(&self, node: &str) {
            self.nodes
                .lock()
                .unwrap()
                .entry(node.to_string())
                .or_default();
        }

        /// Take a node offline (it stays silent)
        pub fn leave(&self, node: &str) {
            self.nodes.lock().unwrap().remove(node);
        }

        /// Keep a node online but silent for one command
        pub fn mute(&self, node: &str, command: ControlCommand) {
            self.muted
                .lock()
                .unwrap()
                .insert((node.to_string(), command));
        }

        /// Reply appended to every broadcast result (e.g. duplicates)
        pub fn push_extra_reply(&self, reply: ControlReply) {
            self.extra_replies.lock().unwrap().push(reply);
        }

        pub fn set_fail_broadcast(&self, fail: bool) {
            self.fail_broadcast.store(fail, Ordering::SeqCst);
        }

        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock().unwrap() = latency;
        }

        pub fn requests(&self) -> Vec<ControlRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn active_queue_names(&self, node: &str) -> Vec<String> {
            self.nodes
                .lock()
                .unwrap()
                .get(node)
                .map(|n| n.active_queues.keys().cloned().collect())
                .unwrap_or_default()
        }

        /// Make a node consume from a queue without going through a command
        pub fn consume(&self, node: &str, queue: &str) {
            if let Some(n) = self.nodes.lock().unwrap().get_mut(node) {
                n.active_queues
                    .insert(queue.to_string(), active_queue(queue, queue, queue));
            }
        }

        pub fn autoscale_of(&self, node: &str) -> Option<(Value, Value)> {
            self.nodes
                .lock()
                .unwrap()
                .get(node)
                .and_then(|n| n.autoscale.clone())
        }

        fn answer(&self, request: &ControlRequest) -> Vec<ControlReply> {
            let mut nodes = self.nodes.lock().unwrap();
            let muted = self.muted.lock().unwrap();
            let mut replies = Vec::new();

            for name in &request.destination {
                let Some(node) = nodes.get_mut(name) else {
                    continue;
                };
                if muted.contains(&(name.clone(), request.command)) {
                    continue;
                }
                let queue = request.argument_str("queue").unwrap_or_default().to_string();
                let payload = match request.command {
                    ControlCommand::Ping => json!({"ok": "pong"}),
                    ControlCommand::Stats => json!({
                        "pid": 4242,
                        "pool": {"max-concurrency": 1},
                        "total": {},
                    }),
                    ControlCommand::ActiveQueues => {
                        Value::Array(node.active_queues.values().cloned().collect())
                    }
                    ControlCommand::AddConsumer => {
                        let exchange = request.argument_str("exchange").unwrap_or(queue.as_str());
                        let routing_key = request.argument_str("routing_key").unwrap_or(queue.as_str());
                        let entry = active_queue(&queue, exchange, routing_key);
                        node.active_queues.insert(queue.clone(), entry);
                        json!({"ok": format!("add consumer {}", queue)})
                    }
                    ControlCommand::CancelConsumer => {
                        node.active_queues.remove(&queue);
                        json!({"ok": format!("no longer consuming from {}", queue)})
                    }
                    ControlCommand::Autoscale => {
                        let max = request.arguments.get("max").cloned().unwrap_or(Value::Null);
                        let min = request.arguments.get("min").cloned().unwrap_or(Value::Null);
                        node.autoscale = Some((max.clone(), min.clone()));
                        json!({"ok": format!("autoscale now max={} min={}", max, min)})
                    }
                };
                replies.push(ControlReply::new(name.clone(), payload));
            }

            replies.extend(self.extra_replies.lock().unwrap().iter().cloned());
            replies
        }
    }

    fn active_queue(name: &str, exchange: &str, routing_key: &str) -> Value {
        json!({
            "name": name,
            "exchange": {"name": exchange, "type": "direct"},
            "routing_key": routing_key,
            "durable": true,
        })
    }

    /// Connector to a simulated fleet, counting connects and open connections
    pub struct MockConnector {
        fleet: Arc<SimulatedFleet>,
        connects: Arc<AtomicUsize>,
        open: Arc<AtomicUsize>,
        max_open: Arc<AtomicUsize>,
        fail_connect: AtomicBool,
    }

    impl MockConnector {
        pub fn new(fleet: Arc<SimulatedFleet>) -> Self {
            Self {
                fleet,
                connects: Arc::new(AtomicUsize::new(0)),
                open: Arc::new(AtomicUsize::new(0)),
                max_open: Arc::new(AtomicUsize::new(0)),
                fail_connect: AtomicBool::new(false),
            }
        }

        /// Simulate an unreachable broker
        pub fn set_fail_connect(&self, fail: bool) {
            self.fail_connect.store(fail, Ordering::SeqCst);
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        /// Highest number of connections broadcasting at the same time
        pub fn max_concurrent_broadcasts(&self) -> usize {
            self.max_open.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            broker: &Broker,
        ) -> Result<Box<dyn BrokerConnection>, TransportError> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectFailed(format!(
                    "connection refused: {}",
                    broker
                )));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockConnection {
                fleet: Arc::clone(&self.fleet),
                busy: Arc::clone(&self.open),
                max_busy: Arc::clone(&self.max_open),
            }))
        }
    }

    struct MockConnection {
        fleet: Arc<SimulatedFleet>,
        busy: Arc<AtomicUsize>,
        max_busy: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrokerConnection for MockConnection {
        async fn broadcast(
            &mut self,
            request: &ControlRequest,
        ) -> Result<Vec<ControlReply>, TransportError> {
            let busy = self.busy.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_busy.fetch_max(busy, Ordering::SeqCst);

            self.fleet.requests.lock().unwrap().push(request.clone());
            let latency = *self.fleet.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.busy.fetch_sub(1, Ordering::SeqCst);

            if self.fleet.fail_broadcast.load(Ordering::SeqCst) {
                return Err(TransportError::CommandFailed("channel closed".to_string()));
            }
            Ok(self.fleet.answer(request))
        }
    }
}
