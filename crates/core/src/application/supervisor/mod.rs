// Node Supervisor - lifecycle, liveness and queue management of worker nodes
//
// Lifecycle actions (start/stop/restart) are serialized per node name.
// Control-channel queries are not: they may race a pending start, in which
// case the node simply does not reply yet.

mod argv;
mod layout;

pub use argv::build_argv;
pub use layout::NodeLayout;

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::control::ControlChannel;
use crate::application::locks::NodeLocks;
use crate::application::registry::BrokerRegistry;
use crate::domain::{is_truthy, Broker, ControlCommand, Node, Queue, QueueRef};
use crate::error::{AppError, Result};
use crate::port::{LaunchAction, LaunchOutcome, NodeRepository, ProcessLauncher, ProcessProbe, QueueRepository};

/// Outcome of reconciling stored queue assignments with a running node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSyncReport {
    pub added: Vec<String>,
    pub cancelled: Vec<String>,
    /// Queues whose add or cancel got no reply from the node
    pub unconfirmed: Vec<String>,
}

impl QueueSyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.cancelled.is_empty() && self.unconfirmed.is_empty()
    }
}

pub struct NodeSupervisor {
    nodes: Arc<dyn NodeRepository>,
    queues: Arc<dyn QueueRepository>,
    brokers: Arc<BrokerRegistry>,
    probe: Arc<dyn ProcessProbe>,
    launcher: Arc<dyn ProcessLauncher>,
    control: ControlChannel,
    layout: NodeLayout,
    locks: Arc<NodeLocks>,
}

impl NodeSupervisor {
    /// Create a supervisor using the process-wide node lock table
    pub fn new(
        nodes: Arc<dyn NodeRepository>,
        queues: Arc<dyn QueueRepository>,
        brokers: Arc<BrokerRegistry>,
        probe: Arc<dyn ProcessProbe>,
        launcher: Arc<dyn ProcessLauncher>,
        control: ControlChannel,
        layout: NodeLayout,
    ) -> Self {
        Self {
            nodes,
            queues,
            brokers,
            probe,
            launcher,
            control,
            layout,
            locks: NodeLocks::global(),
        }
    }

    /// Replace the lock table (isolated tables for tests)
    pub fn with_locks(mut self, locks: Arc<NodeLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the node's process
    ///
    /// No pre-check is made; starting a running node is up to the launcher.
    pub async fn start(&self, node: &Node) -> Result<LaunchOutcome> {
        self.action(node, LaunchAction::Start).await
    }

    /// Shut down the node's process
    pub async fn stop(&self, node: &Node) -> Result<LaunchOutcome> {
        self.action(node, LaunchAction::Stop).await
    }

    pub async fn restart(&self, node: &Node) -> Result<LaunchOutcome> {
        self.action(node, LaunchAction::Restart).await
    }

    async fn action(&self, node: &Node, action: LaunchAction) -> Result<LaunchOutcome> {
        let _guard = self.locks.acquire(&node.name).await;

        let broker = self.effective_broker(node).await?;
        let argv = build_argv(action, node, &broker, &self.layout);
        info!(node = %node.name, action = %action, "{}", argv.join(" "));

        let outcome = self.launcher.execute(&argv).await?;
        info!(
            node = %node.name,
            action = %action,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "Launcher completed"
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Liveness
    // ------------------------------------------------------------------

    /// True iff the process responds to signals and the node answers a ping
    pub async fn alive(&self, node: &Node) -> Result<bool> {
        if !self.responds_to_signal(node)? {
            return Ok(false);
        }
        self.responds_to_ping(node).await
    }

    /// True if the pidfile exists and its pid responds to signal 0
    pub fn responds_to_signal(&self, node: &Node) -> Result<bool> {
        Ok(self.probe.is_alive(&self.pidfile(node))?)
    }

    /// True if the node answers a broadcast ping with a truthy payload
    pub async fn responds_to_ping(&self, node: &Node) -> Result<bool> {
        let reply = self.query(node, ControlCommand::Ping, Map::new()).await?;
        Ok(reply.as_ref().map(is_truthy).unwrap_or(false))
    }

    /// Process id recorded in the node's pidfile
    pub fn pid(&self, node: &Node) -> Result<Option<i32>> {
        Ok(self.probe.read_pid(&self.pidfile(node))?)
    }

    pub fn pidfile(&self, node: &Node) -> PathBuf {
        self.layout.pidfile(&node.name)
    }

    pub fn logfile(&self, node: &Node) -> PathBuf {
        self.layout.logfile(&node.name)
    }

    // ------------------------------------------------------------------
    // Remote queries
    // ------------------------------------------------------------------

    /// Live statistics of the node (`None` if it did not reply)
    pub async fn stats(&self, node: &Node) -> Result<Option<Value>> {
        self.query(node, ControlCommand::Stats, Map::new()).await
    }

    /// Queues the node is consuming from right now, keyed by queue name
    ///
    /// Empty when the node does not reply.
    pub async fn consuming_from(&self, node: &Node) -> Result<BTreeMap<String, Value>> {
        let reply = self
            .query(node, ControlCommand::ActiveQueues, Map::new())
            .await?;
        Ok(reply.map(|r| index_active_queues(&node.name, r)).unwrap_or_default())
    }

    /// Make the running node consume from `queue`
    ///
    /// # Errors
    /// - AppError::NotFound if `queue` is a name with no stored record
    /// - AppError::Domain if its stored options are malformed
    pub async fn add_queue(&self, node: &Node, queue: impl Into<QueueRef>) -> Result<Option<Value>> {
        let queue = self.resolve_queue(queue.into()).await?;
        let arguments = queue.consumer_declaration()?.into_arguments();
        self.query(node, ControlCommand::AddConsumer, arguments).await
    }

    /// Make the running node stop consuming from `queue`
    pub async fn cancel_queue(
        &self,
        node: &Node,
        queue: impl Into<QueueRef>,
    ) -> Result<Option<Value>> {
        let queue = self.resolve_queue(queue.into()).await?;
        self.cancel_consumer(node, &queue.name).await
    }

    async fn cancel_consumer(&self, node: &Node, queue: &str) -> Result<Option<Value>> {
        let mut arguments = Map::new();
        arguments.insert("queue".to_string(), Value::String(queue.to_string()));
        self.query(node, ControlCommand::CancelConsumer, arguments).await
    }

    /// Store new autoscale bounds, then tell the node
    ///
    /// Only the provided bounds change; the node is sent the full stored
    /// pair. The stored update stands even when the node does not reply;
    /// both sides converge on the next start.
    pub async fn autoscale(
        &self,
        node: &mut Node,
        max: Option<u32>,
        min: Option<u32>,
    ) -> Result<Option<Value>> {
        node.set_autoscale(max, min);
        self.nodes.update(node).await?;

        let mut arguments = Map::new();
        arguments.insert("max".to_string(), json!(node.max_concurrency));
        arguments.insert("min".to_string(), json!(node.min_concurrency));

        let reply = self.query(node, ControlCommand::Autoscale, arguments).await?;
        if reply.is_none() {
            warn!(
                node = %node.name,
                max = node.max_concurrency,
                min = node.min_concurrency,
                "Autoscale stored but node did not reply"
            );
        }
        Ok(reply)
    }

    /// Bring the node's live consumers in line with its stored queues
    ///
    /// Stored queues missing from the node are added; live queues that are
    /// neither stored nor the direct queue are cancelled. A silent node is
    /// left untouched.
    pub async fn sync_queues(&self, node: &Node) -> Result<QueueSyncReport> {
        let Some(reply) = self
            .query(node, ControlCommand::ActiveQueues, Map::new())
            .await?
        else {
            return Ok(QueueSyncReport::default());
        };
        let live = index_active_queues(&node.name, reply);

        let direct = node.direct_queue();
        let desired: BTreeSet<&str> = node.queues.iter().map(String::as_str).collect();
        let mut report = QueueSyncReport::default();

        for queue in &node.queues {
            if !live.contains_key(queue) {
                match self.add_queue(node, queue.as_str()).await? {
                    Some(_) => report.added.push(queue.clone()),
                    None => report.unconfirmed.push(queue.clone()),
                }
            }
        }
        for queue in live.keys() {
            if *queue != direct && !desired.contains(queue.as_str()) {
                match self.cancel_consumer(node, queue).await? {
                    Some(_) => report.cancelled.push(queue.clone()),
                    None => report.unconfirmed.push(queue.clone()),
                }
            }
        }

        if !report.unconfirmed.is_empty() {
            warn!(
                node = %node.name,
                unconfirmed = ?report.unconfirmed,
                "Node did not confirm every queue change"
            );
        }
        info!(
            node = %node.name,
            added = ?report.added,
            cancelled = ?report.cancelled,
            "Queue sync completed"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Local state
    // ------------------------------------------------------------------

    pub async fn enable(&self, node: &mut Node) -> Result<()> {
        node.is_enabled = true;
        self.nodes.update(node).await
    }

    pub async fn disable(&self, node: &mut Node) -> Result<()> {
        node.is_enabled = false;
        self.nodes.update(node).await
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Send `command` to the node through its effective broker
    pub async fn query(
        &self,
        node: &Node,
        command: ControlCommand,
        arguments: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let broker = self.effective_broker(node).await?;
        Ok(self
            .control
            .query(&node.name, &broker, command, arguments)
            .await)
    }

    pub async fn effective_broker(&self, node: &Node) -> Result<Broker> {
        self.brokers.effective(node.broker_id).await
    }

    async fn resolve_queue(&self, queue: QueueRef) -> Result<Queue> {
        match queue {
            QueueRef::Record(queue) => Ok(queue),
            QueueRef::Name(name) => self
                .queues
                .find_by_name(&name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Queue {} not found", name))),
        }
    }
}

/// Key an `active_queues` reply by queue name
///
/// Entries without a string `name` are skipped; a later entry with the same
/// name replaces an earlier one.
fn index_active_queues(node: &str, reply: Value) -> BTreeMap<String, Value> {
    let entries = match reply {
        Value::Array(entries) => entries,
        Value::Null => return BTreeMap::new(),
        other => {
            warn!(node = %node, reply = %other, "Unexpected active_queues reply");
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.get("name").and_then(Value::as_str)?.to_string();
            Some((name, entry))
        })
        .collect()
}
