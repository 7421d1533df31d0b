// Control Messages - remote commands broadcast to nodes and their replies

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Remote control commands understood by worker nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Ping,
    Stats,
    ActiveQueues,
    AddConsumer,
    CancelConsumer,
    Autoscale,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Ping => "ping",
            ControlCommand::Stats => "stats",
            ControlCommand::ActiveQueues => "active_queues",
            ControlCommand::AddConsumer => "add_consumer",
            ControlCommand::CancelConsumer => "cancel_consumer",
            ControlCommand::Autoscale => "autoscale",
        }
    }

    /// Read-only inspection commands (as opposed to state-changing control)
    pub fn is_inspect(&self) -> bool {
        matches!(
            self,
            ControlCommand::Ping | ControlCommand::Stats | ControlCommand::ActiveQueues
        )
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A broadcast request
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub arguments: Map<String, Value>,
    pub destination: Vec<String>,
    pub reply: bool,
    /// How long the transport waits for replies
    pub timeout: Duration,
}

impl ControlRequest {
    /// Request addressed to exactly one node, asking for replies
    pub fn for_node(
        command: ControlCommand,
        arguments: Map<String, Value>,
        node: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            command,
            arguments,
            destination: vec![node.to_string()],
            reply: true,
            timeout,
        }
    }

    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// One reply record: responding node name and its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub node: String,
    pub payload: Value,
}

impl ControlReply {
    pub fn new(node: impl Into<String>, payload: Value) -> Self {
        Self {
            node: node.into(),
            payload,
        }
    }
}

/// Payload of the first reply sent by `node`
///
/// Duplicate records for the same node are possible with a misbehaving
/// transport; the earliest one wins.
pub fn find_reply<'a>(replies: &'a [ControlReply], node: &str) -> Option<&'a Value> {
    replies.iter().find(|r| r.node == node).map(|r| &r.payload)
}

/// Truthiness of a reply payload (null, false, 0, "" and empty collections are false)
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_reply_first_match_wins() {
        let replies = vec![
            ControlReply::new("other", json!({"ok": "pong"})),
            ControlReply::new("worker1", json!("first")),
            ControlReply::new("worker1", json!("second")),
        ];

        assert_eq!(find_reply(&replies, "worker1"), Some(&json!("first")));
        assert_eq!(find_reply(&replies, "missing"), None);
        assert_eq!(find_reply(&[], "worker1"), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!({"ok": "pong"})));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("pong")));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));
    }

    #[test]
    fn test_request_for_node() {
        let req = ControlRequest::for_node(
            ControlCommand::CancelConsumer,
            serde_json::from_value(json!({"queue": "images"})).unwrap(),
            "worker1",
            Duration::from_secs(1),
        );
        assert_eq!(req.destination, vec!["worker1"]);
        assert!(req.reply);
        assert_eq!(req.argument_str("queue"), Some("images"));
        assert!(!req.command.is_inspect());
        assert_eq!(req.command.to_string(), "cancel_consumer");
    }
}
