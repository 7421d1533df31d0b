// Broker control transport over the worker framework's command-line tool
//
// A "connection" is a leased broker session: each broadcast runs
// `<program> [prefix args] -b <url> inspect|control <command> [args] -d <node>
// --json --timeout <secs>` and parses the JSON replies.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use scs_core::domain::{Broker, ControlCommand, ControlReply, ControlRequest};
use scs_core::port::{BrokerConnection, Connector, TransportError};

/// Extra time the subprocess gets beyond the broadcast timeout
const PROCESS_GRACE: Duration = Duration::from_secs(5);

/// Opens [`CeleryConnection`]s for a broker
#[derive(Debug, Clone)]
pub struct CeleryConnector {
    program: String,
    prefix_args: Vec<String>,
}

impl CeleryConnector {
    pub fn new(program: impl Into<String>, prefix_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix_args,
        }
    }
}

#[async_trait]
impl Connector for CeleryConnector {
    async fn connect(&self, broker: &Broker) -> Result<Box<dyn BrokerConnection>, TransportError> {
        debug!(broker = %broker, program = %self.program, "Opening control session");
        Ok(Box::new(CeleryConnection {
            program: self.program.clone(),
            prefix_args: self.prefix_args.clone(),
            url: broker.url(),
            open: true,
        }))
    }
}

pub struct CeleryConnection {
    program: String,
    prefix_args: Vec<String>,
    url: String,
    open: bool,
}

impl CeleryConnection {
    async fn run(&self, argv: &[String], limit: Duration) -> Result<std::process::Output, TransportError> {
        let child = Command::new(&self.program)
            .args(&self.prefix_args)
            .args(argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", self.program, e)))?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(TransportError::CommandFailed(e.to_string())),
            Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl BrokerConnection for CeleryConnection {
    async fn broadcast(
        &mut self,
        request: &ControlRequest,
    ) -> Result<Vec<ControlReply>, TransportError> {
        let argv = control_argv(&self.url, request)?;
        let result = self.run(&argv, request.timeout + PROCESS_GRACE).await;
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                // The program could not be run: stop reusing this session
                if matches!(e, TransportError::ConnectFailed(_)) {
                    self.open = false;
                }
                return Err(e);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            // Nobody replied within the timeout (the tool exits non-zero)
            debug!(
                command = %request.command,
                destination = ?request.destination,
                exit_code = ?output.status.code(),
                "No replies"
            );
            return Ok(Vec::new());
        }
        if !output.status.success() {
            warn!(
                command = %request.command,
                exit_code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Control tool exited with failure"
            );
        }

        parse_replies(&stdout)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Names of arguments passed positionally, in order
fn positional_arguments(command: ControlCommand) -> &'static [&'static str] {
    match command {
        ControlCommand::AddConsumer => &["queue", "exchange", "exchange_type", "routing_key"],
        ControlCommand::CancelConsumer => &["queue"],
        ControlCommand::Autoscale => &["max", "min"],
        ControlCommand::Ping | ControlCommand::Stats | ControlCommand::ActiveQueues => &[],
    }
}

/// Value the tool assumes for a slot left unset
fn slot_default(command: ControlCommand, name: &str) -> Option<&'static str> {
    match (command, name) {
        (ControlCommand::AddConsumer, "exchange_type") => Some(DEFAULT_EXCHANGE_TYPE),
        _ => None,
    }
}

/// Exchange type the worker framework declares when none is given
const DEFAULT_EXCHANGE_TYPE: &str = "direct";

fn render_argument(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Build the tool's argument vector for `request`
///
/// Positional slots never shift: an unset slot followed by a set one takes
/// the tool's default, or fails the request when the tool has none. Only
/// trailing unset slots are left off. Arguments without a positional slot
/// (extra consumer options) cannot be expressed and are dropped.
pub fn control_argv(url: &str, request: &ControlRequest) -> Result<Vec<String>, TransportError> {
    let mode = if request.command.is_inspect() {
        "inspect"
    } else {
        "control"
    };
    let mut argv = vec![
        "-b".to_string(),
        url.to_string(),
        mode.to_string(),
        request.command.as_str().to_string(),
    ];

    let positional = positional_arguments(request.command);
    let values: Vec<Option<String>> = positional
        .iter()
        .map(|name| request.arguments.get(*name).and_then(render_argument))
        .collect();
    let used = values.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
    for (name, value) in positional.iter().zip(values).take(used) {
        let value = match value {
            Some(value) => value,
            None => slot_default(request.command, name)
                .map(str::to_string)
                .ok_or_else(|| {
                    TransportError::CommandFailed(format!(
                        "{}: argument {} is required when later arguments are given",
                        request.command, name
                    ))
                })?,
        };
        argv.push(value);
    }

    let dropped: Vec<&String> = request
        .arguments
        .keys()
        .filter(|k| !positional.contains(&k.as_str()))
        .collect();
    if !dropped.is_empty() {
        warn!(
            command = %request.command,
            dropped = ?dropped,
            "Arguments without a positional slot are not applied"
        );
    }

    if !request.destination.is_empty() {
        argv.push("-d".to_string());
        argv.push(request.destination.join(","));
    }
    argv.push("--json".to_string());
    argv.push("--timeout".to_string());
    argv.push(request.timeout.as_secs_f64().to_string());
    Ok(argv)
}

/// Parse `{node: payload}` or `[{node: payload}, ...]` into reply records
pub fn parse_replies(output: &str) -> Result<Vec<ControlReply>, TransportError> {
    let value: Value = serde_json::from_str(output.trim())
        .map_err(|e| TransportError::InvalidReply(e.to_string()))?;

    let objects = match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(TransportError::InvalidReply(format!(
                    "expected reply object, got {}",
                    other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(TransportError::InvalidReply(format!(
                "expected object or array, got {}",
                other
            )))
        }
    };

    Ok(objects
        .into_iter()
        .flat_map(|map| map.into_iter().map(|(node, payload)| ControlReply::new(node, payload)))
        .collect())
}
