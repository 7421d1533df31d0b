//! SCS - command-line supervisor for broker-consuming worker nodes

mod app;
mod logging;
mod output;
mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tabled::Table;
use tracing::debug;

use app::App;
use output::{BrokerRow, NodeRow, QueueRow};
use scs_core::application::registry::parse_queue_list;
use scs_core::application::{NewNode, NodeFilter, QueueSpec};
use scs_core::domain::{BrokerId, NewBroker};

const DEFAULT_DB_PATH: &str = "~/.scs/scs.db";

#[derive(Parser)]
#[command(name = "scs")]
#[command(about = "Supervise broker-consuming worker nodes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "SCS_DB_PATH", default_value = DEFAULT_DB_PATH, global = true)]
    db: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage worker nodes
    #[command(subcommand)]
    Node(NodeCommand),

    /// Manage queue declarations
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Manage broker records
    #[command(subcommand)]
    Broker(BrokerCommand),
}

#[derive(Args)]
struct NodeArg {
    /// Node name
    name: String,
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Add a node record
    Add {
        /// Node name (generated if omitted)
        #[arg(long)]
        name: Option<String>,

        /// Comma-separated queue names
        #[arg(short, long, default_value = "")]
        queues: String,

        #[arg(long, default_value = "1")]
        max: u32,

        #[arg(long, default_value = "1")]
        min: u32,

        /// Broker id (default broker if omitted)
        #[arg(long)]
        broker: Option<BrokerId>,
    },

    /// Delete a node record
    Remove(NodeArg),

    /// List node records
    List {
        /// Only enabled nodes
        #[arg(long)]
        enabled: bool,
    },

    Enable(NodeArg),

    Disable(NodeArg),

    /// Start the node's process
    Start(NodeArg),

    /// Shut down the node's process
    Stop(NodeArg),

    Restart(NodeArg),

    /// Check the pidfile and ping the node
    Alive(NodeArg),

    /// Print live statistics
    Stats(NodeArg),

    /// Print the queues the node is consuming from
    Queues(NodeArg),

    /// Make the running node consume from a queue
    AddQueue {
        name: String,
        queue: String,
    },

    /// Make the running node stop consuming from a queue
    CancelQueue {
        name: String,
        queue: String,
    },

    /// Reconcile live consumers with the stored queue list
    SyncQueues(NodeArg),

    /// Store and apply autoscale bounds
    Autoscale {
        name: String,

        #[arg(long)]
        max: Option<u32>,

        #[arg(long)]
        min: Option<u32>,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Declare a queue (existing declarations are kept)
    Add {
        name: String,

        #[arg(long)]
        exchange: Option<String>,

        #[arg(long)]
        exchange_type: Option<String>,

        #[arg(long)]
        routing_key: Option<String>,

        /// Extra consumer options as a JSON object
        #[arg(long)]
        options: Option<String>,
    },

    /// List queue declarations
    List {
        #[arg(long)]
        enabled: bool,
    },

    Enable {
        name: String,
    },

    Disable {
        name: String,
    },

    /// Assign a queue to stored nodes
    Assign {
        queue: String,

        /// Comma-separated node names (all enabled nodes if omitted)
        #[arg(long)]
        nodes: Option<String>,
    },

    /// Unassign a queue from stored nodes
    Unassign {
        queue: String,

        #[arg(long)]
        nodes: Option<String>,
    },
}

#[derive(Subcommand)]
enum BrokerCommand {
    /// Add a broker (existing records with the same address are reused)
    Add {
        #[arg(long, default_value = "localhost")]
        hostname: String,

        #[arg(long, default_value = "5672")]
        port: u16,

        #[arg(long, default_value = "guest")]
        userid: String,

        #[arg(long, default_value = "guest", env = "SCS_BROKER_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, default_value = "/")]
        vhost: String,

        /// Also make it the default broker
        #[arg(long)]
        default: bool,
    },

    List,

    SetDefault {
        id: BrokerId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(cli.log_file.as_deref())?;

    let config = settings::load(cli.config.as_deref())?;
    debug!(
        workdir = %config.workdir.display(),
        pool_limit = config.pool_limit,
        "Configuration loaded"
    );

    let db_path = shellexpand::tilde(&cli.db).into_owned();
    let app = App::open(&db_path, &config).await?;

    match cli.command {
        Commands::Node(cmd) => run_node(&app, cmd).await,
        Commands::Queue(cmd) => run_queue(&app, cmd).await,
        Commands::Broker(cmd) => run_broker(&app, cmd).await,
    }
}

async fn run_node(app: &App, cmd: NodeCommand) -> Result<()> {
    match cmd {
        NodeCommand::Add {
            name,
            queues,
            max,
            min,
            broker,
        } => {
            let node = app
                .nodes
                .add(NewNode {
                    name,
                    queues: parse_queue_list(&queues),
                    max_concurrency: max,
                    min_concurrency: min,
                    broker_id: broker,
                })
                .await?;
            println!("{}", format!("✓ Node {} added", node.name).green().bold());
        }

        NodeCommand::Remove(NodeArg { name }) => {
            app.nodes.remove(&name).await?;
            println!("{}", format!("✓ Node {} removed", name).green().bold());
        }

        NodeCommand::List { enabled } => {
            let nodes = if enabled {
                app.nodes.enabled().await?
            } else {
                app.nodes.all().await?
            };
            let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
            println!("{}", Table::new(rows));
        }

        NodeCommand::Enable(NodeArg { name }) => {
            app.nodes.enable(&name).await?;
            println!("{}", format!("✓ Node {} enabled", name).green().bold());
        }

        NodeCommand::Disable(NodeArg { name }) => {
            app.nodes.disable(&name).await?;
            println!("{}", format!("✓ Node {} disabled", name).yellow().bold());
        }

        NodeCommand::Start(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            let outcome = app.supervisor.start(&node).await?;
            print!("{}", outcome.stdout);
        }

        NodeCommand::Stop(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            let outcome = app.supervisor.stop(&node).await?;
            print!("{}", outcome.stdout);
        }

        NodeCommand::Restart(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            let outcome = app.supervisor.restart(&node).await?;
            print!("{}", outcome.stdout);
        }

        NodeCommand::Alive(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            if app.supervisor.alive(&node).await? {
                println!("{}: {}", name, "alive".green().bold());
            } else {
                println!("{}: {}", name, "not responding".red().bold());
            }
        }

        NodeCommand::Stats(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            print_reply(&name, app.supervisor.stats(&node).await?)?;
        }

        NodeCommand::Queues(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            let queues = app.supervisor.consuming_from(&node).await?;
            if queues.is_empty() {
                println!("{}", format!("{}: no queues (or no reply)", name).yellow());
            }
            for queue in queues.keys() {
                println!("{}", queue);
            }
        }

        NodeCommand::AddQueue { name, queue } => {
            let node = app.nodes.get(&name).await?;
            print_reply(&name, app.supervisor.add_queue(&node, queue).await?)?;
        }

        NodeCommand::CancelQueue { name, queue } => {
            let node = app.nodes.get(&name).await?;
            print_reply(&name, app.supervisor.cancel_queue(&node, queue).await?)?;
        }

        NodeCommand::SyncQueues(NodeArg { name }) => {
            let node = app.nodes.get(&name).await?;
            let report = app.supervisor.sync_queues(&node).await?;
            if report.is_empty() {
                println!("{}", format!("{}: nothing to do", name).cyan());
            }
            for queue in &report.added {
                println!("{} {}", "+".green().bold(), queue);
            }
            for queue in &report.cancelled {
                println!("{} {}", "-".red().bold(), queue);
            }
            for queue in &report.unconfirmed {
                println!("{} {} (no reply)", "?".yellow().bold(), queue);
            }
        }

        NodeCommand::Autoscale { name, max, min } => {
            if max.is_none() && min.is_none() {
                anyhow::bail!("Give --max and/or --min");
            }
            let mut node = app.nodes.get(&name).await?;
            let reply = app.supervisor.autoscale(&mut node, max, min).await?;
            println!(
                "{}",
                format!(
                    "✓ Node {} autoscale stored as {},{}",
                    name, node.max_concurrency, node.min_concurrency
                )
                .green()
                .bold()
            );
            print_reply(&name, reply)?;
        }
    }
    Ok(())
}

async fn run_queue(app: &App, cmd: QueueCommand) -> Result<()> {
    match cmd {
        QueueCommand::Add {
            name,
            exchange,
            exchange_type,
            routing_key,
            options,
        } => {
            let options = match options {
                Some(raw) => parse_options(&raw)?,
                None => Map::new(),
            };
            let queue = app
                .queues
                .add(QueueSpec {
                    name,
                    exchange,
                    exchange_type,
                    routing_key,
                    options,
                })
                .await?;
            println!("{}", format!("✓ Queue {} declared", queue.name).green().bold());
        }

        QueueCommand::List { enabled } => {
            let queues = if enabled {
                app.queues.enabled().await?
            } else {
                app.queues.all().await?
            };
            let rows: Vec<QueueRow> = queues.iter().map(QueueRow::from).collect();
            println!("{}", Table::new(rows));
        }

        QueueCommand::Enable { name } => {
            app.queues.enable(&name).await?;
            println!("{}", format!("✓ Queue {} enabled", name).green().bold());
        }

        QueueCommand::Disable { name } => {
            app.queues.disable(&name).await?;
            println!("{}", format!("✓ Queue {} disabled", name).yellow().bold());
        }

        QueueCommand::Assign { queue, nodes } => {
            let changed = app
                .nodes
                .add_queue_to_nodes(&queue, &node_filter(nodes))
                .await?;
            println!("{}", format!("✓ {} assigned to {} node(s)", queue, changed.len()).green().bold());
        }

        QueueCommand::Unassign { queue, nodes } => {
            let changed = app
                .nodes
                .remove_queue_from_nodes(&queue, &node_filter(nodes))
                .await?;
            println!("{}", format!("✓ {} unassigned from {} node(s)", queue, changed.len()).green().bold());
        }
    }
    Ok(())
}

async fn run_broker(app: &App, cmd: BrokerCommand) -> Result<()> {
    match cmd {
        BrokerCommand::Add {
            hostname,
            port,
            userid,
            password,
            vhost,
            default,
        } => {
            let mut broker = app
                .brokers
                .add(NewBroker {
                    hostname,
                    port,
                    userid,
                    password,
                    virtual_host: vhost,
                })
                .await?;
            if default {
                broker = app.brokers.set_default(broker.id).await?;
            }
            println!("{}", format!("✓ Broker {} ({})", broker.id, broker).green().bold());
        }

        BrokerCommand::List => {
            let rows: Vec<BrokerRow> = app.brokers.all().await?.iter().map(BrokerRow::from).collect();
            println!("{}", Table::new(rows));
        }

        BrokerCommand::SetDefault { id } => {
            let broker = app.brokers.set_default(id).await?;
            println!("{}", format!("✓ Default broker is now {}", broker).green().bold());
        }
    }
    Ok(())
}

fn node_filter(nodes: Option<String>) -> NodeFilter {
    match nodes {
        Some(raw) => NodeFilter::Names(parse_queue_list(&raw)),
        None => NodeFilter::Enabled,
    }
}

fn parse_options(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("Invalid JSON options")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Options must be a JSON object, got {}", other),
    }
}

fn print_reply(node: &str, reply: Option<Value>) -> Result<()> {
    match reply {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("{}", format!("{}: no reply", node).yellow()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_autoscale() {
        let cli = Cli::try_parse_from(["scs", "node", "autoscale", "w1", "--max", "10"]).unwrap();
        match cli.command {
            Commands::Node(NodeCommand::Autoscale { name, max, min }) => {
                assert_eq!(name, "w1");
                assert_eq!(max, Some(10));
                assert_eq!(min, None);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_options() {
        assert_eq!(parse_options(r#"{"x_priority": 3}"#).unwrap().len(), 1);
        assert!(parse_options("[1]").is_err());
        assert!(parse_options("nope").is_err());
    }
}
