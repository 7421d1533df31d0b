// Composition root: SQLite repositories, system adapters, registries, supervisor

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use scs_core::application::{
    BrokerRegistry, ControlChannel, NodeLayout, NodeRegistry, NodeSupervisor, PoolRegistry,
    QueueRegistry,
};
use scs_core::config::SupervisorConfig;
use scs_core::port::id_provider::UuidProvider;
use scs_core::port::time_provider::SystemTimeProvider;
use scs_infra_sqlite::{
    create_pool, run_migrations, SqliteBrokerRepository, SqliteNodeRepository,
    SqliteQueueRepository,
};
use scs_infra_system::{CeleryConnector, MultiLauncher, PidfileProbe};

pub struct App {
    pub brokers: Arc<BrokerRegistry>,
    pub queues: QueueRegistry,
    pub nodes: NodeRegistry,
    pub supervisor: NodeSupervisor,
}

impl App {
    pub async fn open(db_path: &str, config: &SupervisorConfig) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Cannot create {}", parent.display()))?;
            }
        }

        info!(db_path = %db_path, "Opening database");
        let pool = create_pool(db_path)
            .await
            .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
        run_migrations(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

        let time_provider = Arc::new(SystemTimeProvider);
        let broker_repo = Arc::new(SqliteBrokerRepository::new(pool.clone()));
        let queue_repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
        let node_repo = Arc::new(SqliteNodeRepository::new(pool));

        let brokers = Arc::new(BrokerRegistry::new(
            broker_repo.clone(),
            config.default_broker.clone(),
        ));
        let queues = QueueRegistry::new(queue_repo.clone(), time_provider.clone());
        let nodes = NodeRegistry::new(
            node_repo.clone(),
            queue_repo.clone(),
            broker_repo,
            Arc::new(UuidProvider),
            time_provider.clone(),
        );

        let connector = Arc::new(CeleryConnector::new(
            config.control_program.clone(),
            config.control_prefix_args.clone(),
        ));
        let control = ControlChannel::new(
            Arc::new(PoolRegistry::new(connector, config.pool_limit)),
            config.broadcast_timeout(),
        );
        let launcher = Arc::new(MultiLauncher::new(
            config.launcher_program.clone(),
            config.launcher_prefix_args.clone(),
            time_provider,
        ));

        let supervisor = NodeSupervisor::new(
            node_repo,
            queue_repo,
            brokers.clone(),
            Arc::new(PidfileProbe::new()),
            launcher,
            control,
            NodeLayout::from_config(config),
        );

        Ok(Self {
            brokers,
            queues,
            nodes,
            supervisor,
        })
    }
}
