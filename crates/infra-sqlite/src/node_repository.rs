// SQLite NodeRepository Implementation
// Queue assignments live in node_queues, ordered by position

use crate::error::{map_sqlx_error, narrow};
use async_trait::async_trait;
use scs_core::domain::Node;
use scs_core::error::{AppError, Result};
use scs_core::port::NodeRepository;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use tracing::debug;

pub struct SqliteNodeRepository {
    pool: SqlitePool,
}

impl SqliteNodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_queues(&self, name: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT queue_name FROM node_queues WHERE node_name = ? ORDER BY position",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    /// Attach assignments to a batch of rows with a single query
    async fn hydrate(&self, rows: Vec<NodeRow>) -> Result<Vec<Node>> {
        let assignments = sqlx::query_as::<_, (String, String)>(
            "SELECT node_name, queue_name FROM node_queues ORDER BY node_name, position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut by_node: HashMap<String, Vec<String>> = HashMap::new();
        for (node, queue) in assignments {
            by_node.entry(node).or_default().push(queue);
        }

        rows.into_iter()
            .map(|row| {
                let queues = by_node.remove(&row.name).unwrap_or_default();
                row.into_node(queues)
            })
            .collect()
    }
}

async fn replace_queues(tx: &mut Transaction<'_, Sqlite>, node: &Node) -> Result<()> {
    sqlx::query("DELETE FROM node_queues WHERE node_name = ?")
        .bind(&node.name)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    for (position, queue) in node.queues.iter().enumerate() {
        sqlx::query("INSERT INTO node_queues (node_name, queue_name, position) VALUES (?, ?, ?)")
            .bind(&node.name)
            .bind(queue)
            .bind(position as i64)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

#[async_trait]
impl NodeRepository for SqliteNodeRepository {
    async fn insert(&self, node: &Node) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO nodes (
                name, max_concurrency, min_concurrency, is_enabled, created_at, broker_id
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.name)
        .bind(i64::from(node.max_concurrency))
        .bind(i64::from(node.min_concurrency))
        .bind(node.is_enabled)
        .bind(node.created_at)
        .bind(node.broker_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        replace_queues(&mut tx, node).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(node = %node.name, queues = node.queues.len(), "Node inserted");
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => {
                let queues = self.load_queues(name).await?;
                row.into_node(queues).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn update(&self, node: &Node) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET max_concurrency = ?, min_concurrency = ?, is_enabled = ?, broker_id = ?
            WHERE name = ?
            "#,
        )
        .bind(i64::from(node.max_concurrency))
        .bind(i64::from(node.min_concurrency))
        .bind(node.is_enabled)
        .bind(node.broker_id)
        .bind(&node.name)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Node {} not found", node.name)));
        }

        replace_queues(&mut tx, node).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM nodes WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        self.hydrate(rows).await
    }

    async fn list_enabled(&self) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM nodes WHERE is_enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.hydrate(rows).await
    }
}

#[derive(sqlx::FromRow)]
struct NodeRow {
    name: String,
    max_concurrency: i64,
    min_concurrency: i64,
    is_enabled: bool,
    created_at: i64,
    broker_id: Option<i64>,
}

impl NodeRow {
    fn into_node(self, queues: Vec<String>) -> Result<Node> {
        Ok(Node {
            name: self.name,
            queues,
            max_concurrency: narrow("nodes.max_concurrency", self.max_concurrency)?,
            min_concurrency: narrow("nodes.min_concurrency", self.min_concurrency)?,
            is_enabled: self.is_enabled,
            created_at: self.created_at,
            broker_id: self.broker_id,
        })
    }
}
