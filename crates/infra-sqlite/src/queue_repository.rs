// SQLite QueueRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use scs_core::domain::Queue;
use scs_core::error::{AppError, Result};
use scs_core::port::QueueRepository;
use sqlx::SqlitePool;

pub struct SqliteQueueRepository {
    pool: SqlitePool,
}

impl SqliteQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn insert(&self, queue: &Queue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queues (
                name, exchange, exchange_type, routing_key, options, is_enabled, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&queue.name)
        .bind(&queue.exchange)
        .bind(&queue.exchange_type)
        .bind(&queue.routing_key)
        .bind(&queue.options)
        .bind(queue.is_enabled)
        .bind(queue.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Queue>> {
        let row = sqlx::query_as::<_, QueueRow>("SELECT * FROM queues WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(QueueRow::into_queue))
    }

    async fn update(&self, queue: &Queue) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE queues
            SET exchange = ?, exchange_type = ?, routing_key = ?, options = ?, is_enabled = ?
            WHERE name = ?
            "#,
        )
        .bind(&queue.exchange)
        .bind(&queue.exchange_type)
        .bind(&queue.routing_key)
        .bind(&queue.options)
        .bind(queue.is_enabled)
        .bind(&queue.name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Queue {} not found", queue.name)));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Queue>> {
        let rows = sqlx::query_as::<_, QueueRow>("SELECT * FROM queues ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(QueueRow::into_queue).collect())
    }

    async fn list_enabled(&self) -> Result<Vec<Queue>> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT * FROM queues WHERE is_enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(QueueRow::into_queue).collect())
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    name: String,
    exchange: Option<String>,
    exchange_type: Option<String>,
    routing_key: Option<String>,
    options: Option<String>,
    is_enabled: bool,
    created_at: i64,
}

impl QueueRow {
    fn into_queue(self) -> Queue {
        Queue {
            name: self.name,
            exchange: self.exchange,
            exchange_type: self.exchange_type,
            routing_key: self.routing_key,
            is_enabled: self.is_enabled,
            created_at: self.created_at,
            options: self.options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqliteQueueRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteQueueRepository::new(pool)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        let mut queue = Queue::new("images", 1_700_000_000_000);
        queue.exchange = Some("media".to_string());
        queue.exchange_type = Some("topic".to_string());
        queue.options = Some(r#"{"x_priority":3}"#.to_string());
        repo.insert(&queue).await.unwrap();

        let found = repo.find_by_name("images").await.unwrap().unwrap();
        assert_eq!(found, queue);
        assert!(repo.find_by_name("video").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let repo = setup_test_db().await;
        repo.insert(&Queue::new("images", 0)).await.unwrap();
        assert!(matches!(
            repo.insert(&Queue::new("images", 0)).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_enabled_filter() {
        let repo = setup_test_db().await;
        repo.insert(&Queue::new("a", 0)).await.unwrap();
        repo.insert(&Queue::new("b", 0)).await.unwrap();

        let mut b = repo.find_by_name("b").await.unwrap().unwrap();
        b.is_enabled = false;
        repo.update(&b).await.unwrap();

        let names: Vec<_> = repo
            .list_enabled()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_queue() {
        let repo = setup_test_db().await;
        assert!(matches!(
            repo.update(&Queue::new("ghost", 0)).await,
            Err(AppError::NotFound(_))
        ));
    }
}
