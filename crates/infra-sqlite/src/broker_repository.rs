// SQLite BrokerRepository Implementation

use crate::error::{map_sqlx_error, narrow};
use async_trait::async_trait;
use scs_core::domain::{Broker, BrokerId, BrokerKey, NewBroker};
use scs_core::error::{AppError, Result};
use scs_core::port::BrokerRepository;
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteBrokerRepository {
    pool: SqlitePool,
}

impl SqliteBrokerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrokerRepository for SqliteBrokerRepository {
    async fn insert(&self, broker: &NewBroker) -> Result<Broker> {
        let result = sqlx::query(
            r#"
            INSERT INTO brokers (hostname, port, userid, password, virtual_host, is_default)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&broker.hostname)
        .bind(i64::from(broker.port))
        .bind(&broker.userid)
        .bind(&broker.password)
        .bind(&broker.virtual_host)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();
        debug!(broker_id = id, hostname = %broker.hostname, "Broker inserted");
        Ok(broker.clone().into_broker(id))
    }

    async fn find_by_id(&self, id: BrokerId) -> Result<Option<Broker>> {
        let row = sqlx::query_as::<_, BrokerRow>("SELECT * FROM brokers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(BrokerRow::into_broker).transpose()
    }

    async fn find_by_key(&self, key: &BrokerKey) -> Result<Option<Broker>> {
        let row = sqlx::query_as::<_, BrokerRow>(
            "SELECT * FROM brokers WHERE hostname = ? AND port = ? AND virtual_host = ?",
        )
        .bind(&key.hostname)
        .bind(i64::from(key.port))
        .bind(&key.virtual_host)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(BrokerRow::into_broker).transpose()
    }

    async fn find_default(&self) -> Result<Option<Broker>> {
        let row = sqlx::query_as::<_, BrokerRow>(
            "SELECT * FROM brokers WHERE is_default = 1 ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(BrokerRow::into_broker).transpose()
    }

    async fn set_default(&self, id: BrokerId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brokers WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if exists == 0 {
            return Err(AppError::NotFound(format!("Broker {} not found", id)));
        }

        sqlx::query("UPDATE brokers SET is_default = CASE WHEN id = ? THEN 1 ELSE 0 END")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Broker>> {
        let rows = sqlx::query_as::<_, BrokerRow>("SELECT * FROM brokers ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(BrokerRow::into_broker).collect()
    }
}

#[derive(sqlx::FromRow)]
struct BrokerRow {
    id: i64,
    hostname: String,
    port: i64,
    userid: String,
    password: String,
    virtual_host: String,
    is_default: bool,
}

impl BrokerRow {
    fn into_broker(self) -> Result<Broker> {
        Ok(Broker {
            id: self.id,
            hostname: self.hostname,
            port: narrow("brokers.port", self.port)?,
            userid: self.userid,
            password: self.password,
            virtual_host: self.virtual_host,
            is_default: self.is_default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn setup_test_db() -> SqliteBrokerRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteBrokerRepository::new(pool)
    }

    fn new_broker(hostname: &str, vhost: &str) -> NewBroker {
        NewBroker {
            hostname: hostname.to_string(),
            port: 5672,
            userid: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: vhost.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = setup_test_db().await;
        let broker = repo.insert(&new_broker("mq1", "/")).await.unwrap();

        let by_id = repo.find_by_id(broker.id).await.unwrap().unwrap();
        assert_eq!(by_id, broker);
        assert!(!by_id.is_default);

        let by_key = repo.find_by_key(&broker.key()).await.unwrap().unwrap();
        assert_eq!(by_key.id, broker.id);

        assert!(repo.find_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_key_conflicts() {
        let repo = setup_test_db().await;
        repo.insert(&new_broker("mq1", "/")).await.unwrap();

        let dup = repo.insert(&new_broker("mq1", "/")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        // Same host, other vhost is a different broker
        repo.insert(&new_broker("mq1", "jobs")).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_default_is_exclusive() {
        let repo = setup_test_db().await;
        let a = repo.insert(&new_broker("a", "/")).await.unwrap();
        let b = repo.insert(&new_broker("b", "/")).await.unwrap();
        assert!(repo.find_default().await.unwrap().is_none());

        repo.set_default(a.id).await.unwrap();
        repo.set_default(b.id).await.unwrap();

        let defaults: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|b| b.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(repo.find_default().await.unwrap().unwrap().id, b.id);
    }

    #[tokio::test]
    async fn test_set_default_unknown_id() {
        let repo = setup_test_db().await;
        assert!(matches!(
            repo.set_default(42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
