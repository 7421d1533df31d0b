// Broker Registry

use std::sync::Arc;
use tracing::info;

use crate::config::BrokerDefaults;
use crate::domain::{Broker, BrokerId, NewBroker};
use crate::error::{AppError, Result};
use crate::port::BrokerRepository;

/// Broker records and the default-broker fallback
pub struct BrokerRegistry {
    repo: Arc<dyn BrokerRepository>,
    defaults: BrokerDefaults,
}

impl BrokerRegistry {
    pub fn new(repo: Arc<dyn BrokerRepository>, defaults: BrokerDefaults) -> Self {
        Self { repo, defaults }
    }

    /// Get or create the broker identified by (hostname, port, vhost)
    pub async fn add(&self, broker: NewBroker) -> Result<Broker> {
        let key = broker.key();
        if let Some(existing) = self.repo.find_by_key(&key).await? {
            return Ok(existing);
        }
        match self.repo.insert(&broker).await {
            Ok(stored) => {
                info!(broker = %stored, id = stored.id, "Broker added");
                Ok(stored)
            }
            // Lost a race with a concurrent add of the same broker
            Err(AppError::Conflict(_)) => self
                .repo
                .find_by_key(&key)
                .await?
                .ok_or_else(|| AppError::Internal(format!("Broker {:?} vanished", key))),
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, id: BrokerId) -> Result<Broker> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Broker {} not found", id)))
    }

    /// The default broker, created from the configured defaults if none is flagged
    pub async fn get_default(&self) -> Result<Broker> {
        if let Some(broker) = self.repo.find_default().await? {
            return Ok(broker);
        }

        let mut broker = self.add(NewBroker::from(&self.defaults)).await?;
        self.repo.set_default(broker.id).await?;
        broker.is_default = true;
        info!(broker = %broker, "Default broker created");
        Ok(broker)
    }

    /// Flag `id` as the only default broker
    pub async fn set_default(&self, id: BrokerId) -> Result<Broker> {
        let mut broker = self.get(id).await?;
        self.repo.set_default(id).await?;
        broker.is_default = true;
        Ok(broker)
    }

    pub async fn all(&self) -> Result<Vec<Broker>> {
        self.repo.list().await
    }

    /// Broker a node talks to: its own, or the default when it has none
    pub async fn effective(&self, broker_id: Option<BrokerId>) -> Result<Broker> {
        match broker_id {
            Some(id) => self.get(id).await,
            None => self.get_default().await,
        }
    }
}
