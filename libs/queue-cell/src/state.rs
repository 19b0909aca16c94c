use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use directory_cell::{directory_from_config, ProfileDirectory};
use shared_config::AppConfig;

use crate::{
    AppointmentStore, DailyPartitionPolicy, InMemoryAppointmentStore, QueueAdvancementService, QueueDate,
    QueueError, QueueLifecycleService, QueueNotificationHub, RedisAppointmentStore, ServingPolicy,
    TokenAllocator,
};

/// Everything the queue routes and sockets share.
pub struct QueueState {
    pub config: Arc<AppConfig>,
    pub policy: DailyPartitionPolicy,
    pub directory: Arc<dyn ProfileDirectory>,
    pub store: Arc<dyn AppointmentStore>,
    pub hub: QueueNotificationHub,
    pub allocator: TokenAllocator,
    pub lifecycle: QueueLifecycleService,
    pub advancement: QueueAdvancementService,
}

impl QueueState {
    pub fn new(
        config: Arc<AppConfig>,
        directory: Arc<dyn ProfileDirectory>,
        store: Arc<dyn AppointmentStore>,
    ) -> Result<Self, QueueError> {
        let settings = &config.queue;
        let policy = DailyPartitionPolicy::new(settings.utc_offset_minutes)?;
        let serving_policy: ServingPolicy = settings.serving_policy.parse()?;
        let hub = QueueNotificationHub::new();

        let allocator = TokenAllocator::new(
            store.clone(),
            directory.clone(),
            policy,
            settings.allow_duplicate_bookings,
        );
        let lifecycle = QueueLifecycleService::new(store.clone(), settings.max_cas_retries);
        let advancement = QueueAdvancementService::new(
            store.clone(),
            hub.clone(),
            serving_policy,
            settings.max_cas_retries,
        );

        Ok(Self {
            config,
            policy,
            directory,
            store,
            hub,
            allocator,
            lifecycle,
            advancement,
        })
    }

    /// Wires the directory and store named by the configuration.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, QueueError> {
        let directory = directory_from_config(&config).await?;

        let store: Arc<dyn AppointmentStore> = match &config.redis_url {
            Some(url) => {
                info!("Using Redis appointment store");
                Arc::new(RedisAppointmentStore::new(url).await?)
            }
            None => {
                info!("REDIS_URL not set, appointments are kept in memory");
                Arc::new(InMemoryAppointmentStore::new())
            }
        };

        Self::new(config, directory, store)
    }

    pub fn today(&self) -> QueueDate {
        self.policy.today(Utc::now())
    }
}
