use std::sync::Arc;
use std::time::Duration;

use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;

use crate::clock::SystemClock;
use crate::config::{Config, LockBackend};
use crate::error::Result;
use crate::integrations::accounts::PgAccountDirectory;
use crate::integrations::email::RedisOutboxMailer;
use crate::integrations::meetings::{DisabledMeetingService, HttpMeetingService, MeetingService};
use crate::integrations::notifications::PgNotifier;
use crate::locks::{InMemorySlotLockStore, RedisSlotLockStore, SlotLockManager, SlotLockStore};
use crate::services::effects::DispatchMode;
use crate::services::{BookingEngine, EngineParts};
use crate::store::PgBookingStore;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager (slot locks, auth sessions, email outbox).
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// Booking, lifecycle, availability and sweep services.
    pub engine: BookingEngine,
    /// Set when slot locks are process-local; the sweep purges it.
    pub memory_locks: Option<Arc<InMemorySlotLockStore>>,
}

impl AppState {
    /// Connects to Postgres and Redis and wires the booking engine.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("✅ PostgreSQL pool initialized");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis connection manager initialized");

        let (lock_store, memory_locks): (Arc<dyn SlotLockStore>, _) = match config.slot_lock_backend {
            LockBackend::Redis => (Arc::new(RedisSlotLockStore::new(redis.clone())) as Arc<dyn SlotLockStore>, None),
            LockBackend::Memory => {
                tracing::warn!("Slot locks are process-local; run a single node only");
                let store = Arc::new(InMemorySlotLockStore::new());
                (store.clone() as Arc<dyn SlotLockStore>, Some(store))
            }
        };
        let locks = SlotLockManager::new(lock_store, Duration::from_secs(config.slot_lock_ttl_secs));

        let meetings: Arc<dyn MeetingService> = match &config.meeting_api_url {
            Some(url) => {
                tracing::info!("✅ Meeting service at {}", url);
                Arc::new(HttpMeetingService::new(url.as_str())?)
            }
            None => {
                tracing::warn!("MEETING_API_URL not set; sessions will have no meeting room");
                Arc::new(DisabledMeetingService)
            }
        };

        let engine = BookingEngine::new(EngineParts {
            store: Arc::new(PgBookingStore::new(db.clone())),
            directory: Arc::new(PgAccountDirectory::new(db.clone())),
            locks,
            meetings,
            notifier: Arc::new(PgNotifier::new(db.clone())),
            mailer: Arc::new(RedisOutboxMailer::new(redis.clone())),
            clock: Arc::new(SystemClock),
            slots: config.slots,
            policy: config.policy,
            offset: config.schedule_offset,
            dispatch: DispatchMode::Detached,
        });
        tracing::info!("✅ Booking engine initialized");

        Ok(AppState {
            db,
            redis,
            config: config.clone(),
            engine,
            memory_locks,
        })
    }
}
