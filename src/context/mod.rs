//! Application context
//!
//! Owns every long-lived piece of the subsystem (cache, change bus, hub,
//! refresh scheduler) and is the single entry point the write path calls
//! after it commits.
//!
//! Write-path contract:
//! - a comment was committed: `comment_committed(template_id)`
//! - anything else feeding the derived view changed (templates, tags,
//!   topics, likes, answers): `entity_committed()`
//!
//! Both return without waiting for the broadcast or the refresh.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, JwtAuthenticator};
use crate::bus::ChangeBus;
use crate::cache::TtlCache;
use crate::config::{Settings, StoreBackend};
use crate::hub::{Hub, TopicId};
use crate::persistence::{MemoryStore, SledStore, SnapshotStore, TemplateStats};
use crate::scheduler::RefreshScheduler;
use crate::utils::error::StoreError;

pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<dyn SnapshotStore>,
    pub cache: Arc<TtlCache>,
    pub bus: ChangeBus,
    pub hub: Arc<Hub>,
    pub scheduler: Arc<RefreshScheduler>,
    pub authenticator: Arc<dyn Authenticator>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

pub fn stats_key(topic_id: TopicId) -> String {
    format!("template-stats:{topic_id}")
}

/// Open the store selected by `settings.store.backend`.
pub fn open_store(settings: &Settings) -> Result<Arc<dyn SnapshotStore>, StoreError> {
    Ok(match settings.store.backend {
        StoreBackend::Sled => Arc::new(SledStore::open(&settings.store.path)?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    })
}

impl AppContext {
    pub fn new(
        settings: Settings,
        store: Arc<dyn SnapshotStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let cache = Arc::new(TtlCache::new(Duration::from_secs(settings.cache.ttl_secs)));
        let scheduler = Arc::new(RefreshScheduler::new(
            Duration::from_millis(settings.refresh.debounce_ms),
            settings.refresh.overlap_policy,
            cache.clone(),
            store.clone(),
            cancel.child_token(),
        ));

        Self {
            hub: Arc::new(Hub::new(store.clone())),
            bus: ChangeBus::default(),
            settings,
            store,
            cache,
            scheduler,
            authenticator,
            cancel,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build a context from configuration alone: the configured store backend
    /// and a JWT authenticator keyed with `server.jwt_secret`.
    pub fn from_settings(settings: Settings) -> Result<Self, StoreError> {
        let store = open_store(&settings)?;
        let authenticator = Arc::new(JwtAuthenticator::new(&settings.server.jwt_secret));
        Ok(Self::new(settings, store, authenticator))
    }

    /// Spawn the scheduler loop and the cache sweeper.
    pub fn start(&self) {
        let scheduler = self.scheduler.spawn(self.bus.subscribe());
        let sweeper = self.cache.spawn_sweeper(
            Duration::from_secs(self.settings.cache.sweep_secs),
            self.cancel.child_token(),
        );
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([scheduler, sweeper]);
        info!(
            debounce_ms = self.scheduler.delay().as_millis() as u64,
            overlap_policy = ?self.scheduler.policy(),
            cache_ttl_secs = self.cache.ttl().as_secs(),
            "background tasks started"
        );
    }

    /// Cancel the background tasks and the accept loop, then wait for the
    /// background tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        info!("shutdown complete");
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A comment on `topic_id` was committed: push the template's feed and
    /// schedule a refresh of the derived view.
    pub fn comment_committed(&self, topic_id: TopicId) -> JoinHandle<()> {
        let broadcast = self.hub.notify_changed(topic_id);
        self.bus.signal_changed();
        broadcast
    }

    /// Something other than a comment changed.
    pub fn entity_committed(&self) {
        self.bus.signal_changed();
    }

    /// Cache-aside read of a template's aggregates.
    pub async fn template_stats(&self, topic_id: TopicId) -> Result<TemplateStats, StoreError> {
        let key = stats_key(topic_id);
        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_value::<TemplateStats>(cached) {
                Ok(stats) => return Ok(stats),
                Err(e) => debug!(key = %key, error = %e, "discarding unreadable cache entry"),
            }
        }

        let stats = self.store.template_stats(topic_id).await?;
        self.cache.set(key, serde_json::to_value(&stats)?);
        Ok(stats)
    }

    /// Cached value for an arbitrary key, computing and storing it on a miss.
    pub async fn cached_or_else<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<Value, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value, StoreError>>,
    {
        if let Some(value) = self.cache.get(key) {
            return Ok(value);
        }
        let value = load().await?;
        match ttl {
            Some(ttl) => self.cache.set_with_ttl(key, value.clone(), ttl),
            None => self.cache.set(key, value.clone()),
        }
        Ok(value)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("hub", &self.hub)
            .field("scheduler", &self.scheduler)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
