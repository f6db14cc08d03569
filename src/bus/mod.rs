//! Publish/subscribe with two interchangeable backends.
//!
//! Both backends deliver through the same [`Listeners`] registry, so
//! at-most-once fan-out and listener bookkeeping are identical; only
//! cross-process sharing differs.

pub mod broker;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use self::broker::RedisBus;
pub use self::local::LocalBus;

/// Called once per delivered message. Must return promptly; anything slow
/// belongs on the far side of a channel.
pub type Handler = Arc<dyn Fn(Bytes) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("timed out connecting to broker")]
    Timeout,
}

#[async_trait]
pub trait Bus: Send + Sync {
    /// Short backend name for logs and the status endpoint.
    fn backend(&self) -> &'static str;

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str, handler: Handler) -> Result<ListenerId, BusError>;

    fn unsubscribe(&self, id: ListenerId);

    fn listener_count(&self, channel: &str) -> usize;
}

/// In-process listener table shared by both backends.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    channels: Mutex<HashMap<String, HashMap<ListenerId, Handler>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, HashMap<ListenerId, Handler>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, channel: &str, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table()
            .entry(channel.to_string())
            .or_default()
            .insert(id, handler);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut table = self.table();
        let mut removed = false;
        table.retain(|_, handlers| {
            removed |= handlers.remove(&id).is_some();
            !handlers.is_empty()
        });
        removed
    }

    pub fn count(&self, channel: &str) -> usize {
        self.table().get(channel).map_or(0, HashMap::len)
    }

    /// Hands `payload` to every current listener on `channel` and returns how
    /// many were reached. Handlers run outside the lock.
    pub fn dispatch(&self, channel: &str, payload: &Bytes) -> usize {
        let handlers: Vec<Handler> = match self.table().get(channel) {
            Some(handlers) => handlers.values().cloned().collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }
}

/// Tries the broker once; anything short of a working connection selects
/// the in-process bus instead.
pub async fn connect(redis_url: Option<&str>, timeout: Duration) -> Arc<dyn Bus> {
    let Some(url) = redis_url else {
        info!("No broker configured, using in-process bus");
        return Arc::new(LocalBus::new());
    };

    let attempt = tokio::time::timeout(timeout, RedisBus::connect(url))
        .await
        .unwrap_or(Err(BusError::Timeout));

    match attempt {
        Ok(bus) => {
            info!("Connected to Redis pub/sub");
            Arc::new(bus)
        }
        Err(e) => {
            warn!(error = %e, "Broker unavailable, falling back to in-process bus");
            Arc::new(LocalBus::new())
        }
    }
}
