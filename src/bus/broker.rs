use super::{Bus, BusError, Handler, ListenerId, Listeners};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSub};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

const RESUBSCRIBE_MIN_DELAY: Duration = Duration::from_millis(250);
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(30);

/// Broker-backed bus. A [`ConnectionManager`] publishes and reconnects on its
/// own; each channel with local listeners gets a subscriber connection whose
/// messages are fanned out through the shared registry, and which is
/// re-established with backoff whenever the broker drops it.
pub struct RedisBus {
    client: redis::Client,
    publisher: ConnectionManager,
    listeners: Arc<Listeners>,
    pumps: Mutex<HashMap<String, JoinHandle<()>>>,
}

/// Doubles `delay`, capped at the maximum resubscribe delay.
fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(RESUBSCRIBE_MAX_DELAY)
}

async fn open_subscription(client: &redis::Client, channel: &str) -> Result<PubSub, BusError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    debug!(channel, "Subscribed to broker channel");
    Ok(pubsub)
}

/// Forwards broker messages into the registry for as long as the bus lives.
async fn pump(client: redis::Client, channel: String, listeners: Arc<Listeners>, mut pubsub: PubSub) {
    loop {
        {
            let mut messages = std::pin::pin!(pubsub.into_on_message());
            while let Some(msg) = messages.next().await {
                let payload = Bytes::copy_from_slice(msg.get_payload_bytes());
                listeners.dispatch(&channel, &payload);
            }
        }
        warn!(%channel, "Broker subscription lost, resubscribing");

        let mut delay = RESUBSCRIBE_MIN_DELAY;
        pubsub = loop {
            tokio::time::sleep(delay).await;
            match open_subscription(&client, &channel).await {
                Ok(pubsub) => break pubsub,
                Err(e) => {
                    delay = next_delay(delay);
                    warn!(%channel, error = %e, retry_in = ?delay, "Resubscribe failed");
                }
            }
        };
        info!(%channel, "Broker subscription restored");
    }
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let mut publisher = client.get_connection_manager().await?;
        let _: String = redis::cmd("PING").query_async(&mut publisher).await?;

        Ok(Self {
            client,
            publisher,
            listeners: Arc::new(Listeners::new()),
            pumps: Mutex::new(HashMap::new()),
        })
    }

    async fn ensure_pump(&self, channel: &str) -> Result<(), BusError> {
        let mut pumps = self.pumps.lock().await;
        if pumps.get(channel).is_some_and(|pump| !pump.is_finished()) {
            return Ok(());
        }

        let pubsub = open_subscription(&self.client, channel).await?;
        let task = tokio::spawn(pump(
            self.client.clone(),
            channel.to_string(),
            self.listeners.clone(),
            pubsub,
        ));
        pumps.insert(channel.to_string(), task);
        Ok(())
    }
}

#[async_trait]
impl Bus for RedisBus {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn.publish(channel, payload.as_ref()).await?;
        trace!(channel, receivers, "Published to broker");
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: Handler) -> Result<ListenerId, BusError> {
        self.ensure_pump(channel).await?;
        Ok(self.listeners.add(channel, handler))
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn listener_count(&self, channel: &str) -> usize {
        self.listeners.count(channel)
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        if let Ok(pumps) = self.pumps.try_lock() {
            for pump in pumps.values() {
                pump.abort();
            }
        }
    }
}
