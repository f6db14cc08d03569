use super::{Bus, BusError, Handler, ListenerId, Listeners};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

/// Same-process bus used when no broker is reachable.
#[derive(Default)]
pub struct LocalBus {
    listeners: Listeners,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for LocalBus {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BusError> {
        let reached = self.listeners.dispatch(channel, &payload);
        trace!(channel, reached, "Published locally");
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: Handler) -> Result<ListenerId, BusError> {
        Ok(self.listeners.add(channel, handler))
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    fn listener_count(&self, channel: &str) -> usize {
        self.listeners.count(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[actix_web::test]
    async fn publish_reaches_current_subscribers_only() {
        let bus = LocalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = bus
            .subscribe("attendance", Arc::new(move |b: Bytes| sink.lock().unwrap().push(b)))
            .await
            .unwrap();

        bus.publish("attendance", Bytes::from_static(b"one")).await.unwrap();
        bus.unsubscribe(id);
        bus.publish("attendance", Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Bytes::from_static(b"one")]);
        assert_eq!(bus.listener_count("attendance"), 0);
    }

    #[actix_web::test]
    async fn publish_without_subscribers_succeeds() {
        let bus = LocalBus::new();
        assert!(bus.publish("attendance", Bytes::new()).await.is_ok());
    }
}
