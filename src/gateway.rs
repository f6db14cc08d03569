use crate::bus::{Bus, BusError, Handler, ListenerId};
use crate::codec::{self, WireFormat};
use crate::snapshot::{Snapshot, SnapshotReader};
use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::{CloseReason, Message, MessageStream, Session};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Updates buffered per viewer before new ones are dropped for it.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// How often each viewer is pinged.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// Silence after which a viewer is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: HEARTBEAT_INTERVAL,
            timeout: CLIENT_TIMEOUT,
        }
    }
}

/// Hands every viewer the last snapshot, then every later publish.
#[derive(Clone)]
pub struct Gateway {
    bus: Arc<dyn Bus>,
    snapshot: SnapshotReader,
    channel: String,
    queue_depth: usize,
    heartbeat: Heartbeat,
}

/// A viewer's registration on the bus. Dropping it unregisters the viewer.
pub struct Attachment {
    bus: Arc<dyn Bus>,
    listener: ListenerId,
    pub initial: Option<Snapshot>,
    pub updates: mpsc::Receiver<Bytes>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.listener);
    }
}

impl Gateway {
    pub fn new(bus: Arc<dyn Bus>, snapshot: SnapshotReader, channel: impl Into<String>) -> Self {
        Self {
            bus,
            snapshot,
            channel: channel.into(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            heartbeat: Heartbeat::default(),
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Registers a viewer. The listener goes in before the snapshot is read,
    /// so a publish racing the connect is never lost; at worst the viewer
    /// sees the same payload twice.
    pub async fn attach(&self) -> Result<Attachment, BusError> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let handler: Handler = Arc::new(move |payload: Bytes| match tx.try_send(payload) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => debug!("Viewer queue full, dropping update"),
        });

        let listener = self.bus.subscribe(&self.channel, handler).await?;
        Ok(Attachment {
            bus: self.bus.clone(),
            listener,
            initial: self.snapshot.latest(),
            updates: rx,
        })
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.snapshot.latest()
    }

    pub fn backend(&self) -> &'static str {
        self.bus.backend()
    }

    pub fn listener_count(&self) -> usize {
        self.bus.listener_count(&self.channel)
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    format: Option<String>,
}

impl StreamQuery {
    fn wire_format(&self) -> WireFormat {
        match self.format.as_deref() {
            Some("json") | Some("text") => WireFormat::Text,
            _ => WireFormat::Binary,
        }
    }
}

/// `GET /ws`: upgrades to a push-only attendance stream.
pub async fn stream(
    req: HttpRequest,
    body: web::Payload,
    gateway: web::Data<Gateway>,
    query: web::Query<StreamQuery>,
) -> actix_web::Result<HttpResponse> {
    let (response, session, messages) = actix_ws::handle(&req, body)?;

    let attachment = gateway.attach().await.map_err(|e| {
        error!(error = %e, "Failed to register viewer");
        actix_web::error::ErrorServiceUnavailable("Attendance stream unavailable")
    })?;

    let connection = Uuid::new_v4();
    let peer = req.peer_addr().map(|addr| addr.to_string()).unwrap_or_default();
    info!(%connection, %peer, "Viewer connected");

    actix_web::rt::spawn(run_session(
        connection,
        session,
        messages,
        attachment,
        query.wire_format(),
        gateway.heartbeat,
    ));

    Ok(response)
}

async fn run_session(
    connection: Uuid,
    mut session: Session,
    mut messages: MessageStream,
    mut attachment: Attachment,
    format: WireFormat,
    heartbeat: Heartbeat,
) {
    let mut reason: Option<CloseReason> = None;
    let mut open = true;
    let mut last_seen = Instant::now();
    let mut ticker = interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);

    if let Some(snapshot) = attachment.initial.take() {
        open = send(&mut session, &snapshot.payload, format).await;
    }

    while open {
        tokio::select! {
            update = attachment.updates.recv() => match update {
                Some(payload) => open = send(&mut session, &payload, format).await,
                None => open = false,
            },
            _ = ticker.tick() => {
                if last_seen.elapsed() > heartbeat.timeout {
                    info!(%connection, "Viewer stopped answering heartbeats");
                    open = false;
                } else {
                    open = session.ping(b"").await.is_ok();
                }
            },
            inbound = messages.next() => match inbound {
                Some(Ok(message)) => {
                    last_seen = Instant::now();
                    match message {
                        Message::Ping(bytes) => open = session.pong(&bytes).await.is_ok(),
                        Message::Close(close) => {
                            reason = close;
                            open = false;
                        }
                        // Push-only: pongs and anything else only prove liveness.
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    warn!(%connection, error = %e, "Viewer protocol error");
                    open = false;
                }
                None => open = false,
            },
        }
    }

    drop(attachment);
    let _ = session.close(reason).await;
    info!(%connection, "Viewer disconnected");
}

/// Returns false once the viewer is gone.
async fn send(session: &mut Session, payload: &Bytes, format: WireFormat) -> bool {
    match format {
        WireFormat::Binary => session.binary(payload.clone()).await.is_ok(),
        WireFormat::Text => match codec::transcode_to_text(payload) {
            Ok(text) => session.text(text).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "Could not transcode payload for text viewer");
                true
            }
        },
    }
}
