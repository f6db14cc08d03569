use crate::aggregate::{Aggregator, Window};
use crate::bus::Bus;
use crate::codec::{self, EncodeError};
use crate::config::PayloadMode;
use crate::model::{DeviceSnapshot, Payload, PunchEvent, Roster};
use crate::snapshot::{Snapshot, SnapshotWriter};
use crate::source::{EventSource, SourceError};
use crate::store::LogStore;
use bytes::Bytes;
use chrono::{DateTime, Local, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("event source: {0}")]
    Source(#[from] SourceError),
    #[error("encoding payload: {0}")]
    Encode(#[from] EncodeError),
}

/// What one cycle did; logged by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub punches: usize,
    pub logs: usize,
    pub published: bool,
    pub persisted: Option<usize>,
}

pub struct PollerSettings {
    pub channel: String,
    pub mode: PayloadMode,
    pub active_employee_ids: Vec<String>,
    pub retention_days: Option<u32>,
}

/// Drives fetch -> aggregate -> publish -> persist, and is the only writer
/// of the last published snapshot.
pub struct Poller<Tz: TimeZone = Local> {
    source: Arc<dyn EventSource>,
    aggregator: Aggregator<Tz>,
    bus: Arc<dyn Bus>,
    store: Option<Arc<dyn LogStore>>,
    snapshot: SnapshotWriter,
    settings: PollerSettings,
    device: Option<DeviceSnapshot>,
}

impl<Tz: TimeZone> Poller<Tz> {
    pub fn new(
        source: Arc<dyn EventSource>,
        aggregator: Aggregator<Tz>,
        bus: Arc<dyn Bus>,
        store: Option<Arc<dyn LogStore>>,
        snapshot: SnapshotWriter,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            aggregator,
            bus,
            store,
            snapshot,
            settings,
            device: None,
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        if self.device.is_none() {
            match self.source.metadata().await {
                Ok(device) => self.device = Some(device),
                Err(e) => warn!(error = %e, "Device metadata unavailable, will retry next cycle"),
            }
        }

        let enrolled = self.source.roster().await?;
        let events = self.source.events().await?;

        let directory = Roster::new(enrolled.iter().cloned());
        let roster = Roster::from_enrolled(enrolled, &self.settings.active_employee_ids);
        let window = Window::year_to_date(now, self.aggregator.timezone(), self.settings.retention_days);

        let punches: Vec<PunchEvent> = events
            .into_iter()
            .filter(|p| window.contains(p.record_time))
            .map(|mut p| {
                p.name = directory.name_of(&p.employee_id).unwrap_or(UNKNOWN_NAME).to_string();
                p
            })
            .collect();

        let timestamp = now.timestamp_millis();
        let device_details = self.device.clone().unwrap_or_default();
        let users = roster.to_vec();

        let (payload, logs) = match self.settings.mode {
            PayloadMode::Records => {
                let records = self.aggregator.aggregate(&punches, &roster, &window);
                let logs = records.len();
                let payload = codec::encode_binary(&Payload {
                    timestamp,
                    device_details,
                    users,
                    logs: records,
                })?;
                (payload, logs)
            }
            PayloadMode::Punches => {
                let payload = codec::encode_binary(&Payload {
                    timestamp,
                    device_details,
                    users,
                    logs: punches.clone(),
                })?;
                (payload, punches.len())
            }
        };

        let published = self.publish(timestamp, payload).await;
        let persisted = self.persist(&punches).await;

        Ok(CycleReport {
            punches: punches.len(),
            logs,
            published,
            persisted,
        })
    }

    /// Replaces the snapshot before publishing so a viewer joining in between
    /// already sees this cycle's data.
    async fn publish(&self, generated_at: i64, payload: Bytes) -> bool {
        self.snapshot.replace(Snapshot {
            generated_at,
            payload: payload.clone(),
        });

        match self.bus.publish(&self.settings.channel, payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, channel = %self.settings.channel, "Publish failed");
                false
            }
        }
    }

    async fn persist(&self, punches: &[PunchEvent]) -> Option<usize> {
        let store = self.store.as_ref()?;
        match store.upsert(punches).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                error!(error = %e, rows = punches.len(), "Persisting punches failed");
                None
            }
        }
    }

    /// Runs a cycle now and then every `period`, one at a time. A tick that
    /// fires while a cycle is still running is skipped.
    pub async fn run(mut self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            debug!("Cycle starting");
            match self.run_cycle().await {
                Ok(report) => info!(
                    punches = report.punches,
                    logs = report.logs,
                    published = report.published,
                    persisted = ?report.persisted,
                    "Cycle complete"
                ),
                Err(e) => warn!(error = %e, "Cycle skipped"),
            }
        }
    }
}
