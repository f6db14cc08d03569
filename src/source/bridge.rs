use super::{EventSource, Listing, SourceError};
use crate::model::{DeviceSnapshot, PunchEvent, RosterEntry};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Talks JSON over HTTP to the bridge service sitting in front of the
/// terminal (`/info`, `/users`, `/attendances`).
pub struct DeviceBridge {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(alias = "userId", deserialize_with = "string_or_number")]
    user_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    name: String,
    #[serde(default, alias = "role")]
    privilege: u8,
}

#[derive(Debug, Deserialize)]
struct RawPunch {
    sn: u32,
    #[serde(alias = "userId", alias = "deviceUserId", deserialize_with = "string_or_number")]
    user_id: String,
    #[serde(alias = "recordTime")]
    record_time: String,
    #[serde(rename = "type", default)]
    verify_type: u8,
    state: u8,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s.trim().to_string(),
        Id::Number(n) => n.to_string(),
    })
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parses each row on its own so one bad row costs only itself.
fn readable_rows<T: DeserializeOwned>(listing: Listing<Value>, kind: &'static str) -> Vec<T> {
    listing
        .into_vec()
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(kind, error = %e, "Skipping unreadable row");
                None
            }
        })
        .collect()
}

/// RFC 3339, or a bare `YYYY-MM-DD HH:MM:SS` read in `tz`.
pub fn parse_record_time<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

impl DeviceBridge {
    pub fn new(address: &str, port: u16, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("http://{address}:{port}"),
            device_id: format!("{address}:{port}"),
        })
    }

    /// Checks the bridge answers at all.
    pub async fn probe(&self) -> Result<(), SourceError> {
        self.client
            .get(format!("{}/info", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        debug!(device = %self.device_id, "Device bridge reachable");
        Ok(())
    }

    /// Builds the client and probes it once, failing when the terminal is
    /// unreachable.
    pub async fn connect(address: &str, port: u16, timeout: Duration) -> Result<Self, SourceError> {
        let bridge = Self::new(address, port, timeout)?;
        bridge.probe().await?;
        Ok(bridge)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    fn users_from(listing: Listing<Value>) -> Vec<RosterEntry> {
        readable_rows::<RawUser>(listing, "user")
            .into_iter()
            .map(|u| RosterEntry {
                user_id: u.user_id,
                name: u.name,
                privilege: u.privilege,
            })
            .collect()
    }

    fn punches_from(&self, listing: Listing<Value>) -> Vec<PunchEvent> {
        readable_rows::<RawPunch>(listing, "punch")
            .into_iter()
            .filter_map(|raw| self.to_punch(raw))
            .collect()
    }

    fn to_punch(&self, raw: RawPunch) -> Option<PunchEvent> {
        let Some(record_time) = parse_record_time(&raw.record_time, &Local) else {
            warn!(sn = raw.sn, record_time = %raw.record_time, "Skipping punch with unreadable time");
            return None;
        };
        Some(PunchEvent {
            sn: raw.sn,
            employee_id: raw.user_id,
            name: String::new(),
            record_time,
            state: raw.state,
            verify_type: raw.verify_type,
            device_id: self.device_id.clone(),
        })
    }
}

#[async_trait]
impl EventSource for DeviceBridge {
    async fn metadata(&self) -> Result<DeviceSnapshot, SourceError> {
        self.get_json("/info").await
    }

    async fn roster(&self) -> Result<Vec<RosterEntry>, SourceError> {
        let users: Listing<Value> = self.get_json("/users").await?;
        Ok(Self::users_from(users))
    }

    async fn events(&self) -> Result<Vec<PunchEvent>, SourceError> {
        let punches: Listing<Value> = self.get_json("/attendances").await?;
        Ok(self.punches_from(punches))
    }

    async fn close(&self) {
        debug!(device = %self.device_id, "Closing device bridge");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use chrono::FixedOffset;

    #[test]
    fn record_time_formats() {
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();

        let rfc = parse_record_time("2025-04-10T08:55:12+08:00", &plus8).unwrap();
        let bare = parse_record_time("2025-04-10 08:55:12", &plus8).unwrap();

        assert_eq!(rfc, bare);
        assert_eq!(rfc, "2025-04-10T00:55:12Z".parse::<DateTime<Utc>>().unwrap());
        assert!(parse_record_time("yesterday", &plus8).is_none());
    }

    #[actix_web::test]
    async fn connect_reports_unreachable_terminal() {
        let result = DeviceBridge::connect("127.0.0.1", 1, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(SourceError::Unavailable(_)) | Err(SourceError::Timeout)));
    }

    #[test]
    fn raw_rows_accept_numeric_ids() {
        let raw = r#"[{"sn":7,"user_id":1019,"record_time":"2025-04-10 08:55:12","type":1,"state":0}]"#;
        let rows: Listing<RawPunch> = serde_json::from_str(raw).unwrap();
        let rows = rows.into_vec();
        assert_eq!(rows[0].user_id, "1019");
        assert_eq!(Direction::from(rows[0].state), Direction::In);

        let users: Listing<RawUser> =
            serde_json::from_str(r#"{"data":[{"userId":"36","name":"Ana","role":0}]}"#).unwrap();
        assert_eq!(users.into_vec()[0].user_id, "36");
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let bridge = DeviceBridge::new("127.0.0.1", 8000, Duration::from_secs(1)).unwrap();
        let raw = r#"[
            {"sn":1,"user_id":"36","record_time":"2025-04-10T08:55:12Z","type":1,"state":0},
            {"sn":2,"user_id":"36","record_time":null,"type":1,"state":1},
            {"sn":3,"user_id":"36","record_time":"2025-04-10T17:02:00Z","type":1},
            {"sn":4,"user_id":"36","record_time":"not a time","type":1,"state":1},
            {"sn":5,"user_id":"1019","record_time":"2025-04-10T17:05:00Z","type":1,"state":1}
        ]"#;

        let punches = bridge.punches_from(serde_json::from_str(raw).unwrap());

        let serials: Vec<u32> = punches.iter().map(|p| p.sn).collect();
        assert_eq!(serials, vec![1, 5]);
        assert_eq!(punches[1].device_id, "127.0.0.1:8000");
    }

    #[test]
    fn null_names_and_bad_users_do_not_sink_the_roster() {
        let raw = r#"{"data":[
            {"userId":"36","name":null,"role":0},
            {"name":"No id"},
            {"userId":1019,"name":"Ben","role":14}
        ]}"#;

        let users = DeviceBridge::users_from(serde_json::from_str(raw).unwrap());

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, "36");
        assert_eq!(users[0].name, "");
        assert_eq!(users[1].privilege, 14);
    }
}
