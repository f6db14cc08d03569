//! Receiving side of the stream.
//!
//! [`ClientReducer`] rebuilds day records from raw punch batches with the
//! same rules the server-side [`Aggregator`](crate::aggregate::Aggregator)
//! uses, but keeps its bucket map across batches. [`RecordView`] just holds
//! the latest server-aggregated records.

use crate::aggregate::DayBuckets;
use crate::codec::{self, DecodeError};
use crate::model::{DayRecord, DeviceSnapshot, Payload, PunchEvent, Roster, RosterEntry};
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

pub struct ClientReducer<Tz: TimeZone = Local> {
    tz: Tz,
    threshold_minutes: u32,
    retention_days: Option<u32>,
    buckets: DayBuckets,
    roster: Roster,
    device: Option<DeviceSnapshot>,
    last_updated: Option<i64>,
    records: Vec<DayRecord>,
}

impl ClientReducer<Local> {
    pub fn local(threshold_minutes: u32) -> Self {
        Self::new(Local, threshold_minutes)
    }
}

impl<Tz: TimeZone> ClientReducer<Tz> {
    pub fn new(tz: Tz, threshold_minutes: u32) -> Self {
        Self {
            tz,
            threshold_minutes,
            retention_days: None,
            buckets: DayBuckets::new(),
            roster: Roster::default(),
            device: None,
            last_updated: None,
            records: Vec::new(),
        }
    }

    /// Keeps only the last `days` days, counted back from each received
    /// payload's timestamp. `None` keeps everything.
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention_days = days;
        self
    }

    /// Replaces the roster and re-derives every record.
    pub fn set_roster(&mut self, users: Vec<RosterEntry>) {
        self.roster = Roster::new(users);
        self.rebuild();
    }

    /// Folds a batch into the running buckets. Punches already seen in an
    /// earlier batch only tighten min/max, so replays are harmless.
    pub fn add_batch(&mut self, punches: &[PunchEvent]) {
        for punch in punches {
            self.buckets.record(punch, &self.tz);
        }
        self.rebuild();
    }

    /// Decodes one received frame (msgpack, else JSON). On failure the frame
    /// is discarded and prior state is left untouched.
    pub fn apply(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        let payload: Payload<PunchEvent> = codec::decode(raw)?;
        self.device = Some(payload.device_details);
        self.last_updated = Some(payload.timestamp);
        self.roster = Roster::new(payload.users);
        self.add_batch(&payload.logs);
        if let Some(horizon) = self.horizon(payload.timestamp) {
            self.prune_before(horizon);
        }
        Ok(())
    }

    fn horizon(&self, timestamp: i64) -> Option<NaiveDate> {
        let days = self.retention_days?;
        let today = DateTime::<Utc>::from_timestamp_millis(timestamp)?
            .with_timezone(&self.tz)
            .date_naive();
        Some(today - Duration::days(i64::from(days)))
    }

    pub fn prune_before(&mut self, horizon: NaiveDate) {
        self.buckets.prune_before(horizon);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.records = self.buckets.to_records(&self.roster, self.threshold_minutes);
    }

    pub fn records(&self) -> &[DayRecord] {
        &self.records
    }

    pub fn device(&self) -> Option<&DeviceSnapshot> {
        self.device.as_ref()
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.last_updated
    }
}

/// Latest server-aggregated payload.
#[derive(Debug, Default)]
pub struct RecordView {
    latest: Option<Payload<DayRecord>>,
}

impl RecordView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        self.latest = Some(codec::decode(raw)?);
        Ok(())
    }

    pub fn records(&self) -> &[DayRecord] {
        self.latest.as_ref().map(|p| p.logs.as_slice()).unwrap_or_default()
    }

    pub fn last_updated(&self) -> Option<i64> {
        self.latest.as_ref().map(|p| p.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{member, punch};
    use crate::aggregate::{Aggregator, DEFAULT_THRESHOLD_MINUTES, Window};
    use crate::model::{Direction, Status};
    use chrono::{NaiveTime, Utc};

    fn reducer() -> ClientReducer<Utc> {
        ClientReducer::new(Utc, DEFAULT_THRESHOLD_MINUTES)
    }

    #[test]
    fn batches_accumulate_monotonically() {
        let mut reducer = reducer();
        reducer.set_roster(vec![member("A", "Ana")]);

        reducer.add_batch(&[punch(1, "A", "2025-04-10T09:20:00Z", Direction::In)]);
        assert_eq!(reducer.records()[0].status, Status::Absent);

        reducer.add_batch(&[
            punch(2, "A", "2025-04-10T08:40:00Z", Direction::In),
            punch(3, "A", "2025-04-10T16:00:00Z", Direction::Out),
        ]);
        assert_eq!(reducer.records()[0].status, Status::Early);

        // A later in-punch never moves time-in forward; a later out extends.
        reducer.add_batch(&[
            punch(4, "A", "2025-04-10T10:00:00Z", Direction::In),
            punch(5, "A", "2025-04-10T18:00:00Z", Direction::Out),
        ]);
        let record = &reducer.records()[0];
        assert_eq!(record.time_in, NaiveTime::from_hms_opt(8, 40, 0));
        assert_eq!(record.time_out, NaiveTime::from_hms_opt(18, 0, 0));
    }

    #[test]
    fn roster_may_arrive_after_punches() {
        let mut reducer = reducer();
        reducer.add_batch(&[
            punch(1, "A", "2025-04-10T09:00:00Z", Direction::In),
            punch(2, "A", "2025-04-10T17:00:00Z", Direction::Out),
        ]);
        assert!(reducer.records().is_empty());

        reducer.set_roster(vec![member("A", "Ana"), member("B", "Ben")]);

        let statuses: Vec<_> = reducer
            .records()
            .iter()
            .map(|r| (r.employee_id.as_str(), r.status))
            .collect();
        assert_eq!(statuses, vec![("A", Status::OnTime), ("B", Status::Absent)]);
    }

    #[test]
    fn incremental_matches_one_shot_aggregation() {
        let roster = vec![member("10", "Ten"), member("9", "Nine"), member("7", "Seven")];
        let all = vec![
            punch(1, "9", "2025-04-11T08:59:00Z", Direction::In),
            punch(2, "10", "2025-04-10T09:01:00Z", Direction::In),
            punch(3, "9", "2025-04-11T17:00:00Z", Direction::Out),
            punch(4, "10", "2025-04-10T17:00:00Z", Direction::Out),
            punch(5, "7", "2025-04-11T17:00:00Z", Direction::Out),
            punch(6, "X", "2025-04-12T08:00:00Z", Direction::In),
        ];

        let mut reducer = reducer();
        reducer.set_roster(roster.clone());
        for chunk in all.chunks(2) {
            reducer.add_batch(chunk);
        }

        let window = Window {
            start: "2025-01-01T00:00:00Z".parse().unwrap(),
            end: "2026-01-01T00:00:00Z".parse().unwrap(),
        };
        let expected = Aggregator::new(Utc, DEFAULT_THRESHOLD_MINUTES).aggregate(&all, &Roster::new(roster), &window);

        assert_eq!(reducer.records(), expected.as_slice());
        assert_eq!(reducer.records().len(), 9);
    }

    #[test]
    fn undecodable_frame_keeps_prior_state() {
        let mut reducer = reducer();
        let payload = Payload {
            timestamp: 7,
            device_details: DeviceSnapshot::default(),
            users: vec![member("A", "Ana")],
            logs: vec![
                punch(1, "A", "2025-04-10T08:00:00Z", Direction::In),
                punch(2, "A", "2025-04-10T17:00:00Z", Direction::Out),
            ],
        };
        reducer.apply(&codec::encode_binary(&payload).unwrap()).unwrap();
        let before = reducer.records().to_vec();

        assert!(reducer.apply(b"\xc1\xc1").is_err());

        assert_eq!(reducer.records(), before.as_slice());
        assert_eq!(reducer.last_updated(), Some(7));
    }

    #[test]
    fn json_frames_are_accepted() {
        let mut reducer = reducer();
        let payload = Payload {
            timestamp: 9,
            device_details: DeviceSnapshot::default(),
            users: vec![member("A", "Ana")],
            logs: vec![punch(1, "A", "2025-04-10T08:00:00Z", Direction::In)],
        };
        let text = codec::encode_text(&payload).unwrap();

        reducer.apply(text.as_bytes()).unwrap();

        assert_eq!(reducer.records().len(), 1);
        assert_eq!(reducer.last_updated(), Some(9));
    }

    #[test]
    fn pruning_drops_old_days() {
        let mut reducer = reducer();
        reducer.set_roster(vec![member("A", "Ana")]);
        reducer.add_batch(&[
            punch(1, "A", "2025-03-01T08:00:00Z", Direction::In),
            punch(2, "A", "2025-04-10T08:00:00Z", Direction::In),
        ]);
        assert_eq!(reducer.records().len(), 2);

        reducer.prune_before(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());

        assert_eq!(reducer.records().len(), 1);
        assert_eq!(reducer.records()[0].date, NaiveDate::from_ymd_opt(2025, 4, 10).unwrap());
    }

    #[test]
    fn retention_prunes_relative_to_payload_time() {
        let mut reducer = reducer().with_retention(Some(30));
        let at = |raw: &str| raw.parse::<DateTime<Utc>>().unwrap().timestamp_millis();
        let payload = |timestamp, logs| Payload {
            timestamp,
            device_details: DeviceSnapshot::default(),
            users: vec![member("A", "Ana")],
            logs,
        };

        let first = payload(
            at("2025-03-05T12:00:00Z"),
            vec![
                punch(1, "A", "2025-03-01T08:00:00Z", Direction::In),
                punch(2, "A", "2025-03-01T17:00:00Z", Direction::Out),
            ],
        );
        reducer.apply(&codec::encode_binary(&first).unwrap()).unwrap();
        assert_eq!(reducer.records().len(), 1);

        // 2025-04-10 minus 30 days is 2025-03-11, so March 1st ages out.
        let second = payload(
            at("2025-04-10T12:00:00Z"),
            vec![punch(3, "A", "2025-04-10T08:00:00Z", Direction::In)],
        );
        reducer.apply(&codec::encode_binary(&second).unwrap()).unwrap();

        let dates: Vec<_> = reducer.records().iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2025-04-10"]);
    }

    #[test]
    fn record_view_replaces_wholesale() {
        let mut view = RecordView::new();
        assert!(view.records().is_empty());

        let payload = Payload::<DayRecord> {
            timestamp: 3,
            device_details: DeviceSnapshot::default(),
            users: vec![],
            logs: vec![],
        };
        view.apply(&codec::encode_binary(&payload).unwrap()).unwrap();
        assert_eq!(view.last_updated(), Some(3));
        assert!(view.apply(b"not a payload").is_err());
        assert_eq!(view.last_updated(), Some(3));
    }
}
