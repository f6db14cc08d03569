use crate::model::{DayRecord, Direction, PunchEvent, Roster, Status};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// 09:00, in minutes past midnight.
pub const DEFAULT_THRESHOLD_MINUTES: u32 = 9 * 60;

/// Half-open range `[start, end)` of punch times considered by a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// January 1st of `now`'s year (local midnight) up to `now`. With a
    /// retention horizon the start moves forward to `today - retention_days`.
    pub fn year_to_date<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz, retention_days: Option<u32>) -> Self {
        let local_today = now.with_timezone(tz).date_naive();
        let mut start_date = NaiveDate::from_ymd_opt(local_today.year(), 1, 1).unwrap_or(local_today);
        if let Some(days) = retention_days {
            let horizon = local_today - Duration::days(i64::from(days));
            start_date = start_date.max(horizon);
        }

        let start = tz
            .from_local_datetime(&start_date.and_time(NaiveTime::MIN))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(now);

        Self { start, end: now }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Local calendar date of the window start; buckets before it are stale.
    pub fn start_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        self.start.with_timezone(tz).date_naive()
    }
}

#[derive(Debug, Clone, Default)]
struct Bucket {
    name: Option<String>,
    time_in: Option<NaiveTime>,
    time_out: Option<NaiveTime>,
}

/// Running per-(employee, date) min time-in / max time-out map.
///
/// Holds punches for every employee it is fed; roster membership is only
/// applied when records are produced, so the roster can arrive before or
/// after the punches.
#[derive(Debug, Clone, Default)]
pub struct DayBuckets {
    buckets: BTreeMap<(String, NaiveDate), Bucket>,
    dates: BTreeSet<NaiveDate>,
}

impl DayBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one punch in. Order of arrival does not matter.
    pub fn record<Tz: TimeZone>(&mut self, punch: &PunchEvent, tz: &Tz) {
        let local = punch.record_time.with_timezone(tz).naive_local();
        let (date, time) = (local.date(), local.time());
        self.dates.insert(date);

        let bucket = self
            .buckets
            .entry((punch.employee_id.clone(), date))
            .or_default();
        if bucket.name.is_none() && !punch.name.is_empty() {
            bucket.name = Some(punch.name.clone());
        }
        match punch.direction() {
            Direction::In => {
                bucket.time_in = Some(bucket.time_in.map_or(time, |seen| seen.min(time)));
            }
            Direction::Out => {
                bucket.time_out = Some(bucket.time_out.map_or(time, |seen| seen.max(time)));
            }
        }
    }

    /// Registers a date without a punch for any roster member, so everyone
    /// gets an explicit absent record for it.
    pub fn note_date(&mut self, date: NaiveDate) {
        self.dates.insert(date);
    }

    /// Drops everything dated before `horizon`.
    pub fn prune_before(&mut self, horizon: NaiveDate) {
        self.buckets.retain(|(_, date), _| *date >= horizon);
        self.dates.retain(|date| *date >= horizon);
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    /// One record per roster member per known date, sorted with
    /// [`record_order`].
    pub fn to_records(&self, roster: &Roster, threshold_minutes: u32) -> Vec<DayRecord> {
        let mut records = Vec::with_capacity(roster.len() * self.dates.len());
        for date in &self.dates {
            for member in roster.entries() {
                let bucket = self.buckets.get(&(member.user_id.clone(), *date));
                let (time_in, time_out) = bucket
                    .map(|b| (b.time_in, b.time_out))
                    .unwrap_or((None, None));
                let name = if member.name.is_empty() {
                    bucket.and_then(|b| b.name.clone()).unwrap_or_default()
                } else {
                    member.name.clone()
                };

                records.push(DayRecord {
                    employee_id: member.user_id.clone(),
                    name,
                    date: *date,
                    day_of_week: weekday_name(date.weekday()).to_string(),
                    time_in,
                    time_out,
                    status: Status::classify(time_in, time_out, threshold_minutes),
                });
            }
        }
        records.sort_by(record_order);
        records
    }
}

/// Newest date first, then employee id by plain string comparison.
pub fn record_order(a: &DayRecord, b: &DayRecord) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.employee_id.cmp(&b.employee_id))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Turns a raw punch batch plus the roster into day records.
///
/// Pure and synchronous: the only clock it sees is the window passed in.
#[derive(Debug, Clone)]
pub struct Aggregator<Tz: TimeZone = Local> {
    tz: Tz,
    threshold_minutes: u32,
}

impl Aggregator<Local> {
    pub fn local(threshold_minutes: u32) -> Self {
        Self::new(Local, threshold_minutes)
    }
}

impl<Tz: TimeZone> Aggregator<Tz> {
    pub fn new(tz: Tz, threshold_minutes: u32) -> Self {
        Self {
            tz,
            threshold_minutes,
        }
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn threshold_minutes(&self) -> u32 {
        self.threshold_minutes
    }

    pub fn aggregate(&self, events: &[PunchEvent], roster: &Roster, window: &Window) -> Vec<DayRecord> {
        let mut buckets = DayBuckets::new();
        for punch in events.iter().filter(|p| window.contains(p.record_time)) {
            if roster.contains(&punch.employee_id) {
                buckets.record(punch, &self.tz);
            } else {
                buckets.note_date(punch.record_time.with_timezone(&self.tz).date_naive());
            }
        }
        buckets.to_records(roster, self.threshold_minutes)
    }
}
