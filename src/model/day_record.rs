use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
pub enum Status {
    Early,
    #[serde(rename = "On Time")]
    #[strum(serialize = "On Time")]
    OnTime,
    Late,
    Absent,
}

impl Status {
    /// Classifies a day from its earliest "in" and latest "out" punch.
    ///
    /// Only the time-in is compared against the threshold; time-out matters
    /// solely for presence.
    pub fn classify(
        time_in: Option<NaiveTime>,
        time_out: Option<NaiveTime>,
        threshold_minutes: u32,
    ) -> Self {
        match (time_in, time_out) {
            (Some(time_in), Some(_)) => {
                let minutes = minutes_past_midnight(time_in);
                if minutes < threshold_minutes {
                    Status::Early
                } else if minutes == threshold_minutes {
                    Status::OnTime
                } else {
                    Status::Late
                }
            }
            _ => Status::Absent,
        }
    }
}

pub fn minutes_past_midnight(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

/// Aggregated attendance for one employee on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub employee_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub day_of_week: String,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
    pub status: Status,
}
