use crate::model::{DeviceSnapshot, RosterEntry};
use serde::{Deserialize, Serialize};

/// The message published every cycle and replayed to late joiners.
///
/// `L` is [`crate::model::DayRecord`] when the server aggregates, or
/// [`crate::model::PunchEvent`] when receivers reduce raw batches themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload<L> {
    /// Epoch milliseconds at generation.
    pub timestamp: i64,
    pub device_details: DeviceSnapshot,
    pub users: Vec<RosterEntry>,
    pub logs: Vec<L>,
}
