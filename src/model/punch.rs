use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way an employee passed the terminal, read from its numeric state
/// code: `0` clocks in, anything else clocks out.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl From<u8> for Direction {
    fn from(code: u8) -> Self {
        match code {
            0 => Direction::In,
            _ => Direction::Out,
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::In => 0,
            Direction::Out => 1,
        }
    }
}

/// A single clock in/out action read from the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchEvent {
    /// Terminal-assigned serial, unique per punch.
    pub sn: u32,
    pub employee_id: String,
    pub name: String,
    pub record_time: DateTime<Utc>,
    /// Raw state code as the terminal reported it.
    pub state: u8,
    /// Verification method reported by the terminal (finger, face, card...).
    #[serde(rename = "type", default)]
    pub verify_type: u8,
    #[serde(default)]
    pub device_id: String,
}

impl PunchEvent {
    pub fn direction(&self) -> Direction {
        Direction::from(self.state)
    }
}
