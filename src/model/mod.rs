pub mod day_record;
pub mod device;
pub mod payload;
pub mod punch;
pub mod roster;

pub use day_record::{DayRecord, Status};
pub use device::DeviceSnapshot;
pub use payload::Payload;
pub use punch::{Direction, PunchEvent};
pub use roster::{Roster, RosterEntry};
