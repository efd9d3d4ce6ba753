mod clock;
mod queue;

pub use clock::{Clock, ClockDriver, DEFAULT_TICK_PERIOD, IntervalClock, ManualClock, manual_clock};
pub use queue::{EventQueue, ScheduledEntry};
