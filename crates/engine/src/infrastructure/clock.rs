//! Wall-clock time for record timestamps.

use chrono::{DateTime, Utc};

use crate::infrastructure::ports::ClockPort;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use test_clocks::{FixedClock, SteppingClock};

#[cfg(test)]
mod test_clocks {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Duration, Utc};

    use crate::infrastructure::ports::ClockPort;

    /// Always reports the same instant.
    pub struct FixedClock(pub DateTime<Utc>);

    impl ClockPort for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// Advances one second per reading so ordering by timestamp is strict.
    pub struct SteppingClock {
        start: DateTime<Utc>,
        readings: AtomicI64,
    }

    impl SteppingClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                start,
                readings: AtomicI64::new(0),
            }
        }
    }

    impl ClockPort for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let n = self.readings.fetch_add(1, Ordering::SeqCst);
            self.start + Duration::seconds(n)
        }
    }
}
