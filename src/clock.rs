// src/clock.rs
use chrono::{DateTime, Utc};

/// Injectable time source so cycle boundaries and retry schedules are
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[test]
    fn fixed_clock_is_frozen() {
        let instant = Utc.with_ymd_and_hms(2026, 7, 4, 9, 30, 0).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(instant));
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), instant);
    }
}
