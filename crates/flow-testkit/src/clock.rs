//! A fake, manually-advanced clock for tests that need deterministic
//! `DateTime<Utc>` values (e.g. trailing-stop cooldown checks, lease
//! staleness) without sleeping real time.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut guard = self.now.lock().unwrap();
        *guard += by;
        *guard
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::starting_at(DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_moves_now_forward() {
        let clock = FakeClock::default();
        let start = clock.now();
        let advanced = clock.advance(Duration::seconds(30));
        assert_eq!(advanced, start + Duration::seconds(30));
        assert_eq!(clock.now(), advanced);
    }
}
