use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Rate gate for periodic maintenance work. [`due`] answers true at most
/// once per interval; the first call after construction is always due.
///
/// [`due`]: Throttle::due
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn due(&self) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(at) if at.elapsed() < self.interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}
