//! Server time and the monotonic `published_at` clock.
//!
//! §3 requires `published_at` to be strictly increasing within a channel
//! in publish-acceptance order. Wall-clock milliseconds alone can repeat
//! under load, so publishing draws from one process-wide clock that never
//! goes backwards and never repeats a value.

use std::sync::atomic::{AtomicI64, Ordering};

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct MonotonicClock {
    last: AtomicI64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a value strictly greater than every value previously
    /// returned by this clock.
    pub fn next(&self) -> i64 {
        let now = now_millis();
        loop {
            let last = self.last.load(Ordering::SeqCst);
            let candidate = if now > last { now } else { last + 1 };
            if self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_is_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut last = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }
}
