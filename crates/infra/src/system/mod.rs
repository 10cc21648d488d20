use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

// Mocking out time so that it is possible to run tests that depend on time.
pub trait ISys: Send + Sync {
    /// The current timestamp in millis
    fn get_timestamp_millis(&self) -> i64;
}

/// System that gets the real time and is used when not testing
pub struct RealSys {}
impl ISys for RealSys {
    fn get_timestamp_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
pub struct ManualSys {
    now: AtomicI64,
}

impl ManualSys {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl ISys for ManualSys {
    fn get_timestamp_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_told() {
        // 2021-06-01T12:00:00Z
        let sys = ManualSys::new(1622548800000);
        assert_eq!(sys.get_timestamp_millis(), 1622548800000);
        sys.advance(1000 * 60 * 60);
        assert_eq!(sys.get_timestamp_millis(), 1622552400000);
        sys.set(5);
        assert_eq!(sys.get_timestamp_millis(), 5);
    }
}
