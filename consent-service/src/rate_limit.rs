use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

struct Window {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Per-patient issuance rate limiter over a rolling 24-hour window.
///
/// Explicitly owned, lockable state rather than ambient globals, so a
/// multi-instance deployment can swap it for a shared store. The concurrent
/// map's entry lock makes check-and-increment atomic per patient.
pub struct IssuanceRateLimiter {
    windows: DashMap<Uuid, Window>,
    max_requests: u32,
    window: Duration,
}

impl IssuanceRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Count one request against the patient. Returns the in-window request
    /// number, or `Err(current_count)` when the window is full: the caller
    /// rejects, never queues.
    pub fn check_and_increment(&self, patient_id: Uuid) -> Result<u32, u32> {
        self.check_at(patient_id, Utc::now())
    }

    fn check_at(&self, patient_id: Uuid, now: DateTime<Utc>) -> Result<u32, u32> {
        let mut entry = self.windows.entry(patient_id).or_insert(Window {
            count: 0,
            window_start: now,
        });

        if now - entry.window_start >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.max_requests {
            return Err(entry.count);
        }

        entry.count += 1;
        Ok(entry.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAX_REQUESTS_PER_WINDOW;

    fn limiter() -> IssuanceRateLimiter {
        IssuanceRateLimiter::new(MAX_REQUESTS_PER_WINDOW, Duration::hours(24))
    }

    #[test]
    fn fourth_request_in_window_is_rejected() {
        let limiter = limiter();
        let patient = Uuid::new_v4();
        let now = Utc::now();

        assert_eq!(limiter.check_at(patient, now), Ok(1));
        assert_eq!(limiter.check_at(patient, now), Ok(2));
        assert_eq!(limiter.check_at(patient, now), Ok(3));
        assert_eq!(limiter.check_at(patient, now), Err(3));
    }

    #[test]
    fn window_reset_allows_new_requests() {
        let limiter = limiter();
        let patient = Uuid::new_v4();
        let now = Utc::now();

        for _ in 0..3 {
            limiter.check_at(patient, now).unwrap();
        }
        assert!(limiter.check_at(patient, now).is_err());

        // Fifth request after the window rolls over succeeds
        let later = now + Duration::hours(25);
        assert_eq!(limiter.check_at(patient, later), Ok(1));
    }

    #[test]
    fn patients_are_limited_independently() {
        let limiter = limiter();
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        for _ in 0..3 {
            limiter.check_at(a, now).unwrap();
        }
        assert!(limiter.check_at(a, now).is_err());
        assert_eq!(limiter.check_at(b, now), Ok(1));
    }

    #[test]
    fn concurrent_increments_do_not_lose_updates() {
        use std::sync::Arc;
        let limiter = Arc::new(IssuanceRateLimiter::new(1000, Duration::hours(24)));
        let patient = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let _ = limiter.check_and_increment(patient);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let count = limiter.windows.get(&patient).unwrap().count;
        assert_eq!(count, 800);
    }
}
