//! Request budget: at most N requests per sliding time window.
//!
//! Blocking, like the rest of the collection path. Callers invoke
//! [`RequestBudget::acquire`] before each outbound request.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window request limiter.
#[derive(Debug)]
pub struct RequestBudget {
    max_requests: usize,
    per: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RequestBudget {
    /// Allow `max_requests` requests in any window of length `per`.
    ///
    /// A zero `max_requests` is treated as one.
    pub fn new(max_requests: u32, per: Duration) -> Self {
        let max_requests = (max_requests as usize).max(1);
        Self {
            max_requests,
            per,
            sent: Mutex::new(VecDeque::with_capacity(max_requests.min(64))),
        }
    }

    /// No pacing at all (tests, local fakes).
    pub fn unlimited() -> Self {
        Self::new(u32::MAX, Duration::ZERO)
    }

    /// How long a request issued at `now` would have to wait.
    ///
    /// Drops timestamps that have left the window as a side effect.
    fn wait_at(&self, sent: &mut VecDeque<Instant>, now: Instant) -> Option<Duration> {
        while let Some(&oldest) = sent.front() {
            if now.duration_since(oldest) >= self.per {
                sent.pop_front();
            } else {
                break;
            }
        }
        if sent.len() < self.max_requests {
            return None;
        }
        sent.front()
            .map(|&oldest| self.per.saturating_sub(now.duration_since(oldest)))
    }

    /// Block until a request fits the budget, then record it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut sent = self.sent.lock();
                let now = Instant::now();
                match self.wait_at(&mut sent, now) {
                    None => {
                        if !self.per.is_zero() {
                            sent.push_back(now);
                        }
                        return;
                    }
                    Some(wait) => wait,
                }
            };
            log::trace!("request budget exhausted, waiting {wait:?}");
            std::thread::sleep(wait);
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn per(&self) -> Duration {
        self.per
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_waits() {
        let budget = RequestBudget::unlimited();
        let start = Instant::now();
        for _ in 0..1000 {
            budget.acquire();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_requests_means_one() {
        let budget = RequestBudget::new(0, Duration::from_secs(1));
        assert_eq!(budget.max_requests(), 1);
    }

    #[test]
    fn requests_within_budget_do_not_wait() {
        let budget = RequestBudget::new(3, Duration::from_secs(60));
        let start = Instant::now();
        budget.acquire();
        budget.acquire();
        budget.acquire();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn request_over_budget_waits_for_window() {
        let budget = RequestBudget::new(2, Duration::from_millis(100));
        let start = Instant::now();
        budget.acquire();
        budget.acquire();
        budget.acquire();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn wait_shrinks_as_window_slides() {
        let budget = RequestBudget::new(1, Duration::from_secs(10));
        let t0 = Instant::now();
        let mut sent = VecDeque::from([t0]);
        let wait = budget.wait_at(&mut sent, t0 + Duration::from_secs(4)).unwrap();
        assert_eq!(wait, Duration::from_secs(6));
        assert!(budget.wait_at(&mut sent, t0 + Duration::from_secs(10)).is_none());
        assert!(sent.is_empty());
    }
}
