use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// How often idle buckets are swept out of the map.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct SubmissionBucket {
    tokens: f64,
    refilled_at: Instant,
}

impl SubmissionBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            refilled_at: now,
        }
    }

    fn refill(&mut self, policy: &QuotaPolicy, now: Instant) {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed / policy.secs_per_token).min(policy.capacity);
        self.refilled_at = now;
    }

    /// Takes one submission, or reports how long until one is available.
    fn charge(&mut self, policy: &QuotaPolicy, now: Instant) -> Result<(), Duration> {
        self.refill(policy, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        Err(Duration::from_secs_f64((1.0 - self.tokens) * policy.secs_per_token))
    }

    /// A bucket that would be full by `now` carries no state worth keeping.
    fn is_idle(&self, policy: &QuotaPolicy, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens + elapsed / policy.secs_per_token >= policy.capacity
    }
}

#[derive(Debug, Clone, Copy)]
struct QuotaPolicy {
    capacity: f64,
    secs_per_token: f64,
}

/// Per-user allowance of judge submissions.
///
/// Only code that will actually be sent to the judge is charged; locally rejected code
/// never touches the quota.
#[derive(Clone)]
pub struct SubmissionQuota {
    buckets: Arc<DashMap<String, SubmissionBucket>>,
    policy: QuotaPolicy,
    last_sweep: Arc<Mutex<Instant>>,
}

impl SubmissionQuota {
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            policy: QuotaPolicy {
                capacity: burst.max(1) as f64,
                secs_per_token: 60.0 / per_minute.max(1) as f64,
            },
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Charges one submission to `user_id`. `Err` carries the wait until the next one.
    pub fn charge(&self, user_id: &str) -> Result<(), Duration> {
        self.charge_at(user_id, Instant::now())
    }

    fn charge_at(&self, user_id: &str, now: Instant) -> Result<(), Duration> {
        self.sweep_if_due(now);
        let policy = self.policy;
        let mut bucket = self
            .buckets
            .entry(user_id.to_string())
            .or_insert_with(|| SubmissionBucket::full(policy.capacity, now));
        bucket.charge(&policy, now)
    }

    fn sweep_if_due(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
                return;
            }
            *last = now;
        }
        let policy = self.policy;
        self.buckets.retain(|_, bucket| !bucket.is_idle(&policy, now));
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.buckets.len()
    }
}
