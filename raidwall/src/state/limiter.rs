// raidwall/src/state/limiter.rs
//
// Token-bucket burst limiter.
//
//   capacity  `burst` tokens, bucket starts full
//   refill    continuous, one token per `limit` interval
//   allow()   consumes one token if available; on exhaustion nothing changes
//
// `set_limit` / `set_burst` reconfigure a live bucket. Tokens accrued under the
// old parameters are kept (clamped to a lowered capacity), so re-reading
// settings mid-incident never resets the limiter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Bucket {
    limit:  Duration,
    burst:  u32,
    tokens: f64,
    last:   Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if now <= self.last { return; }
        let cap = f64::from(self.burst);
        if self.limit.is_zero() {
            self.tokens = cap;
        } else {
            let gained = (now - self.last).as_secs_f64() / self.limit.as_secs_f64();
            self.tokens = (self.tokens + gained).min(cap);
        }
        self.last = now;
    }
}

#[derive(Debug)]
pub struct BurstLimiter {
    bucket: Mutex<Bucket>,
}

impl BurstLimiter {
    pub fn new(limit: Duration, burst: u32) -> Self {
        Self::new_at(limit, burst, Instant::now())
    }

    pub fn new_at(limit: Duration, burst: u32, now: Instant) -> Self {
        Self {
            bucket: Mutex::new(Bucket { limit, burst, tokens: f64::from(burst), last: now }),
        }
    }

    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub fn allow_at(&self, now: Instant) -> bool {
        let mut b = self.bucket.lock();
        b.refill(now);
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn set_limit(&self, limit: Duration) {
        self.set_limit_at(limit, Instant::now());
    }

    /// Settles refill under the old interval up to `now`, then switches.
    pub fn set_limit_at(&self, limit: Duration, now: Instant) {
        let mut b = self.bucket.lock();
        b.refill(now);
        b.limit = limit;
    }

    pub fn set_burst(&self, burst: u32) {
        self.set_burst_at(burst, Instant::now());
    }

    pub fn set_burst_at(&self, burst: u32, now: Instant) {
        let mut b = self.bucket.lock();
        b.refill(now);
        b.burst  = burst;
        b.tokens = b.tokens.min(f64::from(burst));
    }

    pub fn limit(&self) -> Duration { self.bucket.lock().limit }
    pub fn burst(&self) -> u32 { self.bucket.lock().burst }

    /// Tokens available at `now`, fractional part included.
    #[cfg(test)]
    pub fn tokens_at(&self, now: Instant) -> f64 {
        let mut b = self.bucket.lock();
        b.refill(now);
        b.tokens
    }
}
