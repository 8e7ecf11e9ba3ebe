use std::time::Instant;

use tokio::sync::Mutex;

/// A lazily-refilled token bucket, per spec §4.7: `capacity` plus
/// `refill_per_second`, with refill computed on `try_acquire` based on
/// wall time elapsed since the last refill — grounded on
/// `toka-rate-limiter::algorithms::TokenBucketState`, simplified to a
/// single in-process counter (no external storage backend, since a
/// subscriber connection never survives a process restart anyway).
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_second: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Construct a bucket starting full, per the usual token-bucket
    /// convention (a fresh connection should not be immediately
    /// rate-limited).
    pub fn new(capacity: u64, refill_per_second: f64) -> Self {
        Self {
            state: Mutex::new(BucketState { tokens: capacity as f64, last_refill: Instant::now() }),
            capacity: capacity as f64,
            refill_per_second,
        }
    }

    /// Refill based on elapsed time, then attempt to consume one token.
    /// Returns whether a token was available.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
