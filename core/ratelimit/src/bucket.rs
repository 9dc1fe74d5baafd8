//! Token-bucket state machine.
//!
//! The bucket holds a continuous token count. `refill` adds tokens for the
//! time elapsed since the previous refill; `try_consume` removes tokens if
//! enough are available. Nothing else changes the count.

use serde::{Deserialize, Serialize};

/// How elapsed time turns into tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefillMode {
    /// Add `floor(elapsed * rate)` tokens and restart the clock.
    ///
    /// Fractional tokens are dropped at every refill, so frequent callers
    /// see a slightly lower effective rate. The error is bounded by one
    /// token per refill.
    #[default]
    Truncate,
    /// Add `elapsed * rate` tokens and keep the fraction.
    Accumulate,
}

/// Token bucket counters.
///
/// Invariants: `0 <= tokens <= bucket_size`, and `last_refill` never moves
/// backwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    bucket_size: u32,
    refill_rate: f64,
    tokens: f64,
    last_refill: i64,
    mode: RefillMode,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(bucket_size: u32, refill_rate: f64, now: i64) -> Self {
        Self {
            bucket_size,
            refill_rate,
            tokens: f64::from(bucket_size),
            last_refill: now,
            mode: RefillMode::default(),
        }
    }

    /// Set the refill mode.
    pub fn with_mode(mut self, mode: RefillMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add tokens for the time elapsed since the last refill.
    ///
    /// A clock that went backwards adds nothing.
    pub fn refill(&mut self, now: i64) {
        if now <= self.last_refill {
            return;
        }

        let elapsed_secs = (now - self.last_refill) as f64 / 1000.0;
        let earned = match self.mode {
            RefillMode::Truncate => (elapsed_secs * self.refill_rate).floor(),
            RefillMode::Accumulate => elapsed_secs * self.refill_rate,
        };

        self.tokens = (self.tokens + earned).min(f64::from(self.bucket_size));
        self.last_refill = now;
    }

    /// Refill, then take `n` tokens if that many are available.
    ///
    /// A rejected request changes nothing but the refill.
    pub fn try_consume(&mut self, n: u32, now: i64) -> bool {
        self.refill(now);

        let requested = f64::from(n);
        if self.tokens >= requested {
            self.tokens -= requested;
            true
        } else {
            false
        }
    }

    /// Change capacity and rate, clamping the current count to the new capacity.
    pub fn reconfigure(&mut self, bucket_size: u32, refill_rate: f64) {
        self.bucket_size = bucket_size;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(f64::from(bucket_size));
    }

    /// Fill to capacity.
    pub fn fill(&mut self, now: i64) {
        self.tokens = f64::from(self.bucket_size);
        self.last_refill = self.last_refill.max(now);
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Capacity.
    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Time of the last refill in epoch milliseconds.
    pub fn last_refill(&self) -> i64 {
        self.last_refill
    }

    /// Current refill mode.
    pub fn mode(&self) -> RefillMode {
        self.mode
    }
}
