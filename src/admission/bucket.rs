//! Token bucket implementation.

use parking_lot::Mutex;

/// A bounded token counter granting permission to proceed while units
/// remain.
///
/// This is a discretized bucket: the owning registry adds exactly one token
/// per fixed tick rather than accumulating at a continuous rate, so the
/// granularity error is bounded by one tick. At `capacity` tokens per
/// second the tick interval is `1/capacity` seconds.
pub struct TokenBucket {
    /// Maximum burst size, fixed at construction
    capacity: u32,
    /// Tokens currently available, always in `[0, capacity]`
    available: Mutex<u32>,
}

impl TokenBucket {
    /// Create a bucket pre-filled to capacity.
    pub fn new(capacity: u32) -> Self {
        debug_assert!(capacity > 0, "bucket capacity must be positive");
        Self {
            capacity,
            available: Mutex::new(capacity),
        }
    }

    /// Take one token if any is available.
    ///
    /// Returns `true` if a unit was taken. Never blocks beyond the counter
    /// lock; a denied consume leaves the bucket unchanged.
    pub fn try_consume(&self) -> bool {
        let mut available = self.available.lock();
        if *available > 0 {
            *available -= 1;
            true
        } else {
            false
        }
    }

    /// Add one token, clamped at capacity.
    ///
    /// Called only by the registry's periodic refill pass, never by
    /// request-handling code.
    pub fn refill_one(&self) {
        let mut available = self.available.lock();
        if *available < self.capacity {
            *available += 1;
        }
    }

    /// Tokens currently available.
    pub fn available(&self) -> u32 {
        *self.available.lock()
    }

    /// The bucket's fixed capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
