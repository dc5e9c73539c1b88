//! Keyed limiter registry: one token bucket per observed key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::bucket::TokenBucket;
use super::RequestIdentity;

/// Pluggable key extraction: maps a request identity to the string key a
/// registry tracks independently, or `None` when the registry does not
/// apply to the request.
pub type KeyFn = Arc<dyn Fn(&RequestIdentity) -> Option<String> + Send + Sync>;

/// A dynamically growing collection of token buckets, one per observed key.
///
/// Buckets are created lazily on first use, pre-filled to capacity, and
/// live for the process lifetime. Keys are never evicted: cardinality is
/// bounded by the population of client IPs and user ids, which is the
/// documented operational assumption; `bucket_count` exposes the current
/// size for monitoring.
///
/// Refill is a single shared ticker per registry. One background task ticks
/// every `1/capacity` seconds and adds one token to every bucket in one
/// pass, so the per-key admitted rate is `capacity` per second without a
/// timer per key.
pub struct KeyedLimiterRegistry {
    /// Registry name, used in denial signals and logs
    name: &'static str,
    /// Capacity applied to every bucket this registry creates
    capacity_per_key: u32,
    /// Key extraction rule
    key_fn: KeyFn,
    /// Buckets indexed by key. The coarse map lock also serializes bucket
    /// creation with the first consume for a brand-new key.
    buckets: RwLock<HashMap<String, Arc<TokenBucket>>>,
    /// Whether the refill ticker has been spawned
    ticker_started: AtomicBool,
}

impl KeyedLimiterRegistry {
    /// Create a registry with the given key extraction rule.
    pub fn new(name: &'static str, capacity_per_key: u32, key_fn: KeyFn) -> Self {
        Self {
            name,
            capacity_per_key,
            key_fn,
            buckets: RwLock::new(HashMap::new()),
            ticker_started: AtomicBool::new(false),
        }
    }

    /// Registry keyed by the client IP address.
    pub fn ip_keyed(capacity_per_key: u32) -> Self {
        Self::new(
            "ip",
            capacity_per_key,
            Arc::new(|identity: &RequestIdentity| identity.peer.map(|ip| ip.to_string())),
        )
    }

    /// Registry keyed by the target user id from the request path.
    pub fn user_keyed(capacity_per_key: u32) -> Self {
        Self::new(
            "user",
            capacity_per_key,
            Arc::new(|identity: &RequestIdentity| identity.user.clone()),
        )
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decide whether to admit a single request.
    ///
    /// Derives the key, lazily creating its bucket on first use, then takes
    /// one token. Returns `false` when the key's bucket is empty. A key
    /// function returning `None` admits without consuming anything.
    ///
    /// Creation and the initial consume for a brand-new key happen under
    /// the map's write lock, so concurrent first use creates exactly one
    /// bucket and no admission decision is lost or duplicated. Steady-state
    /// admission takes only the read lock plus the per-bucket mutex.
    pub fn admit(&self, identity: &RequestIdentity) -> bool {
        let key = match (self.key_fn)(identity) {
            Some(key) => key,
            None => return true,
        };

        trace!(limiter = self.name, key = %key, "Checking admission");

        if let Some(bucket) = self.buckets.read().get(&key) {
            let admitted = bucket.try_consume();
            if !admitted {
                debug!(limiter = self.name, key = %key, "Admission denied");
            }
            return admitted;
        }

        // First use of this key: create-and-consume under the write lock.
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            debug!(
                limiter = self.name,
                key = %key,
                capacity = self.capacity_per_key,
                "Creating new token bucket"
            );
            Arc::new(TokenBucket::new(self.capacity_per_key))
        });

        bucket.try_consume()
    }

    /// Add one token to every bucket.
    ///
    /// Driven by the ticker spawned in [`start`](Self::start); exposed so
    /// tests can advance refill deterministically.
    pub fn refill_pass(&self) {
        let buckets = self.buckets.read();
        for bucket in buckets.values() {
            bucket.refill_one();
        }
    }

    /// Spawn the shared refill ticker for this registry.
    ///
    /// Idempotent. The task holds only a weak reference and exits once the
    /// registry is dropped. Must be called from within a tokio runtime.
    pub fn start(self: Arc<Self>) {
        if self.ticker_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let tick = Duration::from_secs(1) / self.capacity_per_key;
        let weak: Weak<Self> = Arc::downgrade(&self);

        debug!(limiter = self.name, tick = ?tick, "Starting refill ticker");

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + tick;
            let mut interval = tokio::time::interval_at(start, tick);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(registry) => registry.refill_pass(),
                    None => break,
                }
            }
        });
    }

    /// Number of keys with a live bucket.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Tokens currently available for a key, if its bucket exists.
    pub fn available_for(&self, key: &str) -> Option<u32> {
        self.buckets.read().get(key).map(|b| b.available())
    }
}
