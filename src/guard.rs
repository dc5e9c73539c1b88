//! Repeated-failure guard for transfer creation.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::config::GuardConfig;
use crate::error::{LedgerError, Result};
use crate::store::{Direction, LedgerStore, Transfer};

/// Denies a sender's transfers after too many failed attempts in a rolling
/// time window.
///
/// The guard keeps no state of its own: every check reads the initiating
/// user's outgoing transfer history fresh from the ledger store and counts
/// the failures recorded within the window. It only counts past failures;
/// classification of an attempt as failed happens in the store at
/// execution time.
pub struct RepeatedFailureGuard {
    /// Rolling lookback window
    window: Duration,
    /// Failed-transfer count that triggers denial
    threshold: u32,
}

impl RepeatedFailureGuard {
    /// Guard with an explicit window and threshold.
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self { window, threshold }
    }

    /// Guard configured from the service configuration.
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            Duration::seconds(config.window_secs as i64),
            config.failure_threshold,
        )
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Allow or deny a transfer attempt by `user_id`.
    ///
    /// Returns `Err(RepeatedFailureLimit)` once the user's recent failures
    /// reach the threshold; the denial carries no further artifact.
    pub async fn check(&self, store: &dyn LedgerStore, user_id: i64) -> Result<()> {
        let history = store.get_transfers(user_id, Direction::Outgoing).await?;
        let failures = count_recent_failures(&history, Utc::now(), self.window);

        if failures >= self.threshold {
            warn!(
                user_id = user_id,
                failures = failures,
                threshold = self.threshold,
                "Repeated-failure limit reached"
            );
            return Err(LedgerError::RepeatedFailureLimit {
                threshold: self.threshold,
            });
        }

        Ok(())
    }
}

/// Count transfers marked failed with a timestamp inside `[now - window, now]`.
fn count_recent_failures(transfers: &[Transfer], now: DateTime<Utc>, window: Duration) -> u32 {
    let cutoff = now - window;
    transfers
        .iter()
        .filter(|t| !t.succeeded && t.timestamp >= cutoff)
        .count() as u32
}
