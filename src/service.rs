//! Ledger service: business operations composed over the store and the
//! repeated-failure guard.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::guard::RepeatedFailureGuard;
use crate::store::{Account, Direction, LedgerStore, Transfer, User};

/// The business layer behind every endpoint.
///
/// Owns the ledger store and the repeated-failure guard. Transfer creation
/// serializes per initiating user so that the guard's history read and the
/// eventual transfer insert cannot interleave between two attempts from the
/// same sender; the lock map grows with the sender population and entries
/// are never removed.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    guard: RepeatedFailureGuard,
    transfer_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl LedgerService {
    /// Create a service over the given store and guard.
    pub fn new(store: Arc<dyn LedgerStore>, guard: RepeatedFailureGuard) -> Self {
        Self {
            store,
            guard,
            transfer_locks: DashMap::new(),
        }
    }

    /// Register a new user.
    pub async fn create_user(&self, name: &str) -> Result<User> {
        let user = self.store.create_user(name).await?;
        info!(user_id = user.id, "Created new user");
        Ok(user)
    }

    /// Open a new account for an existing user.
    pub async fn create_account(&self, user_id: i64, balance: f64) -> Result<Account> {
        let account = self.store.create_account(user_id, balance).await?;
        info!(account_id = account.id, user_id = user_id, "Created new account");
        Ok(account)
    }

    /// Attempt a transfer between two accounts.
    ///
    /// Resolves the owning user of the source account, runs the
    /// repeated-failure guard, and only then instructs the store to execute
    /// the balance update and record the outcome. Guard denial aborts
    /// before any balance read; no partial record is written.
    pub async fn create_transfer(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: f64,
    ) -> Result<Transfer> {
        let sender = self.store.get_user_by_account(from_account_id).await?;

        let lock = self
            .transfer_locks
            .entry(sender.id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _serialized = lock.lock().await;

        debug!(
            user_id = sender.id,
            from = from_account_id,
            to = to_account_id,
            amount = amount,
            "Checking repeated-failure guard"
        );
        self.guard.check(self.store.as_ref(), sender.id).await?;

        let transfer = self
            .store
            .create_transfer(from_account_id, to_account_id, amount)
            .await?;
        info!(
            transfer_id = transfer.id,
            succeeded = transfer.succeeded,
            "Created new transfer"
        );
        Ok(transfer)
    }

    /// Look up a user.
    pub async fn get_user(&self, user_id: i64) -> Result<User> {
        self.store.get_user(user_id).await
    }

    /// All accounts owned by a user.
    pub async fn get_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        self.store.get_accounts_for_user(user_id).await
    }

    /// A user's transfer history on one side.
    pub async fn get_transfers(&self, user_id: i64, direction: Direction) -> Result<Vec<Transfer>> {
        self.store.get_transfers(user_id, direction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn service_over(store: Arc<MemoryStore>) -> LedgerService {
        LedgerService::new(
            store,
            RepeatedFailureGuard::new(Duration::hours(24), 3),
        )
    }

    #[tokio::test]
    async fn test_transfer_scenario_with_final_failure() {
        let store = Arc::new(MemoryStore::new());
        let service = service_over(Arc::clone(&store));

        let alice = service.create_user("Alice").await.unwrap();
        let bob = service.create_user("Bob").await.unwrap();
        let from = service.create_account(alice.id, 400.0).await.unwrap();
        let to = service.create_account(bob.id, 0.0).await.unwrap();

        // Three transfers of 100 succeed, draining the balance to 100.
        for _ in 0..3 {
            let transfer = service
                .create_transfer(from.id, to.id, 100.0)
                .await
                .unwrap();
            assert!(transfer.succeeded);
        }
        let accounts = service.get_accounts(alice.id).await.unwrap();
        assert_eq!(accounts[0].balance, 100.0);

        // A fourth transfer of 200 is recorded as failed; balance unchanged.
        let failed = service
            .create_transfer(from.id, to.id, 200.0)
            .await
            .unwrap();
        assert!(!failed.succeeded);
        let accounts = service.get_accounts(alice.id).await.unwrap();
        assert_eq!(accounts[0].balance, 100.0);

        let history = service
            .get_transfers(alice.id, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(history.iter().filter(|t| !t.succeeded).count(), 1);
    }

    #[tokio::test]
    async fn test_third_failure_is_recorded_then_guard_denies() {
        let store = Arc::new(MemoryStore::new());
        let service = service_over(Arc::clone(&store));

        let alice = service.create_user("Alice").await.unwrap();
        let bob = service.create_user("Bob").await.unwrap();
        let from = service.create_account(alice.id, 100.0).await.unwrap();
        let to = service.create_account(bob.id, 0.0).await.unwrap();

        // Two recent failures already on record.
        for _ in 0..2 {
            store.seed_transfer(from.id, to.id, 500.0, Utc::now(), false);
        }

        // The third failing attempt is still created and recorded as failed.
        let third = service
            .create_transfer(from.id, to.id, 500.0)
            .await
            .unwrap();
        assert!(!third.succeeded);

        // Any subsequent attempt is denied before reaching the store.
        let err = service
            .create_transfer(from.id, to.id, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RepeatedFailureLimit { .. }));

        // Denied attempt wrote nothing.
        let history = service
            .get_transfers(alice.id, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn test_guard_denial_precedes_balance_mutation() {
        let store = Arc::new(MemoryStore::new());
        let service = service_over(Arc::clone(&store));

        let alice = service.create_user("Alice").await.unwrap();
        let bob = service.create_user("Bob").await.unwrap();
        let from = service.create_account(alice.id, 1000.0).await.unwrap();
        let to = service.create_account(bob.id, 0.0).await.unwrap();

        for _ in 0..3 {
            store.seed_transfer(from.id, to.id, 500.0, Utc::now(), false);
        }

        // Plenty of balance, but the guard rejects first.
        let err = service
            .create_transfer(from.id, to.id, 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::RepeatedFailureLimit { .. }));

        let accounts = service.get_accounts(alice.id).await.unwrap();
        assert_eq!(accounts[0].balance, 1000.0);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_cannot_overshoot_threshold() {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(service_over(Arc::clone(&store)));

        let alice = service.create_user("Alice").await.unwrap();
        let bob = service.create_user("Bob").await.unwrap();
        let from = service.create_account(alice.id, 0.0).await.unwrap();
        let to = service.create_account(bob.id, 0.0).await.unwrap();

        // Six concurrent failing attempts from the same sender: the per-user
        // lock serializes guard check + insert, so exactly three failures
        // are recorded before the guard closes the gate.
        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.create_transfer(from.id, to.id, 500.0).await
            }));
        }

        let mut recorded = 0;
        let mut denied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(t) => {
                    assert!(!t.succeeded);
                    recorded += 1;
                }
                Err(LedgerError::RepeatedFailureLimit { .. }) => denied += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(recorded, 3);
        assert_eq!(denied, 3);
    }
}
