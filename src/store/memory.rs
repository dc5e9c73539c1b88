//! In-memory ledger store.
//!
//! Backs the test suites and local development. Same transfer semantics as
//! the SQLite store, with a single lock standing in for the transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{LedgerError, Result};

use super::{Account, Direction, LedgerStore, Transfer, User};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    accounts: Vec<Account>,
    transfers: Vec<Transfer>,
}

/// Ledger store holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transfer row directly, bypassing balance execution.
    ///
    /// Test support: lets suites seed a user's history with transfers at
    /// chosen timestamps and outcomes.
    pub fn seed_transfer(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: f64,
        timestamp: DateTime<Utc>,
        succeeded: bool,
    ) -> Transfer {
        let mut inner = self.inner.write();
        let transfer = Transfer {
            id: inner.transfers.len() as i64,
            from_account_id,
            to_account_id,
            amount,
            timestamp,
            succeeded,
        };
        inner.transfers.push(transfer.clone());
        transfer
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_user(&self, name: &str) -> Result<User> {
        let mut inner = self.inner.write();
        let user = User {
            id: inner.users.len() as i64,
            name: name.to_string(),
        };
        inner.users.push(user.clone());
        Ok(user)
    }

    async fn create_account(&self, user_id: i64, balance: f64) -> Result<Account> {
        let mut inner = self.inner.write();
        if !inner.users.iter().any(|u| u.id == user_id) {
            return Err(LedgerError::NotFound {
                entity: "user",
                id: user_id,
            });
        }

        let account = Account {
            id: inner.accounts.len() as i64,
            user_id,
            balance,
        };
        inner.accounts.push(account.clone());
        Ok(account)
    }

    async fn create_transfer(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: f64,
    ) -> Result<Transfer> {
        // The write lock is the atomic unit: reads, conditional balance
        // updates, and the audit row land together or not at all.
        let mut inner = self.inner.write();

        let from_balance = inner
            .accounts
            .iter()
            .find(|a| a.id == from_account_id)
            .map(|a| a.balance)
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: from_account_id,
            })?;
        let to_balance = inner
            .accounts
            .iter()
            .find(|a| a.id == to_account_id)
            .map(|a| a.balance)
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: to_account_id,
            })?;

        let succeeded = from_balance >= amount;

        if succeeded {
            // Both new balances come from the pre-transfer reads and land
            // in two passes, debit then credit, like the SQLite updates:
            // a self-transfer nets to a credit of `amount`.
            let new_from_balance = from_balance - amount;
            let new_to_balance = to_balance + amount;
            for account in inner.accounts.iter_mut() {
                if account.id == from_account_id {
                    account.balance = new_from_balance;
                }
            }
            for account in inner.accounts.iter_mut() {
                if account.id == to_account_id {
                    account.balance = new_to_balance;
                }
            }
        }

        let transfer = Transfer {
            id: inner.transfers.len() as i64,
            from_account_id,
            to_account_id,
            amount,
            timestamp: Utc::now(),
            succeeded,
        };
        inner.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn get_user(&self, user_id: i64) -> Result<User> {
        self.inner
            .read()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(LedgerError::NotFound {
                entity: "user",
                id: user_id,
            })
    }

    async fn get_user_by_account(&self, account_id: i64) -> Result<User> {
        let inner = self.inner.read();
        let account = inner
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: account_id,
            })?;
        inner
            .users
            .iter()
            .find(|u| u.id == account.user_id)
            .cloned()
            .ok_or(LedgerError::NotFound {
                entity: "user",
                id: account.user_id,
            })
    }

    async fn get_accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>> {
        Ok(self
            .inner
            .read()
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_transfers(&self, user_id: i64, direction: Direction) -> Result<Vec<Transfer>> {
        let inner = self.inner.read();
        let owned: Vec<i64> = inner
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.id)
            .collect();

        Ok(inner
            .transfers
            .iter()
            .filter(|t| match direction {
                Direction::Incoming => owned.contains(&t.to_account_id),
                Direction::Outgoing => owned.contains(&t.from_account_id),
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let store = MemoryStore::new();
        let alice = store.create_user("Alice").await.unwrap();
        let bob = store.create_user("Bob").await.unwrap();
        assert_eq!(alice.id, 0);
        assert_eq!(bob.id, 1);
    }

    #[tokio::test]
    async fn test_transfer_classification_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let alice = store.create_user("Alice").await.unwrap();
        let bob = store.create_user("Bob").await.unwrap();
        let from = store.create_account(alice.id, 100.0).await.unwrap();
        let to = store.create_account(bob.id, 0.0).await.unwrap();

        let ok = store.create_transfer(from.id, to.id, 100.0).await.unwrap();
        assert!(ok.succeeded);

        let failed = store.create_transfer(from.id, to.id, 1.0).await.unwrap();
        assert!(!failed.succeeded);

        let accounts = store.get_accounts_for_user(bob.id).await.unwrap();
        assert_eq!(accounts[0].balance, 100.0);
    }

    #[tokio::test]
    async fn test_self_transfer_nets_to_credit() {
        let store = MemoryStore::new();
        let alice = store.create_user("Alice").await.unwrap();
        let account = store.create_account(alice.id, 100.0).await.unwrap();

        let transfer = store
            .create_transfer(account.id, account.id, 50.0)
            .await
            .unwrap();
        assert!(transfer.succeeded);

        let accounts = store.get_accounts_for_user(alice.id).await.unwrap();
        assert_eq!(accounts[0].balance, 150.0);
    }

    #[tokio::test]
    async fn test_seeded_transfers_show_up_in_history() {
        let store = MemoryStore::new();
        let alice = store.create_user("Alice").await.unwrap();
        let account = store.create_account(alice.id, 0.0).await.unwrap();

        store.seed_transfer(account.id, 99, 500.0, Utc::now(), false);

        let outgoing = store
            .get_transfers(alice.id, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert!(!outgoing[0].succeeded);
    }
}
