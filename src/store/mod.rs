//! Ledger store: users, accounts, and transfers.
//!
//! The [`LedgerStore`] trait abstracts over the SQLite-backed store used in
//! production and the in-memory store used by tests, so the service layer
//! and the repeated-failure guard work with either.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// An account owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub balance: f64,
}

/// A recorded transfer between two accounts.
///
/// Every attempt that reaches the store is recorded, whether or not the
/// balance moved: `succeeded` is false exactly when the source balance was
/// below the requested amount at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub succeeded: bool,
}

/// Which side of a user's accounts a transfer history query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Transfers into any account the user owns
    Incoming,
    /// Transfers initiated from any account the user owns
    Outgoing,
}

/// Persistence operations the ledger service depends on.
///
/// Single-statement reads and writes are durable and serializable;
/// `create_transfer` runs its balance reads, conditional debit/credit, and
/// audit-row insert as one atomic unit.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new user and return it with its assigned id.
    async fn create_user(&self, name: &str) -> Result<User>;

    /// Insert a new account with an opening balance.
    async fn create_account(&self, user_id: i64, balance: f64) -> Result<Account>;

    /// Execute a transfer attempt atomically.
    ///
    /// Reads both balances, classifies success as `source balance >=
    /// amount`, moves the money only on success, and records the attempt
    /// with the current wall-clock timestamp either way. Any failure rolls
    /// the whole unit back; no partial debit or credit persists.
    async fn create_transfer(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: f64,
    ) -> Result<Transfer>;

    /// Look up a user by id.
    async fn get_user(&self, user_id: i64) -> Result<User>;

    /// Look up the owning user of an account.
    async fn get_user_by_account(&self, account_id: i64) -> Result<User>;

    /// All accounts owned by a user.
    async fn get_accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>>;

    /// All transfers touching the user's accounts on the given side.
    async fn get_transfers(&self, user_id: i64, direction: Direction) -> Result<Vec<Transfer>>;
}
