//! SQLite-backed ledger store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};

use super::{Account, Direction, LedgerStore, Transfer, User};

/// Ledger store persisting to a single SQLite database.
///
/// The connection is serialized behind a mutex; every statement is short
/// and the transfer transaction never awaits while holding it. WAL journal
/// mode keeps reads concurrent with the writer at the SQLite level.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at the given path and initialize the
    /// schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), "Opening ledger database");
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                balance REAL NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transfers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_account_id INTEGER NOT NULL,
                to_account_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                timestamp TEXT NOT NULL,
                succeeded INTEGER NOT NULL,
                FOREIGN KEY (from_account_id) REFERENCES accounts(id),
                FOREIGN KEY (to_account_id) REFERENCES accounts(id)
            )",
            [],
        )?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)?;
    Ok(parsed.with_timezone(&Utc))
}

/// Raw transfer row with the timestamp still as stored text.
type TransferRow = (i64, i64, i64, f64, String, bool);

fn row_to_transfer(row: TransferRow) -> Result<Transfer> {
    let (id, from_account_id, to_account_id, amount, timestamp, succeeded) = row;
    Ok(Transfer {
        id,
        from_account_id,
        to_account_id,
        amount,
        timestamp: parse_timestamp(&timestamp)?,
        succeeded,
    })
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn create_user(&self, name: &str) -> Result<User> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO users (name) VALUES (?1)", params![name])?;
        let id = conn.last_insert_rowid();

        Ok(User {
            id,
            name: name.to_string(),
        })
    }

    async fn create_account(&self, user_id: i64, balance: f64) -> Result<Account> {
        let conn = self.conn.lock();

        let owner_exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        if owner_exists.is_none() {
            return Err(LedgerError::NotFound {
                entity: "user",
                id: user_id,
            });
        }

        conn.execute(
            "INSERT INTO accounts (user_id, balance) VALUES (?1, ?2)",
            params![user_id, balance],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Account {
            id,
            user_id,
            balance,
        })
    }

    async fn create_transfer(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        amount: f64,
    ) -> Result<Transfer> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let from_balance: f64 = tx
            .query_row(
                "SELECT balance FROM accounts WHERE id = ?1",
                params![from_account_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: from_account_id,
            })?;

        let to_balance: f64 = tx
            .query_row(
                "SELECT balance FROM accounts WHERE id = ?1",
                params![to_account_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(LedgerError::NotFound {
                entity: "account",
                id: to_account_id,
            })?;

        // Classification happens here, at execution time: the attempt
        // succeeds exactly when the source can cover the amount.
        let succeeded = from_balance >= amount;

        if succeeded {
            tx.execute(
                "UPDATE accounts SET balance = ?1 WHERE id = ?2",
                params![from_balance - amount, from_account_id],
            )?;
            tx.execute(
                "UPDATE accounts SET balance = ?1 WHERE id = ?2",
                params![to_balance + amount, to_account_id],
            )?;
        }

        let timestamp = Utc::now();
        tx.execute(
            "INSERT INTO transfers (from_account_id, to_account_id, amount, timestamp, succeeded)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                from_account_id,
                to_account_id,
                amount,
                timestamp.to_rfc3339(),
                succeeded
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;

        debug!(
            id = id,
            from = from_account_id,
            to = to_account_id,
            amount = amount,
            succeeded = succeeded,
            "Recorded transfer"
        );

        Ok(Transfer {
            id,
            from_account_id,
            to_account_id,
            amount,
            timestamp,
            succeeded,
        })
    }

    async fn get_user(&self, user_id: i64) -> Result<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or(LedgerError::NotFound {
            entity: "user",
            id: user_id,
        })
    }

    async fn get_user_by_account(&self, account_id: i64) -> Result<User> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT users.id, users.name
             FROM users
             INNER JOIN accounts ON users.id = accounts.user_id
             WHERE accounts.id = ?1",
            params![account_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or(LedgerError::NotFound {
            entity: "account",
            id: account_id,
        })
    }

    async fn get_accounts_for_user(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, user_id, balance FROM accounts WHERE user_id = ?1")?;
        let accounts = stmt
            .query_map(params![user_id], |row| {
                Ok(Account {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    balance: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    async fn get_transfers(&self, user_id: i64, direction: Direction) -> Result<Vec<Transfer>> {
        let sql = match direction {
            Direction::Incoming => {
                "SELECT t.id, t.from_account_id, t.to_account_id, t.amount, t.timestamp, t.succeeded
                 FROM transfers t
                 INNER JOIN accounts a ON t.to_account_id = a.id
                 WHERE a.user_id = ?1
                 ORDER BY t.id"
            }
            Direction::Outgoing => {
                "SELECT t.id, t.from_account_id, t.to_account_id, t.amount, t.timestamp, t.succeeded
                 FROM transfers t
                 INNER JOIN accounts a ON t.from_account_id = a.id
                 WHERE a.user_id = ?1
                 ORDER BY t.id"
            }
        };

        let rows: Vec<TransferRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(row_to_transfer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> (SqliteStore, Account, Account) {
        let store = SqliteStore::open_in_memory().unwrap();
        let alice = store.create_user("Alice").await.unwrap();
        let bob = store.create_user("Bob").await.unwrap();
        let from = store.create_account(alice.id, 400.0).await.unwrap();
        let to = store.create_account(bob.id, 900.0).await.unwrap();
        (store, from, to)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.create_user("Alice").await.unwrap();
        assert_eq!(store.get_user(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn test_get_missing_user_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_user(99).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound {
                entity: "user",
                id: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_account_requires_existing_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.create_account(5, 100.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn test_sufficient_balance_moves_exactly_amount() {
        let (store, from, to) = seeded_store().await;

        let transfer = store.create_transfer(from.id, to.id, 100.0).await.unwrap();
        assert!(transfer.succeeded);

        let from_owner = store.get_user_by_account(from.id).await.unwrap();
        let accounts = store.get_accounts_for_user(from_owner.id).await.unwrap();
        assert_eq!(accounts[0].balance, 300.0);

        let to_owner = store.get_user_by_account(to.id).await.unwrap();
        let accounts = store.get_accounts_for_user(to_owner.id).await.unwrap();
        assert_eq!(accounts[0].balance, 1000.0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_records_failure_without_moving_money() {
        let (store, from, to) = seeded_store().await;

        let transfer = store.create_transfer(from.id, to.id, 500.0).await.unwrap();
        assert!(!transfer.succeeded);

        let from_owner = store.get_user_by_account(from.id).await.unwrap();
        let accounts = store.get_accounts_for_user(from_owner.id).await.unwrap();
        assert_eq!(accounts[0].balance, 400.0);

        // The failed attempt is still recorded in the sender's history.
        let outgoing = store
            .get_transfers(from_owner.id, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert!(!outgoing[0].succeeded);
    }

    #[tokio::test]
    async fn test_transfer_to_missing_account_writes_nothing() {
        let (store, from, _) = seeded_store().await;

        let err = store.create_transfer(from.id, 99, 100.0).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::NotFound {
                entity: "account",
                id: 99
            }
        ));

        let owner = store.get_user_by_account(from.id).await.unwrap();
        let accounts = store.get_accounts_for_user(owner.id).await.unwrap();
        assert_eq!(accounts[0].balance, 400.0);
        assert!(store
            .get_transfers(owner.id, Direction::Outgoing)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_direction_splits_history() {
        let (store, from, to) = seeded_store().await;
        store.create_transfer(from.id, to.id, 50.0).await.unwrap();

        let sender = store.get_user_by_account(from.id).await.unwrap();
        let receiver = store.get_user_by_account(to.id).await.unwrap();

        assert_eq!(
            store
                .get_transfers(sender.id, Direction::Outgoing)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .get_transfers(sender.id, Direction::Incoming)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_transfers(receiver.id, Direction::Incoming)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_self_transfer_nets_to_credit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let alice = store.create_user("Alice").await.unwrap();
        let account = store.create_account(alice.id, 100.0).await.unwrap();

        let transfer = store
            .create_transfer(account.id, account.id, 50.0)
            .await
            .unwrap();
        assert!(transfer.succeeded);

        // Debit then credit, both computed from the pre-transfer reads.
        let accounts = store.get_accounts_for_user(alice.id).await.unwrap();
        assert_eq!(accounts[0].balance, 150.0);
    }

    #[tokio::test]
    async fn test_history_spans_all_owned_accounts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let charlie = store.create_user("Charlie").await.unwrap();
        let bob = store.create_user("Bob").await.unwrap();
        let first = store.create_account(charlie.id, 200.0).await.unwrap();
        let second = store.create_account(charlie.id, 300.0).await.unwrap();
        let sink = store.create_account(bob.id, 0.0).await.unwrap();

        store.create_transfer(first.id, sink.id, 50.0).await.unwrap();
        store.create_transfer(second.id, sink.id, 60.0).await.unwrap();

        let outgoing = store
            .get_transfers(charlie.id, Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[0].from_account_id, first.id);
        assert_eq!(outgoing[1].from_account_id, second.id);
    }

    #[tokio::test]
    async fn test_timestamp_round_trips() {
        let (store, from, to) = seeded_store().await;
        let created = store.create_transfer(from.id, to.id, 10.0).await.unwrap();

        let sender = store.get_user_by_account(from.id).await.unwrap();
        let stored = store
            .get_transfers(sender.id, Direction::Outgoing)
            .await
            .unwrap();
        // RFC 3339 text storage keeps sub-second precision.
        assert_eq!(stored[0].timestamp, created.timestamp);
    }
}
