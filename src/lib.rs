//! ledgerd: a small ledger service with admission control.
//!
//! Exposes create/read operations for users, accounts, and transfers over
//! a SQLite-backed store. Every endpoint sits behind a chain of per-key
//! token-bucket rate limiters (by client IP, and by target user where the
//! route names one), and transfer creation is additionally guarded by a
//! repeated-failure check over the sender's recent history.

pub mod admission;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod service;
pub mod store;
