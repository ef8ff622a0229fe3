//! Authoritative build-job table and revenue ledger.
//!
//! SQLite through an async [`DbHandle`]; one writer, every mutation
//! committed before the call returns.

pub mod db;
pub mod models;

pub use db::{DbHandle, JobDb, StoreResult};
pub use models::{JobChange, JobStats, Revenue};
