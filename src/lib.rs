//! Append-only, hash-chained ballot ledger with proof-of-work sealing.

pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod pow;
pub mod storage;

pub use chain::Chain;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{voter_hash, LedgerService};
pub use models::{AuditEntry, AuditReport, Block, Tally, Transaction, VoteReceipt, VoteRecord};
pub use storage::{JsonFileStore, MemoryStore, Snapshot, SnapshotStore};
