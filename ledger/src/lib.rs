//! Tally Ledger Engine
//!
//! Atomic, non-negative balance mutations over a pluggable account store.

pub mod account;
pub mod balance;
pub mod engine;
pub mod metrics;
pub mod retry;
pub mod store;

pub use account::Account;
pub use balance::{BalanceChange, BalanceChangeType, TransferReceipt};
pub use engine::{LedgerConfig, LedgerEngine};
pub use metrics::{LedgerMetrics, MetricsSnapshot, SharedMetrics};
pub use retry::RetryPolicy;
pub use store::{AccountStore, BalanceWrite, InMemoryAccountStore, PostgresAccountStore};
