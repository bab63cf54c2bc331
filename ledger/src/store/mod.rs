//! Account storage contract.
//!
//! The store is the only shared mutable resource and the sole serialization
//! point for conflicting writes. Multi-row atomicity is offered through
//! [`AccountStore::atomic_update`]; conflicts are detected optimistically
//! against the row version and reported as `ConcurrentModification`.

mod memory;
mod postgres;

pub use memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

use std::collections::HashSet;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_common::{AccountId, LedgerError, Result};

use crate::account::Account;

/// One row write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceWrite {
    pub account_id: AccountId,
    pub new_balance: Decimal,
    /// `Some(v)`: update the existing row only if it is still at version `v`.
    /// `None`: insert a row that must not exist yet.
    pub expected_version: Option<i64>,
}

impl BalanceWrite {
    /// Version-guarded update of a row previously read.
    pub fn update(account: &Account, new_balance: Decimal) -> Self {
        Self {
            account_id: account.id,
            new_balance,
            expected_version: Some(account.version),
        }
    }

    /// Insert of a row that must not exist yet.
    pub fn insert(account_id: AccountId, balance: Decimal) -> Self {
        Self {
            account_id,
            new_balance: balance,
            expected_version: None,
        }
    }
}

/// Durable mapping from account identifier to balance.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// True iff a row for the account is present.
    async fn exists(&self, account_id: AccountId) -> Result<bool>;

    /// Strict create: `DuplicateAccount` if the id is already present.
    async fn create(&self, account_id: AccountId, initial_balance: Decimal) -> Result<Account>;

    /// Read one account, `NotFound` if absent.
    async fn get(&self, account_id: AccountId) -> Result<Account>;

    /// Apply a delta to one row. Refuses to take the balance below zero.
    async fn adjust_balance(&self, account_id: AccountId, delta: Decimal) -> Result<Account>;

    /// Apply every write in one transaction, all or nothing.
    ///
    /// Returns the written rows in batch order.
    async fn atomic_update(&self, writes: &[BalanceWrite]) -> Result<Vec<Account>>;
}

/// Reject batches a transaction must never see.
pub(crate) fn validate_batch(writes: &[BalanceWrite]) -> Result<()> {
    let mut seen = HashSet::with_capacity(writes.len());

    for write in writes {
        if !seen.insert(write.account_id) {
            return Err(LedgerError::Storage(format!(
                "account {} written twice in one batch",
                write.account_id
            )));
        }
        if write.new_balance < Decimal::ZERO {
            return Err(LedgerError::Storage(format!(
                "refusing negative balance {} for account {}",
                write.new_balance, write.account_id
            )));
        }
    }

    Ok(())
}

pub(crate) fn conflict(account_id: AccountId, detail: &str) -> LedgerError {
    LedgerError::ConcurrentModification(format!("account {account_id}: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_batch_rejects_duplicates() {
        let writes = vec![
            BalanceWrite::insert(AccountId::new(1), dec!(1)),
            BalanceWrite::insert(AccountId::new(1), dec!(2)),
        ];
        assert!(matches!(
            validate_batch(&writes),
            Err(LedgerError::Storage(_))
        ));
    }

    #[test]
    fn test_validate_batch_rejects_negative_balance() {
        let writes = vec![BalanceWrite::insert(AccountId::new(1), dec!(-0.01))];
        assert!(validate_batch(&writes).is_err());
    }

    #[test]
    fn test_update_carries_version() {
        let account = Account::new(AccountId::new(5), dec!(3));
        let write = BalanceWrite::update(&account, dec!(1));
        assert_eq!(write.expected_version, Some(1));
        assert_eq!(write.account_id, AccountId::new(5));
    }
}
