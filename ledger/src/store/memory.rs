//! Process-local account store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tally_common::{AccountId, LedgerError, Result};
use tracing::debug;

use super::{conflict, validate_batch, AccountStore, BalanceWrite};
use crate::account::Account;

/// In-memory store. A batch is checked and applied under one write-lock
/// acquisition, so no reader ever observes part of it.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All accounts ordered by id.
    pub fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.accounts.read().values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        accounts
    }

    /// Sum of every balance.
    pub fn total_balance(&self) -> Decimal {
        self.accounts.read().values().map(|a| a.balance).sum()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, account_id: AccountId) -> Result<bool> {
        Ok(self.accounts.read().contains_key(&account_id))
    }

    async fn create(&self, account_id: AccountId, initial_balance: Decimal) -> Result<Account> {
        validate_batch(&[BalanceWrite::insert(account_id, initial_balance)])?;

        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account_id) {
            return Err(LedgerError::DuplicateAccount(account_id));
        }

        let account = Account::new(account_id, initial_balance);
        accounts.insert(account_id, account.clone());
        debug!(account = %account_id, balance = %initial_balance, "Account created");

        Ok(account)
    }

    async fn get(&self, account_id: AccountId) -> Result<Account> {
        self.accounts
            .read()
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::NotFound(account_id))
    }

    async fn adjust_balance(&self, account_id: AccountId, delta: Decimal) -> Result<Account> {
        let mut accounts = self.accounts.write();
        let current = accounts
            .get(&account_id)
            .ok_or(LedgerError::NotFound(account_id))?;

        let new_balance = current
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::InvalidAmount(delta))?;
        if new_balance < Decimal::ZERO {
            return Err(LedgerError::InsufficientFunds {
                account: account_id,
                required: -delta,
                available: current.balance,
            });
        }

        let updated = current.with_balance(new_balance);
        accounts.insert(account_id, updated.clone());

        Ok(updated)
    }

    async fn atomic_update(&self, writes: &[BalanceWrite]) -> Result<Vec<Account>> {
        validate_batch(writes)?;

        let mut accounts = self.accounts.write();

        // Check every write before applying any.
        for write in writes {
            let current = accounts.get(&write.account_id);
            match (write.expected_version, current) {
                (Some(expected), Some(row)) if row.version == expected => {}
                (Some(expected), Some(row)) => {
                    return Err(conflict(
                        write.account_id,
                        &format!("expected version {expected}, found {}", row.version),
                    ));
                }
                (Some(_), None) => return Err(LedgerError::NotFound(write.account_id)),
                (None, Some(_)) => return Err(conflict(write.account_id, "created concurrently")),
                (None, None) => {}
            }
        }

        let written = writes
            .iter()
            .map(|write| {
                let row = match accounts.get(&write.account_id) {
                    Some(row) => row.with_balance(write.new_balance),
                    None => Account::new(write.account_id, write.new_balance),
                };
                accounts.insert(write.account_id, row.clone());
                row
            })
            .collect();

        debug!(writes = writes.len(), "Batch committed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn id(n: i64) -> AccountId {
        AccountId::new(n)
    }

    #[tokio::test]
    async fn test_create_is_strict() {
        let store = InMemoryAccountStore::new();
        store.create(id(1), dec!(10)).await.unwrap();

        assert!(store.exists(id(1)).await.unwrap());
        assert!(matches!(
            store.create(id(1), dec!(5)).await,
            Err(LedgerError::DuplicateAccount(a)) if a == id(1)
        ));
        assert_eq!(store.get(id(1)).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryAccountStore::new();
        assert!(!store.exists(id(3)).await.unwrap());
        assert!(matches!(store.get(id(3)).await, Err(LedgerError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_adjust_balance() {
        let store = InMemoryAccountStore::new();
        store.create(id(1), dec!(10)).await.unwrap();

        let account = store.adjust_balance(id(1), dec!(-4)).await.unwrap();
        assert_eq!(account.balance, dec!(6));
        assert_eq!(account.version, 2);

        assert!(matches!(
            store.adjust_balance(id(1), dec!(-7)).await,
            Err(LedgerError::InsufficientFunds { available, .. }) if available == dec!(6)
        ));
        assert!(matches!(
            store.adjust_balance(id(2), dec!(1)).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_atomic_update_applies_all() {
        let store = InMemoryAccountStore::new();
        let source = store.create(id(1), dec!(10)).await.unwrap();

        let written = store
            .atomic_update(&[
                BalanceWrite::update(&source, dec!(3)),
                BalanceWrite::insert(id(2), dec!(7)),
            ])
            .await
            .unwrap();

        assert_eq!(written[0].balance, dec!(3));
        assert_eq!(written[1].balance, dec!(7));
        assert_eq!(store.total_balance(), dec!(10));
    }

    #[tokio::test]
    async fn test_stale_version_rolls_back_whole_batch() {
        let store = InMemoryAccountStore::new();
        let stale = store.create(id(1), dec!(10)).await.unwrap();
        let other = store.create(id(2), dec!(0)).await.unwrap();
        store.adjust_balance(id(1), dec!(1)).await.unwrap();

        let result = store
            .atomic_update(&[
                BalanceWrite::update(&other, dec!(5)),
                BalanceWrite::update(&stale, dec!(5)),
            ])
            .await;

        assert!(matches!(result, Err(LedgerError::ConcurrentModification(_))));
        assert_eq!(store.get(id(1)).await.unwrap().balance, dec!(11));
        assert_eq!(store.get(id(2)).await.unwrap().balance, dec!(0));
    }

    #[tokio::test]
    async fn test_insert_of_existing_row_conflicts() {
        let store = InMemoryAccountStore::new();
        store.create(id(2), dec!(1)).await.unwrap();

        let result = store
            .atomic_update(&[BalanceWrite::insert(id(2), dec!(7))])
            .await;

        assert!(matches!(result, Err(LedgerError::ConcurrentModification(_))));
        assert_eq!(store.get(id(2)).await.unwrap().balance, dec!(1));
    }

    #[tokio::test]
    async fn test_accounts_sorted() {
        let store = InMemoryAccountStore::new();
        store.create(id(3), dec!(1)).await.unwrap();
        store.create(id(1), dec!(1)).await.unwrap();

        let ids: Vec<_> = store.accounts().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![id(1), id(3)]);
    }
}
