//! Account definitions for ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_common::AccountId;

/// A ledger account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Externally supplied identifier.
    pub id: AccountId,
    /// Balance in the home unit; never negative.
    pub balance: Decimal,
    /// Row version, bumped on every write. Guards optimistic updates.
    pub version: i64,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the balance was last written.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account at version 1.
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        let now = Utc::now();

        Self {
            id,
            balance,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Copy of this row carrying a new balance and the next version.
    pub fn with_balance(&self, balance: Decimal) -> Self {
        Self {
            id: self.id,
            balance,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}
