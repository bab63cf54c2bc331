//! Receipts for committed balance changes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_common::{AccountId, TransferId};

/// Type of balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeType {
    /// Direct credit (increase).
    Credit,
    /// Direct debit (decrease).
    Debit,
    /// Outgoing leg of a transfer.
    TransferOut,
    /// Incoming leg of a transfer.
    TransferIn,
}

/// Balance change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Account affected.
    pub account_id: AccountId,
    /// Change type.
    pub change_type: BalanceChangeType,
    /// Amount moved, always positive.
    pub amount: Decimal,
    /// Balance before change. Zero for an account created by this change.
    pub balance_before: Decimal,
    /// Balance after change.
    pub balance_after: Decimal,
    /// Whether this change created the account.
    pub created: bool,
    /// When the change was committed.
    pub timestamp: DateTime<Utc>,
}

impl BalanceChange {
    pub fn new(
        account_id: AccountId,
        change_type: BalanceChangeType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
    ) -> Self {
        Self {
            account_id,
            change_type,
            amount,
            balance_before,
            balance_after,
            created: false,
            timestamp: Utc::now(),
        }
    }

    /// Mark the change as the one that opened the account.
    pub fn opening(mut self) -> Self {
        self.created = true;
        self
    }

    /// Signed effect on the balance.
    pub fn delta(&self) -> Decimal {
        self.balance_after - self.balance_before
    }
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub id: TransferId,
    pub amount: Decimal,
    pub debit: BalanceChange,
    pub credit: BalanceChange,
}

impl TransferReceipt {
    /// True when debit and credit cancel out.
    pub fn is_balanced(&self) -> bool {
        self.debit.delta() + self.credit.delta() == Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_receipt_balanced() {
        let debit = BalanceChange::new(
            AccountId::new(1),
            BalanceChangeType::TransferOut,
            dec!(7),
            dec!(10),
            dec!(3),
        );
        let credit = BalanceChange::new(
            AccountId::new(2),
            BalanceChangeType::TransferIn,
            dec!(7),
            dec!(0),
            dec!(7),
        )
        .opening();

        let receipt = TransferReceipt {
            id: TransferId::new(),
            amount: dec!(7),
            debit,
            credit,
        };

        assert!(receipt.is_balanced());
        assert!(receipt.credit.created);
        assert_eq!(receipt.debit.delta(), dec!(-7));
    }
}
