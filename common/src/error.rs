//! Error types for ledger operations.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AccountId, Currency};

/// Main error type returned by the account store and the ledger engine.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Amount was zero or negative.
    #[error("Invalid amount {0}: must be greater than zero")]
    InvalidAmount(Decimal),

    /// Referenced account does not exist.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Debit or transfer exceeds the available balance.
    #[error("Insufficient funds in account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        required: Decimal,
        available: Decimal,
    },

    /// Strict create on an existing account.
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),

    /// Transfer names the same account on both sides.
    #[error("Cannot transfer from account {0} to itself")]
    SelfTransfer(AccountId),

    /// Rate provider has no entry for the currency.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(Currency),

    /// Rate provider data is missing or unusable.
    #[error("Rate unavailable for {currency}: {reason}")]
    RateUnavailable { currency: Currency, reason: String },

    /// The store transaction lost a write-write conflict.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Deadline exceeded; the in-flight transaction was rolled back.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Non-conflict failure reported by the storage driver.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Check if the engine may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrentModification(_))
    }

    /// Stable error code for gateways and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            LedgerError::SelfTransfer(_) => "SELF_TRANSFER",
            LedgerError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            LedgerError::RateUnavailable { .. } => "RATE_UNAVAILABLE",
            LedgerError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
