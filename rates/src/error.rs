//! Rate lookup error types.

use rust_decimal::Decimal;
use tally_common::Currency;
use thiserror::Error;

/// Errors that can occur while decoding or looking up rates.
#[derive(Debug, Error)]
pub enum RateError {
    /// The table has no entry for the currency.
    #[error("No rate for currency {0}")]
    UnknownCurrency(Currency),

    /// No rate table has been loaded yet.
    #[error("Rate table not loaded")]
    NotLoaded,

    /// An entry is present but unusable.
    #[error("Malformed rate for {currency}: {reason}")]
    Malformed { currency: Currency, reason: String },

    /// The feed document does not match the expected schema.
    #[error("Rate feed decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    /// Conversion result does not fit in a decimal.
    #[error("Converting {amount} into {currency} overflowed")]
    Overflow { amount: Decimal, currency: Currency },
}

/// Result type for rate operations.
pub type RateResult<T> = Result<T, RateError>;
