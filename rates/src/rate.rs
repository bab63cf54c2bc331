//! Typed rate record.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_common::Currency;

use crate::error::{RateError, RateResult};

/// Quote of a foreign currency against the home unit.
///
/// `nominal` units of `currency` cost `value` home units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub currency: Currency,
    pub nominal: Decimal,
    pub value: Decimal,
}

impl Rate {
    /// Create a rate. Both factors must be strictly positive.
    pub fn new(currency: Currency, nominal: Decimal, value: Decimal) -> RateResult<Self> {
        if nominal <= Decimal::ZERO {
            return Err(RateError::Malformed {
                currency,
                reason: format!("nominal must be positive, got {nominal}"),
            });
        }
        if value <= Decimal::ZERO {
            return Err(RateError::Malformed {
                currency,
                reason: format!("value must be positive, got {value}"),
            });
        }

        Ok(Self {
            currency,
            nominal,
            value,
        })
    }

    /// The home unit quoted against itself.
    pub fn identity(currency: Currency) -> Self {
        Self {
            currency,
            nominal: Decimal::ONE,
            value: Decimal::ONE,
        }
    }

    /// Express a home-unit amount in this rate's currency:
    /// `amount / value * nominal`.
    pub fn convert_from_home(&self, amount: Decimal) -> RateResult<Decimal> {
        if self.value.is_zero() {
            return Err(RateError::Malformed {
                currency: self.currency.clone(),
                reason: "value is zero".to_string(),
            });
        }

        amount
            .checked_div(self.value)
            .and_then(|per_unit| per_unit.checked_mul(self.nominal))
            .ok_or_else(|| RateError::Overflow {
                amount,
                currency: self.currency.clone(),
            })
    }
}
