//! Decoder for the Central Bank of Russia `daily_json` document.
//!
//! Only the fields the ledger needs are read; unknown fields are ignored,
//! but `Nominal` and `Value` must be numeric or the whole document is
//! rejected.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use tally_common::Currency;

use crate::error::{RateError, RateResult};
use crate::rate::Rate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DailyDocument {
    pub date: DateTime<FixedOffset>,
    pub valute: BTreeMap<String, DailyQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct DailyQuote {
    pub char_code: String,
    #[serde(deserialize_with = "json_number")]
    pub nominal: Decimal,
    #[serde(deserialize_with = "json_number")]
    pub value: Decimal,
}

/// Accept a JSON number only; quoted numerals are rejected.
fn json_number<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    let text = number.to_string();

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| de::Error::custom(format!("{text} is not a decimal: {e}")))
}

impl DailyQuote {
    fn into_rate(self, key: &str) -> RateResult<Rate> {
        let currency = Currency::new(&self.char_code);
        if currency != Currency::new(key) {
            return Err(RateError::Malformed {
                currency,
                reason: format!("listed under key {key}"),
            });
        }
        if !currency.is_valid() {
            return Err(RateError::Malformed {
                currency,
                reason: "not an ISO 4217 code".to_string(),
            });
        }
        Rate::new(currency, self.nominal, self.value)
    }
}

/// Decode a feed body into its publication date and typed rates.
pub(crate) fn decode(body: &str) -> RateResult<(DateTime<FixedOffset>, Vec<Rate>)> {
    let document: DailyDocument = serde_json::from_str(body)?;

    let rates = document
        .valute
        .into_iter()
        .map(|(key, quote)| quote.into_rate(&key))
        .collect::<RateResult<Vec<_>>>()?;

    Ok((document.date, rates))
}
