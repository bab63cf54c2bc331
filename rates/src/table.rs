//! Immutable rate table snapshot.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use tally_common::Currency;

use crate::error::{RateError, RateResult};
use crate::feed;
use crate::rate::Rate;

/// A point-in-time set of rates quoted against one home currency.
#[derive(Debug, Clone)]
pub struct RateTable {
    home: Currency,
    published_at: Option<DateTime<FixedOffset>>,
    rates: HashMap<Currency, Rate>,
}

impl RateTable {
    /// Build a table from already validated rates.
    pub fn new(home: Currency, rates: impl IntoIterator<Item = Rate>) -> Self {
        Self {
            home,
            published_at: None,
            rates: rates
                .into_iter()
                .map(|rate| (rate.currency.clone(), rate))
                .collect(),
        }
    }

    /// Decode a Central Bank of Russia `daily_json` document.
    /// Rates in that feed are quoted in roubles.
    pub fn from_cbr_json(body: &str) -> RateResult<Self> {
        let (published_at, rates) = feed::decode(body)?;
        let mut table = Self::new(Currency::rub(), rates);
        table.published_at = Some(published_at);
        Ok(table)
    }

    /// Look up a rate; the home currency always resolves to identity.
    pub fn get(&self, currency: &Currency) -> RateResult<Rate> {
        if *currency == self.home {
            return Ok(Rate::identity(self.home.clone()));
        }

        self.rates
            .get(currency)
            .cloned()
            .ok_or_else(|| RateError::UnknownCurrency(currency.clone()))
    }

    pub fn home(&self) -> &Currency {
        &self.home
    }

    /// Publication date reported by the feed, if decoded from one.
    pub fn published_at(&self) -> Option<DateTime<FixedOffset>> {
        self.published_at
    }

    /// Quoted currencies in code order.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut codes: Vec<Currency> = self.rates.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
        "Date": "2024-03-01T11:30:00+03:00",
        "PreviousDate": "2024-02-29T11:30:00+03:00",
        "Valute": {
            "USD": {"CharCode": "USD", "Nominal": 1, "Value": 90.0},
            "JPY": {"CharCode": "JPY", "Nominal": 100, "Value": 60.5},
            "EUR": {"CharCode": "EUR", "Nominal": 1, "Value": 98.7}
        }
    }"#;

    #[test]
    fn test_from_cbr_json() {
        let table = RateTable::from_cbr_json(SAMPLE).unwrap();

        assert_eq!(table.home(), &Currency::rub());
        assert_eq!(table.len(), 3);
        assert!(table.published_at().is_some());
        assert_eq!(
            table.currencies(),
            vec![Currency::eur(), Currency::new("JPY"), Currency::usd()]
        );

        let jpy = table.get(&Currency::new("jpy")).unwrap();
        assert_eq!(jpy.nominal, dec!(100));
        assert_eq!(jpy.value, dec!(60.5));
    }

    #[test]
    fn test_unknown_currency() {
        let table = RateTable::from_cbr_json(SAMPLE).unwrap();
        assert!(matches!(
            table.get(&Currency::new("XXX")),
            Err(RateError::UnknownCurrency(c)) if c.code() == "XXX"
        ));
    }

    #[test]
    fn test_home_currency_is_identity() {
        let table = RateTable::new(Currency::rub(), Vec::new());
        let rub = table.get(&Currency::rub()).unwrap();
        assert_eq!(rub.nominal, dec!(1));
        assert_eq!(rub.value, dec!(1));
        assert!(table.is_empty());
    }
}
