//! Rate provider trait and implementations.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tally_common::Currency;
use tracing::{debug, info};

use crate::error::{RateError, RateResult};
use crate::rate::Rate;
use crate::table::RateTable;

/// Source of conversion rates for the balance inquiry path.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Point-in-time lookup of the rate for a currency.
    async fn lookup_rate(&self, currency: &Currency) -> RateResult<Rate>;
}

/// Rate table that can be replaced while lookups are running.
///
/// Readers clone the current `Arc<RateTable>` and work on that snapshot;
/// a refresh swaps in a whole new table, never mutating one in place.
pub struct SharedRateTable {
    current: RwLock<Option<Arc<RateTable>>>,
}

impl SharedRateTable {
    /// Create an empty provider; lookups fail with `NotLoaded` until a
    /// table is installed.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Create a provider serving the given table.
    pub fn with_table(table: RateTable) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(table))),
        }
    }

    /// Install a new table, returning the one it replaced.
    pub fn replace(&self, table: RateTable) -> Option<Arc<RateTable>> {
        info!(
            currencies = table.len(),
            published_at = ?table.published_at(),
            "Installing rate table"
        );
        self.current.write().replace(Arc::new(table))
    }

    /// Current snapshot, if one is loaded.
    pub fn snapshot(&self) -> Option<Arc<RateTable>> {
        self.current.read().clone()
    }
}

impl Default for SharedRateTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for SharedRateTable {
    fn name(&self) -> &str {
        "shared-table"
    }

    async fn lookup_rate(&self, currency: &Currency) -> RateResult<Rate> {
        let table = self.snapshot().ok_or(RateError::NotLoaded)?;
        let rate = table.get(currency)?;

        debug!(
            currency = %currency,
            nominal = %rate.nominal,
            value = %rate.value,
            "Rate lookup"
        );

        Ok(rate)
    }
}

/// Mock rate provider for testing.
///
/// Can hand out entries the real table would refuse to hold, so callers can
/// exercise their handling of malformed data.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: parking_lot::Mutex<std::collections::HashMap<Currency, Rate>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Set a rate without validating it.
    pub fn set_rate(
        &self,
        currency: Currency,
        nominal: rust_decimal::Decimal,
        value: rust_decimal::Decimal,
    ) {
        let rate = Rate {
            currency: currency.clone(),
            nominal,
            value,
        };
        self.rates.lock().insert(currency, rate);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_rate(&self, currency: &Currency) -> RateResult<Rate> {
        self.rates
            .lock()
            .get(currency)
            .cloned()
            .ok_or_else(|| RateError::UnknownCurrency(currency.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd_table(value: rust_decimal::Decimal) -> RateTable {
        RateTable::new(
            Currency::rub(),
            vec![Rate::new(Currency::usd(), dec!(1), value).unwrap()],
        )
    }

    #[tokio::test]
    async fn test_empty_table_is_not_loaded() {
        let provider = SharedRateTable::new();
        let result = provider.lookup_rate(&Currency::usd()).await;
        assert!(matches!(result, Err(RateError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_lookup_and_replace() {
        let provider = SharedRateTable::with_table(usd_table(dec!(90)));
        assert_eq!(
            provider.lookup_rate(&Currency::usd()).await.unwrap().value,
            dec!(90)
        );

        let previous = provider.replace(usd_table(dec!(95))).unwrap();
        assert_eq!(previous.get(&Currency::usd()).unwrap().value, dec!(90));
        assert_eq!(
            provider.lookup_rate(&Currency::usd()).await.unwrap().value,
            dec!(95)
        );
    }

    #[tokio::test]
    async fn test_snapshot_survives_replace() {
        let provider = SharedRateTable::with_table(usd_table(dec!(90)));
        let held = provider.snapshot().unwrap();

        provider.replace(usd_table(dec!(120)));

        assert_eq!(held.get(&Currency::usd()).unwrap().value, dec!(90));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lookups_during_refresh_see_whole_tables() {
        let provider = Arc::new(SharedRateTable::with_table(usd_table(dec!(1))));

        let writer = {
            let provider = provider.clone();
            tokio::spawn(async move {
                for i in 2..200 {
                    provider.replace(usd_table(rust_decimal::Decimal::from(i)));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let provider = provider.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let rate = provider.lookup_rate(&Currency::usd()).await.unwrap();
                    assert!(rate.value >= dec!(1) && rate.value < dec!(200));
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[test]
    fn test_mock_provider_returns_unvalidated_rates() {
        let provider = MockRateProvider::new("test");
        provider.set_rate(Currency::usd(), dec!(1), dec!(0));

        let rate = tokio_test::block_on(provider.lookup_rate(&Currency::usd())).unwrap();
        assert_eq!(rate.value, dec!(0));
        assert_eq!(provider.name(), "test");
    }
}
