//! Tally Rates
//!
//! Currency rate table consulted by the ledger's balance inquiry path.
//!
//! # Features
//!
//! - Typed `{nominal, value}` rate records, validated at construction
//! - Strict decoder for the Central Bank of Russia `daily_json` feed
//! - `RateProvider` trait injected into the ledger engine
//! - `SharedRateTable`, an atomically swapped snapshot safe to refresh
//!   while lookups are in flight
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_rates::{RateProvider, RateTable, SharedRateTable};
//! use tally_common::Currency;
//!
//! let table = RateTable::from_cbr_json(&body)?;
//! let shared = SharedRateTable::with_table(table);
//!
//! let usd = shared.lookup_rate(&Currency::usd()).await?;
//! let converted = usd.convert_from_home(balance)?;
//! ```

pub mod error;
pub mod feed;
pub mod provider;
pub mod rate;
pub mod table;

pub use error::{RateError, RateResult};
pub use provider::{RateProvider, SharedRateTable};
pub use rate::Rate;
pub use table::RateTable;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
