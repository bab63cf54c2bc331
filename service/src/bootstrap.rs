//! Wiring of store, rate table and engine from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tally_ledger::{AccountStore, InMemoryAccountStore, LedgerEngine, PostgresAccountStore};
use tally_rates::{RateTable, SharedRateTable};
use tracing::info;

use crate::config::ServiceConfig;

const RATES_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the configured account store.
pub async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn AccountStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresAccountStore::connect(
                url,
                config.database_max_connections,
                config.operation_timeout,
            )
            .await
            .context("connecting to database")?;
            store.migrate().await.context("creating accounts table")?;

            info!(max_connections = config.database_max_connections, "Using Postgres store");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(InMemoryAccountStore::new()))
        }
    }
}

/// Read a CBR `daily_json` document into a rate table.
pub async fn read_rates_file(path: &Path) -> anyhow::Result<RateTable> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading rates file {}", path.display()))?;

    RateTable::from_cbr_json(&body)
        .with_context(|| format!("decoding rates file {}", path.display()))
}

/// Fetch a CBR `daily_json` document over HTTP into a rate table.
pub async fn fetch_rates(url: &str, timeout: Duration) -> anyhow::Result<RateTable> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")?;

    let body = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetching rates from {url}"))?
        .error_for_status()
        .with_context(|| format!("fetching rates from {url}"))?
        .text()
        .await
        .with_context(|| format!("reading rates body from {url}"))?;

    info!(url, bytes = body.len(), "Fetched rate feed");

    RateTable::from_cbr_json(&body).with_context(|| format!("decoding rates from {url}"))
}

/// Rate table seeded from `RATES_FILE` or `RATES_URL`, empty when neither
/// is set.
pub async fn load_rates(config: &ServiceConfig) -> anyhow::Result<Arc<SharedRateTable>> {
    let rates = SharedRateTable::new();

    match (&config.rates_file, &config.rates_url) {
        (Some(path), _) => {
            rates.replace(read_rates_file(path).await?);
        }
        (None, Some(url)) => {
            rates.replace(fetch_rates(url, RATES_FETCH_TIMEOUT).await?);
        }
        (None, None) => info!("No rate source configured, currency conversion unavailable"),
    }

    Ok(Arc::new(rates))
}

/// Build a ready engine.
pub async fn build_engine(config: &ServiceConfig) -> anyhow::Result<LedgerEngine> {
    let store = open_store(config).await?;
    let rates = load_rates(config).await?;

    Ok(LedgerEngine::with_config(store, rates, config.ledger_config()))
}
