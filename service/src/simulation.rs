//! Concurrent transfer simulation.
//!
//! Funds a source account with exactly enough for `transfers` moves of
//! `amount`, fires them concurrently at a destination and reports whether
//! money was conserved.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_common::{AccountId, LedgerError, Result};
use tally_ledger::{LedgerEngine, MetricsSnapshot};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub source: AccountId,
    pub destination: AccountId,
    pub transfers: usize,
    pub concurrency: usize,
    pub amount: Decimal,
}

/// Latency and outcome tally.
#[derive(Debug, Clone, Default)]
pub struct LatencyStats {
    pub succeeded: u64,
    pub failed: u64,
    failures_by_code: BTreeMap<String, u64>,
    samples: Vec<u64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed transfer.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.succeeded += 1;
        self.samples.push(latency_ms);
    }

    /// Record a failed transfer.
    pub fn record_failure(&mut self, err: &LedgerError) {
        self.failed += 1;
        *self
            .failures_by_code
            .entry(err.error_code().to_string())
            .or_default() += 1;
    }

    /// Get average latency in ms.
    pub fn average_latency_ms(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.samples.iter().sum();
        sum / self.samples.len() as u64
    }

    /// Get percentile latency.
    pub fn percentile_latency_ms(&self, percentile: usize) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }
}

/// Outcome of one simulation run, printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub transfers: usize,
    pub concurrency: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub failures_by_code: BTreeMap<String, u64>,
    pub source_before: Decimal,
    pub source_after: Decimal,
    pub destination_before: Decimal,
    pub destination_after: Decimal,
    /// Sum of both balances unchanged by the run.
    pub conserved: bool,
    pub average_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub elapsed_ms: u64,
    pub metrics: MetricsSnapshot,
}

/// Run `params.transfers` concurrent transfers and report the outcome.
pub async fn run_transfer_simulation(
    engine: Arc<LedgerEngine>,
    params: &SimulationParams,
) -> Result<SimulationReport> {
    if params.source == params.destination {
        return Err(LedgerError::SelfTransfer(params.source));
    }

    let funding = params
        .amount
        .checked_mul(Decimal::from(params.transfers))
        .ok_or(LedgerError::InvalidAmount(params.amount))?;
    if funding > Decimal::ZERO {
        engine.credit(params.source, funding).await?;
    }

    let source_before = balance_or_zero(&engine, params.source).await?;
    let destination_before = balance_or_zero(&engine, params.destination).await?;

    info!(
        transfers = params.transfers,
        concurrency = params.concurrency,
        source = %params.source,
        destination = %params.destination,
        "Starting transfer simulation"
    );

    let permits = Arc::new(Semaphore::new(params.concurrency.max(1)));
    let started = Instant::now();

    let handles: Vec<_> = (0..params.transfers)
        .map(|_| {
            let engine = engine.clone();
            let permits = permits.clone();
            let (source, destination, amount) = (params.source, params.destination, params.amount);

            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                let begun = Instant::now();
                let result = engine.transfer(source, destination, amount).await;
                (result, begun.elapsed().as_millis() as u64)
            })
        })
        .collect();

    let mut stats = LatencyStats::new();
    for joined in join_all(handles).await {
        match joined {
            Ok((Ok(_), latency_ms)) => stats.record_success(latency_ms),
            Ok((Err(err), _)) => stats.record_failure(&err),
            Err(join_err) => {
                warn!(error = %join_err, "Transfer task aborted");
                stats.record_failure(&LedgerError::Storage(join_err.to_string()));
            }
        }
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let source_after = balance_or_zero(&engine, params.source).await?;
    let destination_after = balance_or_zero(&engine, params.destination).await?;
    let conserved = source_before + destination_before == source_after + destination_after;

    if !conserved {
        warn!(
            %source_before,
            %destination_before,
            %source_after,
            %destination_after,
            "Balances not conserved"
        );
    }

    Ok(SimulationReport {
        transfers: params.transfers,
        concurrency: params.concurrency,
        succeeded: stats.succeeded,
        failed: stats.failed,
        failures_by_code: stats.failures_by_code.clone(),
        source_before,
        source_after,
        destination_before,
        destination_after,
        conserved,
        average_latency_ms: stats.average_latency_ms(),
        p50_latency_ms: stats.percentile_latency_ms(50),
        p99_latency_ms: stats.percentile_latency_ms(99),
        elapsed_ms,
        metrics: engine.metrics().snapshot(),
    })
}

async fn balance_or_zero(engine: &LedgerEngine, account: AccountId) -> Result<Decimal> {
    match engine.get_balance(account, None).await {
        Ok(balance) => Ok(balance),
        Err(LedgerError::NotFound(_)) => Ok(Decimal::ZERO),
        Err(err) => Err(err),
    }
}
