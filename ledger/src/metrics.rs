//! Ledger operation counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tally_common::LedgerError;

/// Ledger engine metrics.
pub struct LedgerMetrics {
    /// Committed credits.
    pub credits: AtomicU64,
    /// Committed debits.
    pub debits: AtomicU64,
    /// Committed transfers.
    pub transfers: AtomicU64,
    /// Accounts opened implicitly by a credit or transfer.
    pub accounts_created: AtomicU64,
    /// Balance inquiries answered.
    pub balance_queries: AtomicU64,
    /// Operations rejected by a business rule.
    pub rejected: AtomicU64,
    /// Attempts repeated after a conflict.
    pub conflict_retries: AtomicU64,
    /// Operations that ran out of conflict retries.
    pub conflicts_exhausted: AtomicU64,
    /// Operations abandoned at their deadline.
    pub timeouts: AtomicU64,
    /// Storage and rate provider failures.
    pub failures: AtomicU64,
}

impl LedgerMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            credits: AtomicU64::new(0),
            debits: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            accounts_created: AtomicU64::new(0),
            balance_queries: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            conflict_retries: AtomicU64::new(0),
            conflicts_exhausted: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn credit_committed(&self) {
        self.credits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn debit_committed(&self) {
        self.debits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_committed(&self) {
        self.transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn account_created(&self) {
        self.accounts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn balance_queried(&self) {
        self.balance_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conflict_retried(&self) {
        self.conflict_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify and count a failed operation.
    pub fn record_failure(&self, err: &LedgerError) {
        let counter = match err {
            LedgerError::Timeout(_) => &self.timeouts,
            LedgerError::ConcurrentModification(_) => &self.conflicts_exhausted,
            LedgerError::Storage(_) | LedgerError::RateUnavailable { .. } => &self.failures,
            LedgerError::InvalidAmount(_)
            | LedgerError::NotFound(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::DuplicateAccount(_)
            | LedgerError::SelfTransfer(_)
            | LedgerError::UnknownCurrency(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            credits: self.credits.load(Ordering::Relaxed),
            debits: self.debits.load(Ordering::Relaxed),
            transfers: self.transfers.load(Ordering::Relaxed),
            accounts_created: self.accounts_created.load(Ordering::Relaxed),
            balance_queries: self.balance_queries.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            conflict_retries: self.conflict_retries.load(Ordering::Relaxed),
            conflicts_exhausted: self.conflicts_exhausted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let series = [
            ("credits_total", "Committed credits", snapshot.credits),
            ("debits_total", "Committed debits", snapshot.debits),
            ("transfers_total", "Committed transfers", snapshot.transfers),
            (
                "accounts_created_total",
                "Accounts opened implicitly",
                snapshot.accounts_created,
            ),
            (
                "balance_queries_total",
                "Balance inquiries answered",
                snapshot.balance_queries,
            ),
            (
                "rejected_total",
                "Operations rejected by a business rule",
                snapshot.rejected,
            ),
            (
                "conflict_retries_total",
                "Attempts repeated after a conflict",
                snapshot.conflict_retries,
            ),
            (
                "conflicts_exhausted_total",
                "Operations out of conflict retries",
                snapshot.conflicts_exhausted,
            ),
            (
                "timeouts_total",
                "Operations abandoned at their deadline",
                snapshot.timeouts,
            ),
            (
                "failures_total",
                "Storage and rate provider failures",
                snapshot.failures,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in series {
            out.push_str(&format!("# HELP tally_ledger_{name} {help}\n"));
            out.push_str(&format!("# TYPE tally_ledger_{name} counter\n"));
            out.push_str(&format!("tally_ledger_{name} {value}\n\n"));
        }
        out
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub credits: u64,
    pub debits: u64,
    pub transfers: u64,
    pub accounts_created: u64,
    pub balance_queries: u64,
    pub rejected: u64,
    pub conflict_retries: u64,
    pub conflicts_exhausted: u64,
    pub timeouts: u64,
    pub failures: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<LedgerMetrics>;
