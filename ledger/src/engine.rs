//! Core ledger engine implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tally_common::{
    is_valid_amount, AccountId, Currency, Deadline, LedgerError, Result, TransferId,
};
use tally_rates::{RateError, RateProvider};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::balance::{BalanceChange, BalanceChangeType, TransferReceipt};
use crate::metrics::{LedgerMetrics, SharedMetrics};
use crate::retry::RetryPolicy;
use crate::store::{AccountStore, BalanceWrite};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Deadline applied to every operation, retries included.
    pub operation_timeout: Duration,
    /// Backoff for operations that lost a write conflict.
    pub retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// The ledger engine validates and executes balance changes.
///
/// Every mutation is an optimistic read-modify-write: rows are read with
/// their version, written back through [`AccountStore::atomic_update`]
/// guarded by that version, and retried on `ConcurrentModification`. The
/// engine itself holds no locks.
pub struct LedgerEngine {
    store: Arc<dyn AccountStore>,
    rates: Arc<dyn RateProvider>,
    config: LedgerConfig,
    metrics: SharedMetrics,
}

impl LedgerEngine {
    /// Create a new ledger engine with default tuning.
    pub fn new(store: Arc<dyn AccountStore>, rates: Arc<dyn RateProvider>) -> Self {
        Self::with_config(store, rates, LedgerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn AccountStore>,
        rates: Arc<dyn RateProvider>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            rates,
            config,
            metrics: Arc::new(LedgerMetrics::new()),
        }
    }

    /// Share an existing metrics instance.
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Add `amount` to an account, opening it if absent.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn credit(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceChange> {
        let change = self
            .run("credit", || self.try_credit(account_id, amount))
            .await?;

        self.metrics.credit_committed();
        if change.created {
            self.metrics.account_created();
        }
        info!(
            account = %account_id,
            amount = %amount,
            balance = %change.balance_after,
            created = change.created,
            "Credit committed"
        );

        Ok(change)
    }

    /// Take `amount` from an existing account.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn debit(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceChange> {
        let change = self
            .run("debit", || self.try_debit(account_id, amount))
            .await?;

        self.metrics.debit_committed();
        info!(
            account = %account_id,
            amount = %amount,
            balance = %change.balance_after,
            "Debit committed"
        );

        Ok(change)
    }

    /// Move `amount` between two accounts in one store transaction.
    /// The destination is opened with a zero balance if absent.
    #[instrument(skip(self), fields(store = self.store.name()))]
    pub async fn transfer(
        &self,
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let receipt = self
            .run("transfer", || self.try_transfer(source, destination, amount))
            .await?;

        self.metrics.transfer_committed();
        if receipt.credit.created {
            self.metrics.account_created();
        }
        info!(
            transfer_id = %receipt.id,
            source = %source,
            destination = %destination,
            amount = %amount,
            "Transfer committed"
        );

        Ok(receipt)
    }

    /// Current balance, in the home unit or converted to `currency`.
    #[instrument(skip(self))]
    pub async fn get_balance(
        &self,
        account_id: AccountId,
        currency: Option<&Currency>,
    ) -> Result<Decimal> {
        let balance = self
            .run("get_balance", || self.try_get_balance(account_id, currency))
            .await?;

        self.metrics.balance_queried();
        Ok(balance)
    }

    /// Bound `operation` by a caller deadline on top of the engine's own.
    pub async fn with_deadline<T, F>(&self, deadline: &Deadline, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if deadline.is_exceeded() {
            let err = LedgerError::Timeout(deadline.operation.clone());
            self.metrics.record_failure(&err);
            return Err(err);
        }

        match timeout(deadline.remaining(), operation).await {
            Ok(result) => result,
            Err(_) => {
                let err = LedgerError::Timeout(deadline.operation.clone());
                self.metrics.record_failure(&err);
                warn!(operation = %deadline.operation, "Caller deadline exceeded");
                Err(err)
            }
        }
    }

    /// Run one operation under the engine deadline, retrying conflicts.
    async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let metrics = &self.metrics;
        let attempts = self.config.retry.retry(operation, |n| {
            if n > 0 {
                metrics.conflict_retried();
            }
            attempt()
        });

        let result = match timeout(self.config.operation_timeout, attempts).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(format!(
                "{operation} exceeded {}ms",
                self.config.operation_timeout.as_millis()
            ))),
        };

        if let Err(err) = &result {
            self.metrics.record_failure(err);
            warn!(operation, code = err.error_code(), error = %err, "Operation rejected");
        }

        result
    }

    async fn try_credit(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceChange> {
        validate_amount(amount)?;

        if !self.store.exists(account_id).await? {
            return match self.store.create(account_id, amount).await {
                Ok(account) => Ok(BalanceChange::new(
                    account_id,
                    BalanceChangeType::Credit,
                    amount,
                    Decimal::ZERO,
                    account.balance,
                )
                .opening()),
                // Lost the race to open the account; retry as a plain credit.
                Err(LedgerError::DuplicateAccount(id)) => Err(LedgerError::ConcurrentModification(
                    format!("account {id} opened concurrently"),
                )),
                Err(err) => Err(err),
            };
        }

        let account = self.store.get(account_id).await?;
        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::InvalidAmount(amount))?;

        self.store
            .atomic_update(&[BalanceWrite::update(&account, new_balance)])
            .await?;

        Ok(BalanceChange::new(
            account_id,
            BalanceChangeType::Credit,
            amount,
            account.balance,
            new_balance,
        ))
    }

    async fn try_debit(&self, account_id: AccountId, amount: Decimal) -> Result<BalanceChange> {
        validate_amount(amount)?;

        let account = self.store.get(account_id).await?;
        if !account.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: account_id,
                required: amount,
                available: account.balance,
            });
        }

        let new_balance = account.balance - amount;
        self.store
            .atomic_update(&[BalanceWrite::update(&account, new_balance)])
            .await?;

        Ok(BalanceChange::new(
            account_id,
            BalanceChangeType::Debit,
            amount,
            account.balance,
            new_balance,
        ))
    }

    async fn try_transfer(
        &self,
        source_id: AccountId,
        destination_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        validate_amount(amount)?;
        if source_id == destination_id {
            return Err(LedgerError::SelfTransfer(source_id));
        }

        let source = self.store.get(source_id).await?;
        if !source.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: source_id,
                required: amount,
                available: source.balance,
            });
        }

        let (destination_write, destination_before) = match self.store.get(destination_id).await {
            Ok(destination) => {
                let after = destination
                    .balance
                    .checked_add(amount)
                    .ok_or(LedgerError::InvalidAmount(amount))?;
                (BalanceWrite::update(&destination, after), destination.balance)
            }
            Err(LedgerError::NotFound(_)) => {
                debug!(account = %destination_id, "Opening destination account");
                (BalanceWrite::insert(destination_id, amount), Decimal::ZERO)
            }
            Err(err) => return Err(err),
        };
        let created = destination_write.expected_version.is_none();
        let destination_after = destination_write.new_balance;
        let source_after = source.balance - amount;

        self.store
            .atomic_update(&[BalanceWrite::update(&source, source_after), destination_write])
            .await?;

        let debit = BalanceChange::new(
            source_id,
            BalanceChangeType::TransferOut,
            amount,
            source.balance,
            source_after,
        );
        let mut credit = BalanceChange::new(
            destination_id,
            BalanceChangeType::TransferIn,
            amount,
            destination_before,
            destination_after,
        );
        if created {
            credit = credit.opening();
        }

        Ok(TransferReceipt {
            id: TransferId::new(),
            amount,
            debit,
            credit,
        })
    }

    async fn try_get_balance(
        &self,
        account_id: AccountId,
        currency: Option<&Currency>,
    ) -> Result<Decimal> {
        let account = self.store.get(account_id).await?;

        let Some(currency) = currency else {
            return Ok(account.balance);
        };

        let rate = self
            .rates
            .lookup_rate(currency)
            .await
            .map_err(|e| rate_error(currency, e))?;

        rate.convert_from_home(account.balance)
            .map_err(|e| rate_error(currency, e))
    }
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if is_valid_amount(amount) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

fn rate_error(currency: &Currency, err: RateError) -> LedgerError {
    match err {
        RateError::UnknownCurrency(code) => LedgerError::UnknownCurrency(code),
        other => LedgerError::RateUnavailable {
            currency: currency.clone(),
            reason: other.to_string(),
        },
    }
}
