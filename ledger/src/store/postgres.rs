//! Postgres-backed account store.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tally_common::{AccountId, LedgerError, Result};
use tracing::{debug, instrument, warn};

use super::{conflict, validate_batch, AccountStore, BalanceWrite};
use crate::account::Account;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id  BIGINT      PRIMARY KEY,
    balance     NUMERIC     NOT NULL CHECK (balance >= 0),
    version     BIGINT      NOT NULL DEFAULT 1,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const COLUMNS: &str = "account_id, balance, version, created_at, updated_at";

/// Account store over a Postgres connection pool.
///
/// Every write is guarded by the row version read earlier; under READ
/// COMMITTED a concurrent commit makes the guarded `UPDATE` match zero rows,
/// which aborts the transaction with `ConcurrentModification`. Rows in a batch
/// are written in ascending id order so two batches never wait on each other
/// in opposite orders.
#[derive(Clone)]
pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Self::new(pool))
    }

    /// Create the `accounts` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn fetch(&self, account_id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(account_from_row).transpose()
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn exists(&self, account_id: AccountId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM accounts WHERE account_id = $1)")
            .bind(account_id.as_i64())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.try_get::<bool, _>(0).map_err(map_sqlx_error)
    }

    #[instrument(skip(self))]
    async fn create(&self, account_id: AccountId, initial_balance: Decimal) -> Result<Account> {
        validate_batch(&[BalanceWrite::insert(account_id, initial_balance)])?;

        let row = sqlx::query(&format!(
            "INSERT INTO accounts (account_id, balance) VALUES ($1, $2) RETURNING {COLUMNS}"
        ))
        .bind(account_id.as_i64())
        .bind(initial_balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if sqlstate(&e).as_deref() == Some("23505") {
                LedgerError::DuplicateAccount(account_id)
            } else {
                map_sqlx_error(e)
            }
        })?;

        account_from_row(&row)
    }

    async fn get(&self, account_id: AccountId) -> Result<Account> {
        self.fetch(account_id)
            .await?
            .ok_or(LedgerError::NotFound(account_id))
    }

    #[instrument(skip(self))]
    async fn adjust_balance(&self, account_id: AccountId, delta: Decimal) -> Result<Account> {
        // Single statement; Postgres holds the row lock for the read-modify-write.
        let row = sqlx::query(&format!(
            "UPDATE accounts \
             SET balance = balance + $2, version = version + 1, updated_at = now() \
             WHERE account_id = $1 AND balance + $2 >= 0 \
             RETURNING {COLUMNS}"
        ))
        .bind(account_id.as_i64())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => account_from_row(&row),
            None => match self.fetch(account_id).await? {
                Some(current) => Err(LedgerError::InsufficientFunds {
                    account: account_id,
                    required: -delta,
                    available: current.balance,
                }),
                None => Err(LedgerError::NotFound(account_id)),
            },
        }
    }

    #[instrument(skip(self, writes), fields(writes = writes.len()))]
    async fn atomic_update(&self, writes: &[BalanceWrite]) -> Result<Vec<Account>> {
        validate_batch(writes)?;

        let mut order: Vec<usize> = (0..writes.len()).collect();
        order.sort_by_key(|&i| writes[i].account_id);

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut written: Vec<Option<Account>> = vec![None; writes.len()];

        for i in order {
            let write = &writes[i];
            let row = match write.expected_version {
                Some(version) => sqlx::query(&format!(
                    "UPDATE accounts \
                     SET balance = $2, version = version + 1, updated_at = now() \
                     WHERE account_id = $1 AND version = $3 \
                     RETURNING {COLUMNS}"
                ))
                .bind(write.account_id.as_i64())
                .bind(write.new_balance)
                .bind(version)
                .fetch_optional(&mut *tx)
                .await,
                None => sqlx::query(&format!(
                    "INSERT INTO accounts (account_id, balance) VALUES ($1, $2) \
                     ON CONFLICT (account_id) DO NOTHING \
                     RETURNING {COLUMNS}"
                ))
                .bind(write.account_id.as_i64())
                .bind(write.new_balance)
                .fetch_optional(&mut *tx)
                .await,
            };

            let row = match row {
                Ok(Some(row)) => row,
                Ok(None) => {
                    let detail = match write.expected_version {
                        Some(version) => format!("version {version} is stale"),
                        None => "created concurrently".to_string(),
                    };
                    warn!(account = %write.account_id, %detail, "Write conflict, rolling back");
                    rollback(tx).await;
                    return Err(conflict(write.account_id, &detail));
                }
                Err(e) => {
                    rollback(tx).await;
                    return Err(map_sqlx_error(e));
                }
            };

            written[i] = Some(account_from_row(&row)?);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(writes = writes.len(), "Batch committed");

        Ok(written.into_iter().flatten().collect())
    }
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Postgres>) {
    if let Err(e) = tx.rollback().await {
        // The server discards the transaction when the connection drops.
        warn!(error = %e, "Explicit rollback failed");
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: AccountId::new(row.try_get("account_id").map_err(map_sqlx_error)?),
        balance: row.try_get("balance").map_err(map_sqlx_error)?,
        version: row.try_get("version").map_err(map_sqlx_error)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        updated_at: row.try_get("updated_at").map_err(map_sqlx_error)?,
    })
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Map driver errors onto the ledger taxonomy.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(ref db) => {
            match sqlstate(&err).as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => {
                    LedgerError::ConcurrentModification(db.message().to_string())
                }
                // unique_violation outside of a strict create
                Some("23505") => LedgerError::ConcurrentModification(db.message().to_string()),
                _ => LedgerError::Storage(err.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut => {
            LedgerError::Timeout("waiting for a database connection".to_string())
        }
        other => LedgerError::Storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    //! Run with `TALLY_TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

    use super::*;
    use rust_decimal_macros::dec;

    async fn store() -> PostgresAccountStore {
        let url = std::env::var("TALLY_TEST_DATABASE_URL")
            .expect("TALLY_TEST_DATABASE_URL must be set for Postgres tests");
        let store = PostgresAccountStore::connect(&url, 4, Duration::from_secs(5))
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn fresh_id() -> AccountId {
        // Random ids keep reruns against one database independent.
        AccountId::new(rand::random::<u32>() as i64 + 1_000_000)
    }

    #[test]
    fn test_pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            LedgerError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            LedgerError::Storage(_)
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_get_and_duplicate() {
        let store = store().await;
        let id = fresh_id();

        let created = store.create(id, dec!(12.50)).await.unwrap();
        assert_eq!(created.balance, dec!(12.50));
        assert!(store.exists(id).await.unwrap());
        assert!(matches!(
            store.create(id, dec!(1)).await,
            Err(LedgerError::DuplicateAccount(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_adjust_balance_refuses_overdraft() {
        let store = store().await;
        let id = fresh_id();
        store.create(id, dec!(5)).await.unwrap();

        assert_eq!(store.adjust_balance(id, dec!(-2)).await.unwrap().balance, dec!(3));
        assert!(matches!(
            store.adjust_balance(id, dec!(-4)).await,
            Err(LedgerError::InsufficientFunds { .. })
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_stale_batch_rolls_back() {
        let store = store().await;
        let (a, b) = (fresh_id(), fresh_id());
        let source = store.create(a, dec!(10)).await.unwrap();
        store.adjust_balance(a, dec!(1)).await.unwrap();

        let result = store
            .atomic_update(&[
                BalanceWrite::insert(b, dec!(7)),
                BalanceWrite::update(&source, dec!(3)),
            ])
            .await;

        assert!(matches!(result, Err(LedgerError::ConcurrentModification(_))));
        assert!(!store.exists(b).await.unwrap());
        assert_eq!(store.get(a).await.unwrap().balance, dec!(11));
    }
}
