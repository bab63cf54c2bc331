//! Tally operator CLI
//!
//! Runs single ledger operations or a concurrent transfer simulation and
//! prints the outcome as JSON on stdout. Logs go to stderr.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_common::{AccountId, Currency, LedgerError};
use tally_service::{build_engine, run_transfer_simulation, ServiceConfig, SimulationParams};

/// Tally ledger CLI
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Tally ledger operations and concurrency simulation", version)]
struct Args {
    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

/// Single operations only persist with `DATABASE_URL` set; otherwise each
/// invocation starts from an empty in-memory ledger.
#[derive(Subcommand, Debug)]
enum Command {
    /// Add funds, opening the account if needed
    Credit { account: AccountId, amount: Decimal },

    /// Remove funds from an existing account
    Debit { account: AccountId, amount: Decimal },

    /// Move funds between two accounts
    Transfer {
        source: AccountId,
        destination: AccountId,
        amount: Decimal,
    },

    /// Show a balance, optionally converted
    Balance {
        account: AccountId,

        /// ISO 4217 code to convert into
        #[arg(short, long)]
        currency: Option<String>,
    },

    /// Fire concurrent transfers between two accounts
    Simulate {
        /// Number of transfers
        #[arg(short, long, default_value = "100")]
        transfers: usize,

        /// Transfers in flight at once
        #[arg(short, long, default_value = "16")]
        concurrency: usize,

        /// Amount moved by each transfer
        #[arg(long, default_value = "1")]
        amount: Decimal,

        #[arg(long, default_value = "1")]
        source: AccountId,

        #[arg(long, default_value = "2")]
        destination: AccountId,

        /// Append engine counters in Prometheus text format
        #[arg(long)]
        prometheus: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = ServiceConfig::from_env();

    init_logging(&config, args.pretty);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    if config.is_ephemeral() && !matches!(args.command, Command::Simulate { .. }) {
        warn!("DATABASE_URL not set; this operation runs against an empty in-memory ledger");
    }

    let engine = Arc::new(build_engine(&config).await?);
    info!(command = ?args.command, "Running command");

    match args.command {
        Command::Credit { account, amount } => emit(engine.credit(account, amount).await),
        Command::Debit { account, amount } => emit(engine.debit(account, amount).await),
        Command::Transfer {
            source,
            destination,
            amount,
        } => emit(engine.transfer(source, destination, amount).await),
        Command::Balance { account, currency } => {
            let currency = currency.map(Currency::new);
            let balance = engine.get_balance(account, currency.as_ref()).await;
            emit(balance.map(|balance| {
                json!({
                    "account_id": account,
                    "currency": currency.unwrap_or_else(Currency::home),
                    "balance": balance,
                })
            }))
        }
        Command::Simulate {
            transfers,
            concurrency,
            amount,
            source,
            destination,
            prometheus,
        } => {
            let params = SimulationParams {
                source,
                destination,
                transfers,
                concurrency,
                amount,
            };
            let report = run_transfer_simulation(engine.clone(), &params).await;
            let conserved = report.as_ref().map(|r| r.conserved).unwrap_or(true);
            emit(report)?;

            if prometheus {
                print!("{}", engine.metrics().to_prometheus());
            }
            if !conserved {
                return Err(anyhow::anyhow!("balances were not conserved"));
            }
            Ok(())
        }
    }
}

fn init_logging(config: &ServiceConfig, pretty: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if pretty {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

/// Print an operation outcome as JSON; ledger errors also fail the process.
fn emit<T: Serialize>(result: Result<T, LedgerError>) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            let body = json!({
                "error": err.error_code(),
                "message": err.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Err(err.into())
        }
    }
}
