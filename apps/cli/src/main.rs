mod config;
mod main_lib;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use snapledger_core::movements::MovementRepositoryTrait;
use snapledger_core::portfolio::snapshot::SnapshotRepositoryTrait;
use snapledger_core::prices::{PriceCacheTrait, PricePoint};
use snapledger_core::utils::{CancelFlag, DateRange};

use config::Config;
use main_lib::{build_state, init_tracing, AppState};

#[derive(Parser)]
#[command(name = "snapledger")]
#[command(about = "Daily per-currency account snapshots from broker statements")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a statement CSV into an account and recalculate its snapshots
    Import {
        #[arg(short, long)]
        account: String,
        file: PathBuf,
    },
    /// Resume an interrupted or cancelled import session
    Resume { session_id: String },
    /// List resumable import sessions of an account
    Sessions {
        #[arg(short, long)]
        account: String,
    },
    /// Recalculate snapshots over a date range
    Recalculate {
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Force the single-date processor for this run
        #[arg(long)]
        single_date: bool,
    },
    /// Print stored snapshots over a date range
    Snapshots {
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Record a closing price
    Price {
        ticker: String,
        currency: String,
        date: NaiveDate,
        close: Decimal,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancels the flag on the first Ctrl-C so imports stop at the next chunk
/// or date boundary.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current unit of work");
            flag.cancel();
        }
    });
    cancel
}

async fn run(state: AppState, command: Command) -> Result<()> {
    match command {
        Command::Import { account, file } => {
            let cancel = cancel_on_ctrl_c();
            let summary = state.imports.start_import(&account, &file, &cancel).await?;
            print_json(&summary)
        }
        Command::Resume { session_id } => {
            let cancel = cancel_on_ctrl_c();
            let summary = state.imports.resume_import(&session_id, &cancel).await?;
            print_json(&summary)
        }
        Command::Sessions { account } => {
            print_json(&state.imports.find_resumable_sessions(&account)?)
        }
        Command::Recalculate {
            account,
            from,
            to,
            single_date,
        } => {
            let range = DateRange::new(from, to)?;
            if single_date {
                state.coordinator.enable_batch_mode(false);
            }
            tracing::info!(
                "Recalculating {} over {} movements on record",
                account,
                state.movements.count_movements(&account)?
            );
            let cancel = cancel_on_ctrl_c();
            let report = state
                .coordinator
                .recalculate_with_cancel(&account, range, &cancel)
                .await?;
            print_json(&report)
        }
        Command::Snapshots { account, from, to } => {
            let range = DateRange::new(from, to)?;
            let snapshots = state
                .snapshots
                .get_snapshots_in_range(&account, range.start, range.end)?;
            print_json(&snapshots)
        }
        Command::Price {
            ticker,
            currency,
            date,
            close,
        } => {
            let written = state
                .prices
                .upsert_prices(vec![PricePoint {
                    ticker,
                    currency,
                    date,
                    close,
                }])
                .await?;
            print_json(&serde_json::json!({ "written": written }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config.log_format);
    let state = build_state(&config)?;
    run(state, cli.command).await
}
