//! ledgersync main entry point

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use env_logger::Env;
use ledgersync_config::Config;
use ledgersync_core::{
    locate, progress_channel, DisplayItem, LedgerStore, ProgressState, SyncEngine, SyncOutcome, TransactionAccumulator,
};
use ledgersync_parser::{parse_amount, Transaction, TransactionLine};
use ledgersync_utils::{format_amount, format_number};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[command(name = "ledgersync")]
#[command(version = "0.1.0")]
#[command(about = "Synchronize with an hledger-web server from the command line", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Retrieve accounts and transactions and store them locally
    Sync,
    /// Send a new transaction to the server
    Add {
        /// Transaction date, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        description: String,
        /// ACCOUNT[=AMOUNT [CURRENCY]], repeatable
        #[arg(short, long = "posting", required = true)]
        postings: Vec<String>,
    },
    /// Ask the server for its version
    Version,
    /// List stored accounts
    Accounts,
    /// List stored transactions, newest first
    Journal {
        /// Show running totals for this account instead of the configured one
        #[arg(long)]
        account: Option<String>,
        /// Start the listing at this date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print a default configuration file
    DefaultConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::DefaultConfig = args.command {
        print!("{}", Config::generate_default());
        return Ok(());
    }

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => bail!("Failed to load configuration from {}\n{}", args.config.display(), e.to_details()),
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(config.logging.level.as_str())).init();
    log::info!("server {} (API {})", config.server.url, config.server.api_version);

    let engine = SyncEngine::from_config(&config)?;

    match args.command {
        Command::Sync => sync(&engine),
        Command::Add {
            date,
            description,
            postings,
        } => add(&engine, date, description, &postings),
        Command::Version => version(&engine),
        Command::Accounts => accounts(&engine),
        Command::Journal { account, date } => {
            journal(&engine, account.or_else(|| config.display.accumulate_account.clone()), date)
        }
        Command::DefaultConfig => Ok(()),
    }
}

fn sync(engine: &SyncEngine) -> Result<()> {
    let runtime = Runtime::new()?;
    let (sender, mut receiver) = progress_channel();
    let handle = engine.start_sync(Arc::new(sender), |outcome| {
        log::debug!("retrieval ended: {:?}", outcome.error());
    })?;

    runtime.block_on(async {
        let mut interrupted = false;
        loop {
            tokio::select! {
                changed = receiver.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let progress = receiver.borrow_and_update().clone();
                    eprintln!("[sync] {}", progress);
                    if progress.state() == ProgressState::Finished {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    eprintln!("[sync] interrupted, cancelling");
                    handle.cancel();
                    interrupted = true;
                }
            }
        }
    });

    let outcome = handle.join()?;
    engine.wait_for_saves()?;

    match outcome {
        SyncOutcome::Completed(snapshot) => {
            println!(
                "{} accounts, {} transactions stored for profile '{}'",
                format_number(snapshot.accounts.len()),
                format_number(snapshot.transactions.len()),
                engine.profile()
            );
            Ok(())
        }
        SyncOutcome::Cancelled => {
            println!("Cancelled, nothing stored");
            Ok(())
        }
        SyncOutcome::Failed(message) => bail!(message),
    }
}

fn add(engine: &SyncEngine, date: Option<NaiveDate>, description: String, postings: &[String]) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let mut transaction = Transaction::new(0, date, description);
    for posting in postings {
        transaction.add_line(parse_posting(posting)?);
    }

    let handle = engine.start_submit(transaction, |result| {
        if result.is_ok() {
            log::info!("transaction accepted");
        }
    })?;
    handle.join()??;
    println!("Transaction sent");
    Ok(())
}

/// `ACCOUNT[=AMOUNT [CURRENCY]]`
fn parse_posting(text: &str) -> Result<TransactionLine> {
    let (account, rest) = match text.split_once('=') {
        Some((account, rest)) => (account.trim(), Some(rest.trim())),
        None => (text.trim(), None),
    };
    if account.is_empty() {
        bail!("posting '{}' has no account", text);
    }

    let (amount, currency) = match rest.filter(|r| !r.is_empty()) {
        None => (None, None),
        Some(rest) => {
            let mut parts = rest.split_whitespace();
            let number = parts.next().ok_or_else(|| anyhow!("posting '{}' has no amount", text))?;
            let amount = parse_amount(number).with_context(|| format!("in posting '{}'", text))?;
            (Some(amount), parts.next().map(str::to_string))
        }
    };
    Ok(TransactionLine::new(account, amount, currency))
}

fn version(engine: &SyncEngine) -> Result<()> {
    match engine.probe_version()? {
        Some(version) => {
            println!("Server version {}", version);
            match version.suggested_api() {
                Some(api) => println!("Suggested API version {}", api),
                None => println!("No structured API; use the html setting"),
            }
        }
        None => println!("Server version not recognised"),
    }
    Ok(())
}

fn accounts(engine: &SyncEngine) -> Result<()> {
    let stored = engine.store().load(engine.profile())?;
    if let Some(at) = stored.last_sync {
        println!("Last sync {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }
    for entry in &stored.accounts {
        let account = &entry.account;
        let amounts: Vec<String> = account
            .amounts
            .iter()
            .map(|(currency, value)| format!("{} {}", format_number(format_amount(*value)), currency))
            .collect();
        println!(
            "{}{:<40} {}",
            "  ".repeat(account.depth),
            account.name,
            amounts.join(", ").trim_end()
        );
    }
    Ok(())
}

fn journal(engine: &SyncEngine, account: Option<String>, date: Option<NaiveDate>) -> Result<()> {
    let stored = engine.store().load(engine.profile())?;
    let accumulator = TransactionAccumulator::from_retrieved(account, &stored.transactions);
    let items = accumulator.items(Local::now().date_naive());
    let start = date.map(|d| locate(&items, d)).unwrap_or(0);

    for item in &items[start..] {
        match item {
            DisplayItem::Header => println!(
                "{} transactions, {} to {}",
                format_number(accumulator.transaction_count()),
                accumulator.earliest_date().map(|d| d.to_string()).unwrap_or_default(),
                accumulator.latest_date().map(|d| d.to_string()).unwrap_or_default()
            ),
            DisplayItem::DateDelimiter { date, month_boundary } => {
                if *month_boundary {
                    println!("\n=== {} ===", date.format("%B %Y"));
                }
                println!("--- {} ---", date.format("%a %d"));
            }
            DisplayItem::Transaction(tx) => {
                println!("  {}", tx.description);
                if let Some(comment) = &tx.comment {
                    println!("    ; {}", comment);
                }
                for line in &tx.lines {
                    let amount = line
                        .amount
                        .map(|a| format!("{} {}", format_number(format_amount(a)), line.currency_key()))
                        .unwrap_or_default();
                    println!("    {:<40} {}", line.account_name, amount.trim_end());
                }
                if let Some(total) = &tx.running_total {
                    println!("    = {}", total.replace('\n', ", "));
                }
            }
        }
    }
    Ok(())
}
