use chrono::Utc;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use oja_ledger::application::settlement::SettlementEngine;
use oja_ledger::domain::UserId;
use oja_ledger::domain::money::Amount;
use oja_ledger::domain::ports::{SettlementStore, SettlementStoreRef};
use oja_ledger::domain::tax::TaxPolicy;
use oja_ledger::domain::transaction::{TransactionId, TransactionStatus, TransactionType};
use oja_ledger::domain::wallet::BankAccount;
use oja_ledger::error::SettlementError;
use oja_ledger::infrastructure::gateway::ScriptedGateway;
use oja_ledger::infrastructure::in_memory::InMemoryStore;
use oja_ledger::infrastructure::vendors::InMemoryVendorDirectory;
use oja_ledger::interfaces::csv::balance_writer::BalanceWriter;
use oja_ledger::interfaces::json::event_reader::{EventReader, SettlementEvent};

/// Replays a settlement event log and prints final wallet balances as CSV.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input settlement events, one JSON object per line
    events: PathBuf,

    /// Tax policy JSON file. Defaults to the built-in NGN policy.
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[cfg(feature = "storage-rocksdb")]
fn build_store(cli: &Cli) -> Result<SettlementStoreRef> {
    use oja_ledger::infrastructure::rocksdb::RocksDbStore;
    match &cli.db_path {
        Some(path) => Ok(Arc::new(RocksDbStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn build_store(_cli: &Cli) -> Result<SettlementStoreRef> {
    Ok(Arc::new(InMemoryStore::new()))
}

fn load_policy(path: Option<&PathBuf>) -> Result<TaxPolicy> {
    match path {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            serde_json::from_reader(file).into_diagnostic()
        }
        None => Ok(TaxPolicy::default_ngn(Utc::now())),
    }
}

/// The CLI resolves approve/reject events by party rather than transaction
/// id, since ids are generated during the replay itself.
async fn pending_withdrawal(
    store: &SettlementStoreRef,
    user: &UserId,
) -> oja_ledger::error::Result<TransactionId> {
    store
        .transactions()
        .await?
        .into_iter()
        .find(|tx| {
            tx.kind == TransactionType::WalletWithdrawal
                && tx.status == TransactionStatus::Pending
                && tx
                    .entries
                    .iter()
                    .any(|e| e.principal && e.user.as_ref() == Some(user))
        })
        .map(|tx| tx.id)
        .ok_or_else(|| {
            SettlementError::Validation(format!("no pending withdrawal for {user}"))
        })
}

async fn apply_event(
    engine: &SettlementEngine,
    store: &SettlementStoreRef,
    gateway: &ScriptedGateway,
    event: SettlementEvent,
) -> oja_ledger::error::Result<()> {
    match event {
        SettlementEvent::Payment { order, reference } => {
            // the replayed log only contains confirmed payments
            gateway.record_payment(&reference, order.total());
            engine.capture_payment(order, &reference).await?;
        }
        SettlementEvent::Refund {
            order,
            amount,
            reference,
            actor,
        } => {
            engine
                .refund(&order, amount, &reference, actor.as_deref())
                .await?;
        }
        SettlementEvent::LinkBank {
            user,
            account_name,
            account_number,
            bank_code,
        } => {
            engine
                .link_bank_account(
                    &user,
                    BankAccount {
                        account_name,
                        account_number,
                        bank_code,
                        is_verified: true,
                    },
                )
                .await?;
        }
        SettlementEvent::WithdrawalRequest { user, amount } => {
            engine
                .request_withdrawal(&user, Amount::new(amount)?)
                .await?;
        }
        SettlementEvent::WithdrawalApprove { user, approver } => {
            let id = pending_withdrawal(store, &user).await?;
            engine.approve_withdrawal(&id, approver.as_deref()).await?;
        }
        SettlementEvent::WithdrawalReject { user, reason } => {
            let id = pending_withdrawal(store, &user).await?;
            engine
                .reject_withdrawal(&id, Some("operator"), reason.as_deref())
                .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let store = build_store(&cli)?;
    store
        .put_policy(load_policy(cli.policy.as_ref())?)
        .await
        .into_diagnostic()?;

    let gateway = ScriptedGateway::new();
    let vendors = InMemoryVendorDirectory::new();
    let engine = SettlementEngine::new(
        store.clone(),
        Arc::new(gateway.clone()),
        Arc::new(vendors),
    );

    let file = File::open(&cli.events).into_diagnostic()?;
    let reader = EventReader::new(file);
    for event in reader.events() {
        match event {
            Ok(event) => {
                if let Err(e) = apply_event(&engine, &store, &gateway, event).await {
                    eprintln!("Error processing event: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading event: {e}");
            }
        }
    }

    let wallets = store.wallets().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_wallets(&wallets).into_diagnostic()?;

    Ok(())
}
