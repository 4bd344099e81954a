use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use flashloan_client::{
    config::load_settings_from, load_settings, BatchForm, BatchStatus, BatchStore, HistoryRow,
    HistoryViewer, HttpFlashLoanBackend, StoreEvent,
};
use flashloan_shared::domain::Address;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flashloan", about = "Multi-recipient flash loan batches")]
struct Cli {
    /// Backend base URL; overrides settings file and environment.
    #[arg(long)]
    api_url: Option<String>,
    /// Settings file (defaults to ./flashloan.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a batch form file without contacting the backend.
    Validate {
        #[arg(long)]
        form: PathBuf,
    },
    Quote {
        #[arg(long)]
        form: PathBuf,
    },
    Risk {
        #[arg(long)]
        form: PathBuf,
        #[arg(long)]
        initiator: Address,
    },
    /// Risk check, quote, then execute.
    Execute {
        #[arg(long)]
        form: PathBuf,
        #[arg(long)]
        initiator: Address,
        #[arg(long)]
        skip_risk: bool,
    },
    History {
        #[arg(long)]
        user: Address,
        /// Keep polling until interrupted.
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Show per-recipient allocations.
        #[arg(long)]
        expand: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path, |key| std::env::var(key).ok())?,
        None => load_settings()?,
    };
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    info!(api = %settings.api_base_url, "flashloan: using backend");

    let backend = Arc::new(HttpFlashLoanBackend::from_settings(&settings)?);
    let store = BatchStore::new(backend);

    match cli.command {
        Command::Validate { form } => {
            let form = read_form(&form)?;
            let batch = form.validate().map_err(|err| anyhow!(err))?;
            println!(
                "valid: {} recipients, total {} of asset {}",
                batch.allocations.len(),
                batch.total_amount,
                batch.asset
            );
        }
        Command::Quote { form } => {
            store.replace_form(read_form(&form)?).await;
            ensure_ok(&store, store.request_quote().await).await?;
            let quote = store
                .quote()
                .await
                .ok_or_else(|| anyhow!("quote missing after success"))?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        Command::Risk { form, initiator } => {
            store.replace_form(read_form(&form)?).await;
            store.set_initiator(Some(initiator)).await;
            ensure_ok(&store, store.assess_risk().await).await?;
            print_risk(&store).await;
        }
        Command::Execute {
            form,
            initiator,
            skip_risk,
        } => {
            store.replace_form(read_form(&form)?).await;
            store.set_initiator(Some(initiator)).await;
            if !skip_risk {
                ensure_ok(&store, store.assess_risk().await).await?;
                print_risk(&store).await;
            }
            ensure_ok(&store, store.request_quote().await).await?;
            if let Some(quote) = store.quote().await {
                println!("premium {} ({} bps)", quote.premium, quote.fee_bps);
            }
            let batch_id = store.execute().await;
            ensure_ok(&store, batch_id.is_some()).await?;
            let snapshot = store.snapshot().await;
            let tx_hash = snapshot
                .user_batches
                .first()
                .and_then(|record| record.tx_hash.clone())
                .unwrap_or_else(|| "-".into());
            println!(
                "executed batch {} tx {}",
                batch_id.map(|id| id.to_string()).unwrap_or_default(),
                tx_hash
            );
        }
        Command::History {
            user,
            watch,
            interval_secs,
            expand,
        } => {
            let mut viewer = HistoryViewer::new(Arc::clone(&store), user)
                .with_explorer(settings.explorer_tx_url.clone());
            if !watch {
                ensure_ok(&store, viewer.refresh().await).await?;
                if expand {
                    expand_visible(&mut viewer, &store).await;
                }
                print_rows(&viewer.rows().await);
                return Ok(());
            }

            let interval = interval_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| settings.history_poll_interval());
            let mut events = store.subscribe_events();
            let poller = viewer.spawn_poller(interval);
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(StoreEvent::HistoryUpdated { .. }) => {
                            if expand {
                                expand_visible(&mut viewer, &store).await;
                            }
                            print_rows(&viewer.rows().await);
                        }
                        Ok(StoreEvent::Error { message, .. }) => eprintln!("error: {message}"),
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "flashloan: history events lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            poller.abort();
        }
    }

    Ok(())
}

fn read_form(path: &Path) -> Result<BatchForm> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read form file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse form file '{}'", path.display()))
}

async fn ensure_ok(store: &BatchStore, ok: bool) -> Result<()> {
    if ok {
        return Ok(());
    }
    Err(anyhow!(store
        .last_error()
        .await
        .unwrap_or_else(|| "request was superseded".into())))
}

async fn print_risk(store: &BatchStore) {
    let Some(risk) = store.snapshot().await.risk else {
        return;
    };
    println!(
        "risk score {:.1} recommendation {:?}",
        risk.risk_score, risk.recommendation
    );
    for warning in &risk.warnings {
        println!("  warning: {warning}");
    }
}

async fn expand_visible(viewer: &mut HistoryViewer, store: &BatchStore) {
    let ids = store
        .user_batches()
        .await
        .into_iter()
        .map(|record| record.batch_id);
    viewer.expand_all(ids);
}

fn print_rows(rows: &[HistoryRow]) {
    if rows.is_empty() {
        println!("no batches");
        return;
    }
    for row in rows {
        let status = match &row.status {
            BatchStatus::Succeeded => "ok".to_string(),
            BatchStatus::Failed(Some(reason)) => format!("failed: {reason}"),
            BatchStatus::Failed(None) => "failed".to_string(),
        };
        println!(
            "{}  {}  {} {} (premium {})  {} recipients  [{}]",
            row.executed_at,
            row.batch_id,
            row.total_amount,
            row.asset,
            row.premium,
            row.recipient_count,
            status
        );
        if let Some(lines) = &row.allocations {
            for line in lines {
                println!("    {} <- {}", line.recipient, line.amount);
            }
        }
        match (&row.tx_link, &row.tx_hash) {
            (Some(link), _) => println!("    tx {link}"),
            (None, Some(hash)) => println!("    tx {hash}"),
            (None, None) => {}
        }
    }
}
