//! tallysync - command-line driver for the tallysync data layer.
//!
//! Each command mounts the same page controllers a front end would, so a
//! run exercises the request cache, the persisted snapshots and the
//! notifier end to end. Notifications raised during a command are printed
//! to stderr once it finishes.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tallysync_core::auth::{Session, SessionData};
use tallysync_core::models::{Client, Transaction};
use tallysync_core::notify::NotifierEvent;
use tallysync_core::sync::{LoadOutcome, MutationOutcome, Record};
use tallysync_core::{
    CollectionPage, DashboardPage, FilterSnapshot, HttpApiClient, PersistentStore, ResourceKind,
    SyncConfig, SyncContext,
};

/// Log file written under the cache directory with `--log-file`.
const LOG_FILE: &str = "tallysync.log";

#[derive(Parser)]
#[command(name = "tallysync", version, about = "Browse and edit tallysync data from the terminal")]
struct Cli {
    /// Also write logs to tallysync.log in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show one page of clients or transactions
    List {
        resource: Resource,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show the dashboard summary and analytics
    Dashboard {
        /// Print raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete one client or transaction
    Delete { resource: Resource, id: String },
    /// Store a bearer token for later commands
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        user: String,
    },
    /// Forget the session and every saved snapshot
    Logout,
    /// Show how old each saved snapshot is
    Ages,
}

#[derive(Clone, Copy, ValueEnum)]
enum Resource {
    Clients,
    Transactions,
}

impl Resource {
    fn kind(self) -> ResourceKind {
        match self {
            Resource::Clients => ResourceKind::Clients,
            Resource::Transactions => ResourceKind::Transactions,
        }
    }
}

/// Initialize the tracing subscriber. The returned guard flushes the file
/// writer and must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level, e.g. RUST_LOG=tallysync_core=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn load_config() -> Result<SyncConfig> {
    let mut config = SyncConfig::load()?;
    if let Ok(url) = std::env::var("TALLYSYNC_API_URL") {
        config.api_base_url = url;
    }
    if let Ok(user) = std::env::var("TALLYSYNC_USER") {
        config.last_user = Some(user);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = load_config()?;
    let cache_dir = config.cache_dir()?;
    let _log_guard = init_tracing(cli.log_file.then_some(cache_dir.as_path()));
    info!(cache_dir = %cache_dir.display(), "tallysync starting");

    if let Command::Login { token, user } = &cli.command {
        return login(&mut config, token, user);
    }

    let mut session = Session::new(cache_dir.clone());
    if let Err(e) = session.load() {
        warn!(error = %e, "Ignoring unreadable session file");
    }
    if let Ok(token) = std::env::var("TALLYSYNC_TOKEN") {
        let user = config.last_user.clone().unwrap_or_default();
        session.update(SessionData::new(token, user));
    }

    let ctx = build_context(config, &session, cache_dir)?;
    let mut events = ctx.notifier.subscribe();

    let result = match cli.command {
        Command::List { resource, page, search } => {
            let filters = match search {
                Some(search) => FilterSnapshot::new().with("search", search),
                None => FilterSnapshot::new(),
            };
            match resource {
                Resource::Clients => list::<Client>(&ctx, resource.kind(), filters, page, render_client).await,
                Resource::Transactions => {
                    list::<Transaction>(&ctx, resource.kind(), filters, page, render_transaction).await
                }
            }
        }
        Command::Dashboard { json } => dashboard(&ctx, json).await,
        Command::Delete { resource, id } => match resource {
            Resource::Clients => delete::<Client>(&ctx, resource.kind(), &id).await,
            Resource::Transactions => delete::<Transaction>(&ctx, resource.kind(), &id).await,
        },
        Command::Logout => ctx.logout(&mut session),
        Command::Ages => {
            ages(&ctx);
            Ok(())
        }
        Command::Login { .. } => Ok(()),
    };

    print_notifications(&mut events);
    result
}

fn build_context(config: SyncConfig, session: &Session, cache_dir: PathBuf) -> Result<SyncContext> {
    let mut api = HttpApiClient::new(&config.api_base_url, config.request_timeout())
        .context("Failed to build HTTP client")?;
    if let Some(token) = session.token() {
        api.set_token(token.to_string());
    }
    let store = PersistentStore::new(cache_dir)?;
    Ok(SyncContext::new(Arc::new(api), store, config))
}

fn login(config: &mut SyncConfig, token: &str, user: &str) -> Result<()> {
    config.last_user = Some(user.to_string());
    config.save()?;

    let mut session = Session::new(config.cache_dir()?);
    session.update(SessionData::new(token, user));
    session.save()?;
    eprintln!("Logged in as {}", user);
    Ok(())
}

async fn list<T: Record>(
    ctx: &SyncContext,
    kind: ResourceKind,
    filters: FilterSnapshot,
    page: u32,
    render: fn(&T) -> String,
) -> Result<()> {
    let view = CollectionPage::<T>::new(kind, ctx.clone()).with_query(filters, page);
    let outcome = view.mount().await;
    view.unmount();

    let collection = view.collection();
    for item in &collection.items {
        println!("{}", render(item));
    }

    let pagination = collection.pagination;
    match outcome {
        LoadOutcome::Failed(_) if !collection.is_empty() => {
            let age = ctx
                .store
                .age(&ctx.storage_key(kind))
                .unwrap_or_else(|| "unknown".to_string());
            eprintln!("{} {} (saved {}, server unreachable)", collection.len(), kind.name(), age);
        }
        _ => eprintln!(
            "{} of {} {} (page {}/{})",
            collection.len(),
            pagination.total_items,
            kind.name(),
            pagination.page,
            pagination.total_pages.max(1)
        ),
    }
    Ok(())
}

fn render_client(client: &Client) -> String {
    format!(
        "{:<26} {:<36} {:>12.2}",
        client.id,
        client.display_name(),
        client.balance
    )
}

fn render_transaction(tx: &Transaction) -> String {
    format!(
        "{:<26} {} {:<36} {:>12.2} {}",
        tx.id,
        tx.date,
        tx.description,
        tx.signed_amount(),
        tx.currency
    )
}

async fn dashboard(ctx: &SyncContext, json: bool) -> Result<()> {
    let view = DashboardPage::new(ctx.clone());
    view.mount().await;
    view.unmount();
    let state = view.state();

    if json {
        let out = serde_json::json!({
            "summary": state.summary,
            "analytics": state.analytics,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match state.summary {
        Some(summary) => {
            println!("Income        {:>12.2}", summary.total_income);
            println!("Expenses      {:>12.2}", summary.total_expenses);
            println!("Net balance   {:>12.2}", summary.net_balance);
            println!("Transactions  {:>12}", summary.transaction_count);
            println!("Clients       {:>12}", summary.client_count);
        }
        None => println!("Summary unavailable"),
    }
    if let Some(analytics) = state.analytics {
        println!();
        for month in &analytics.monthly {
            println!("{:<10} {:>12.2} {:>12.2}", month.month, month.income, month.expenses);
        }
    }
    Ok(())
}

async fn delete<T: Record>(ctx: &SyncContext, kind: ResourceKind, id: &str) -> Result<()> {
    let view = CollectionPage::<T>::new(kind, ctx.clone());
    view.mount().await;
    let outcome = view.delete(id).await;
    view.unmount();

    match outcome {
        MutationOutcome::Applied { .. } => {
            println!("Deleted {} {}", kind.name(), id);
            Ok(())
        }
        MutationOutcome::Failed(class) => anyhow::bail!("Delete failed ({:?})", class),
        MutationOutcome::Unmounted => anyhow::bail!("Delete abandoned"),
    }
}

fn ages(ctx: &SyncContext) {
    for kind in [
        ResourceKind::Clients,
        ResourceKind::Transactions,
        ResourceKind::DashboardSummary,
        ResourceKind::DashboardAnalytics,
    ] {
        let age = ctx
            .store
            .age(&ctx.storage_key(kind))
            .unwrap_or_else(|| "never".to_string());
        println!("{:<20} {}", kind.name(), age);
    }
}

fn print_notifications(events: &mut Receiver<NotifierEvent>) {
    loop {
        match events.try_recv() {
            Ok(NotifierEvent::Shown(notification)) => {
                let hint = match notification.action {
                    Some(action) => format!(" [{:?}]", action),
                    None => String::new(),
                };
                eprintln!("[{}] {}{}", notification.kind.label(), notification.message, hint);
            }
            Ok(NotifierEvent::Dismissed { .. }) => {}
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped = skipped, "Missed notifications"),
            Err(_) => break,
        }
    }
}
