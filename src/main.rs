use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use dcabot::config::{BotConfig, DEFAULT_CONFIG_FILE};
use dcabot::exchange::{build_exchange, Exchange};
use dcabot::execution::{InstanceLock, Scheduler, ThresholdEngine};
use dcabot::notify::NotifierSet;
use dcabot::persistence::LedgerStore;
use dcabot::report;
use dcabot::report::server::{ReportState, DEFAULT_BIND_ADDR};
use dcabot::strategy::DowntrendSupportSignal;

#[derive(Parser)]
#[command(name = "dcabot", about = "Dollar-cost-averaging threshold trading bot")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run decision cycles on a timer until Ctrl-C (default).
    Run,
    /// Run a single decision cycle and exit.
    Once,
    /// Print a read-only JSON view of the ledger.
    Report {
        #[command(subcommand)]
        view: ReportView,
    },
    /// Serve the report views as JSON over HTTP until Ctrl-C.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = DEFAULT_BIND_ADDR)]
        bind: String,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum ReportView {
    /// Current price of the configured pair.
    Price,
    /// Open orders with sell targets and age.
    Orders,
    /// Sell decision for every open order at the current price.
    Eval,
    /// Totals, average buy, next buy price, profit and sales.
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = BotConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config, false).await,
        Commands::Once => run(config, true).await,
        Commands::Report { view } => print_report(config, view).await,
        Commands::Serve { bind } => serve_reports(config, &bind).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dcabot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: BotConfig, once: bool) -> Result<()> {
    tracing::info!("🚀 Starting {} DCA trading bot", config.trade.pair);

    let _lock = InstanceLock::acquire(&config.orders_file)
        .context("another instance may be running")?;

    let store = LedgerStore::new(&config.orders_file);
    let ledger = store.load_or_default();
    let exchange = build_exchange(&config.trade, &config.paper, ledger.total_open_quantity())?;
    let signals = DowntrendSupportSignal::new(
        config.trade.drop_percent,
        config.trade.support_tolerance,
    );
    let notifier = NotifierSet::from_config(&config.notifications);

    let mut engine = ThresholdEngine::new(
        config.trade.clone(),
        ledger,
        store,
        exchange,
        Box::new(signals),
        Box::new(notifier),
    );

    if once {
        let report = engine.run_cycle().await;
        if let Some(reason) = report.aborted {
            tracing::warn!("Cycle aborted: {}", reason);
        }
        return Ok(());
    }

    let scheduler = Scheduler::new(config.poll_interval);
    tracing::info!("⏱️  Polling every {}s", scheduler.period().as_secs());
    let cycles = scheduler.run(&mut engine).await;

    tracing::info!("👋 Stopped after {} cycle(s)", cycles);
    Ok(())
}

async fn print_report(config: BotConfig, view: ReportView) -> Result<()> {
    let ledger = LedgerStore::new(&config.orders_file).load_or_default();
    let exchange = build_exchange(&config.trade, &config.paper, ledger.total_open_quantity())?;
    let current_price = exchange
        .fetch_last_price(&config.trade.pair)
        .await
        .with_context(|| format!("fetching price for {}", config.trade.pair))?;

    let trade = &config.trade;
    let now = Utc::now();

    match view {
        ReportView::Price => print_json(&report::current_price_view(&trade.pair, current_price)),
        ReportView::Orders => print_json(&report::existing_orders(
            &ledger,
            current_price,
            trade.rise_percent,
            now,
        )),
        ReportView::Eval => print_json(&report::sell_threshold_eval(
            &ledger,
            current_price,
            trade.rise_percent,
            now,
        )),
        ReportView::Summary => print_json(&report::ledger_summary(
            &trade.pair,
            &ledger,
            current_price,
            trade.drop_percent,
        )),
    }
}

async fn serve_reports(config: BotConfig, bind: &str) -> Result<()> {
    let store = LedgerStore::new(&config.orders_file);
    let open_quantity = store.load_or_default().total_open_quantity();
    let exchange = build_exchange(&config.trade, &config.paper, open_quantity)?;
    let state = Arc::new(ReportState {
        trade: config.trade,
        store,
        exchange,
    });

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding report server to {}", bind))?;

    report::server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await?;

    tracing::info!("👋 Report server stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
