//! sequencer-monitor CLI: operator interface to the job monitor.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use sequencer_monitor::chain::SequencerReader;
use sequencer_monitor::config::Config;
use sequencer_monitor::db::Db;
use sequencer_monitor::model::ScopeKey;
use sequencer_monitor::monitor::{MonitorConfig, MonitorCycle, Watcher};
use sequencer_monitor::notify::{DiscordNotifier, LogNotifier, Notifier};
use sequencer_monitor::storage::StateStore;
use sequencer_monitor::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "sequencer-monitor",
    about = "Alert on sequencer jobs left workable without being worked"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single monitoring cycle
    Check {
        /// Block to observe (defaults to the chain head)
        #[arg(long)]
        block: Option<u64>,
        /// Consecutive workable blocks before alerting (defaults to
        /// CONSEQUENT_WORKABLE_JOBS_LIMIT)
        #[arg(long)]
        threshold: Option<u64>,
    },
    /// Run one cycle per new block until interrupted
    Watch {
        /// Seconds between chain head polls (defaults to POLL_INTERVAL_SECS)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
    /// Show persisted streak counters for a scope
    Streaks {
        /// Network id (bytes32 hex) or sequencer address
        scope: String,
    },
    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = telemetry(&config)?;

    let db = Db::connect(config.database_url.expose_secret()).await?;

    match cli.command {
        Command::Check { block, threshold } => cmd_check(config, db, block, threshold).await,
        Command::Watch { interval } => cmd_watch(config, db, interval).await,
        Command::Streaks { scope } => cmd_streaks(&db, &scope).await,
        Command::Migrate => {
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
    }
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "sequencer-monitor".to_string(),
        default_filter: config.log_level.clone(),
    })?)
}

fn build_monitor(config: &Config, db: Db) -> anyhow::Result<MonitorCycle> {
    let chain = SequencerReader::connect(&config.rpc_url, config.sequencer_address)?;

    let notifier: Arc<dyn Notifier> = match &config.discord_webhook_url {
        Some(url) => Arc::new(DiscordNotifier::new(url.clone())?),
        None => {
            tracing::warn!("DISCORD_WEBHOOK_URL not set, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    Ok(MonitorCycle::new(
        Arc::new(chain),
        Arc::new(db),
        notifier,
        MonitorConfig {
            sequencer: config.sequencer_address,
            mode: config.scope_mode,
        },
    ))
}

async fn cmd_check(
    config: Config,
    db: Db,
    block: Option<u64>,
    threshold: Option<u64>,
) -> anyhow::Result<()> {
    db.migrate().await?;
    let monitor = build_monitor(&config, db)?;

    let block = match block {
        Some(block) => block,
        None => monitor.latest_block().await?,
    };
    let report = monitor
        .run(block, threshold.unwrap_or(config.threshold))
        .await?;

    println!(
        "Block {}: {} job(s) across {} scope(s), {} unworked",
        report.block,
        report.jobs,
        report.scopes.len(),
        report.unworked.len()
    );
    for job in &report.unworked {
        println!("  {}  {}  {} blocks", job.network, job.job, job.streak);
    }
    Ok(())
}

async fn cmd_watch(config: Config, db: Db, interval: Option<u64>) -> anyhow::Result<()> {
    db.migrate().await?;
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or(config.poll_interval);
    let monitor = Arc::new(build_monitor(&config, db)?);
    let watcher = Watcher::new(monitor, config.threshold, interval);

    let stop = watcher.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        stop.shutdown();
    });

    watcher.run().await?;
    Ok(())
}

async fn cmd_streaks(db: &Db, scope: &str) -> anyhow::Result<()> {
    let scope: ScopeKey = scope.parse()?;
    let streaks = db.get(&scope).await?;

    if streaks.is_empty() {
        println!("No streaks recorded for {scope}.");
        return Ok(());
    }

    println!("{:<112}  STREAK", "KEY");
    println!("{}", "-".repeat(120));
    for (key, streak) in &streaks {
        println!("{:<112}  {}", key.to_string(), streak);
    }

    if let Some(updated_at) = db.streaks_updated_at(&scope).await? {
        println!(
            "\n{} key(s), updated {}",
            streaks.len(),
            updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
