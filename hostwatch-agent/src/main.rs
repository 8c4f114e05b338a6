use anyhow::Result;
use clap::{Parser, Subcommand};
use hostwatch_core::{
    probe, query_service, AccessGate, Agent, AgentConfig, Credentials, EventFilter, Grant,
    QueryService, Sources, Status,
};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const ENV_USER: &str = "HOSTWATCH_USER";
const ENV_PASSWORD: &str = "HOSTWATCH_PASSWORD";

#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(about = "Host telemetry agent: sample, record and query host metrics", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sampling pass and record the results
    Sample,

    /// List recorded events, newest first
    Events {
        /// Only events for this metric
        #[arg(short, long)]
        metric: Option<String>,

        /// Only events with this status (OK, WARN, CRITICAL)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of events
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Latest event of every metric
    Latest,

    /// Event counts per status over the last 24 hours
    Summary,

    /// CRITICAL events from the last 24 hours
    Alerts,

    /// Busiest processes right now
    Top {
        /// Ranking key: cpu or memory
        #[arg(short, long, default_value = "cpu")]
        by: String,

        /// Number of processes
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Established connections on watched ports
    Connections,

    /// Number of established connections on watched ports
    ConnectionCount,

    /// Latest values in plain-text exposition format (no credentials needed)
    Exposition,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;
    let sources = Sources::live();

    match cli.command {
        Commands::Sample => {
            let hostname = probe::hostname();
            let agent = Agent::new(&config, &hostname, sources);
            let report = blocking(move || agent.run_once()).await?;
            info!(events = report.total(), "pass recorded");
            print_json(&report)?;
        }
        Commands::Exposition => {
            let query = Arc::new(query_service(&config, &sources));
            let text = blocking(move || query.exposition()).await?;
            print!("{}", text);
        }
        gated => {
            let grant = authorize(&config)?;
            let query = Arc::new(query_service(&config, &sources));
            run_gated(gated, query, grant).await?;
        }
    }

    Ok(())
}

async fn run_gated(command: Commands, query: Arc<QueryService>, grant: Grant) -> Result<()> {
    match command {
        Commands::Events {
            metric,
            status,
            limit,
        } => {
            let mut filter = EventFilter::new().limit(limit);
            filter.metric = metric;
            if let Some(status) = status {
                filter.status = Some(status.parse::<Status>()?);
            }
            print_json(&blocking(move || query.list_events(&grant, filter)).await?)
        }
        Commands::Latest => print_json(&blocking(move || query.latest_per_metric(&grant)).await?),
        Commands::Summary => print_json(&blocking(move || query.summary(&grant)).await?),
        Commands::Alerts => print_json(&blocking(move || query.critical_alerts(&grant)).await?),
        Commands::Top { by, limit } => {
            print_json(&blocking(move || query.top_processes(&grant, &by, limit)).await?)
        }
        Commands::Connections => {
            print_json(&blocking(move || query.active_connections(&grant)).await?)
        }
        Commands::ConnectionCount => {
            let count = blocking(move || query.connection_count(&grant)).await?;
            print_json(&serde_json::json!({ "active_connections": count }))
        }
        Commands::Sample | Commands::Exposition => {
            anyhow::bail!("sample and exposition do not go through the gate")
        }
    }
}

/// Check the caller's credentials before any gated query runs.
fn authorize(config: &AgentConfig) -> Result<Grant> {
    let presented = Credentials::new(
        env::var(ENV_USER).unwrap_or_default(),
        env::var(ENV_PASSWORD).unwrap_or_default(),
    );
    let gate = AccessGate::from_config(config.credentials.clone());
    Ok(gate.authorize(&presented)?)
}

/// Run a core call off the async runtime; snapshots and SQLite both block.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> hostwatch_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
