use std::path::PathBuf;

use clap::{Parser, Subcommand};
use speedwatch::client::{Client, ClientBuilder};
use speedwatch::emitter::{Emitter, HumanReadableEmitter, JsonEmitter};
use speedwatch::params;
use speedwatch::scheduler::{Scheduler, validate_interval};
use speedwatch::storage::{Config, ConfigStore, History};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, clap::ValueEnum)]
enum Format {
    Human,
    Json,
}

#[derive(Parser, Debug)]
#[command(version, about = "librespeed speed tests, on demand or on a schedule")]
struct Cli {
    /// Directory holding the result history and the schedule config
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,
    /// Server registry URL
    #[arg(long, default_value = params::REGISTRY_URL)]
    registry: String,
    /// Output format to use: 'human' or 'json' for batch processing
    #[arg(long, default_value = "human")]
    format: Format,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one measurement now
    Run,
    /// Show recent results
    History {
        #[arg(long, default_value_t = params::HISTORY_LIMIT)]
        count: usize,
    },
    /// Show or change the measurement interval
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Run scheduled measurements until interrupted
    Daemon,
}

#[derive(Subcommand, Debug)]
enum ScheduleAction {
    /// Print the configured interval
    Get,
    /// Set the interval in hours; 0 disables scheduled runs
    Set {
        #[arg(allow_negative_numbers = true)]
        hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("speedwatch=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut emitter: Box<dyn Emitter> = match cli.format {
        Format::Human => Box::new(HumanReadableEmitter::new(std::io::stdout())),
        Format::Json => Box::new(JsonEmitter::new(std::io::stdout())),
    };

    let history = History::in_dir(&cli.data_dir);
    let store = ConfigStore::in_dir(&cli.data_dir);
    let client = ClientBuilder::new("speedwatch", env!("CARGO_PKG_VERSION"))
        .registry_url(&cli.registry)
        .history(history.clone())
        .build()?;

    match cli.command {
        Command::Run => run_once(client, emitter.as_mut()).await?,
        Command::History { count } => emitter.on_history(&history.recent(count)?)?,
        Command::Schedule { action } => match action {
            ScheduleAction::Get => emitter.on_schedule(store.load().interval_hours)?,
            ScheduleAction::Set { hours } => {
                let hours = validate_interval(hours)?;
                store.save(Config {
                    interval_hours: hours,
                })?;
                emitter.on_schedule(hours)?;
            }
        },
        Command::Daemon => daemon(client, store).await?,
    }

    Ok(())
}

async fn run_once(
    client: Client,
    emitter: &mut dyn Emitter,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::channel(16);
    let task = tokio::spawn(async move { client.run_measurement_with(tx).await });

    while let Some(p) = rx.recv().await {
        emitter.on_progress(&p)?;
    }

    match task.await? {
        Ok(result) => emitter.on_summary(&result)?,
        Err(e) => {
            emitter.on_error(&e.to_string())?;
            return Err(e.into());
        }
    }
    Ok(())
}

// The interval lives in the config file so `schedule set` from another
// process reaches a running daemon on the next poll.
async fn daemon(client: Client, store: ConfigStore) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = Scheduler::for_client(client, store.clone());
    info!(interval_hours = scheduler.interval(), "daemon started");

    let mut poll = tokio::time::interval(params::CONFIG_POLL_INTERVAL);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                break;
            }
            _ = poll.tick() => {
                let hours = store.load().interval_hours;
                if hours != scheduler.interval() {
                    info!(interval_hours = hours, "interval changed");
                    scheduler.set_interval(hours);
                }
            }
        }
    }

    info!("daemon stopped");
    Ok(())
}
