//! Listener agent main entry point
//!
//! Runs the monitoring loop until SIGINT or SIGTERM, or executes one of the
//! inspection commands and exits.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listener::error::{EXIT_CONFIG, EXIT_FAILURE};
use listener::samplers::DEFAULT_CHANNELS;
use listener::{HistoryStore, ListenerConfig, ListenerError, Scheduler};

/// Listener command line interface
#[derive(Parser)]
#[command(name = "listener")]
#[command(about = "Samples host metrics into a rolling history log and checks for required files")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LISTENER_CONFIG")]
    config: Option<PathBuf>,

    /// Print debugging diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Log level (overrides the configuration file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop (default)
    Run,

    /// Run a single tick and exit
    Once {
        /// Output the tick report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },

    /// Print the stored history of every channel
    History {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct ChannelHistory {
    line: usize,
    channel: Option<String>,
    samples: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match ListenerConfig::load_with_fallback(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(EXIT_CONFIG);
        }
    };

    if let Err(e) = initialize_logging(&cli, &config) {
        eprintln!("Failed to initialize logging: {:#}", e);
        process::exit(EXIT_FAILURE);
    }

    let result = match &cli.command {
        None | Some(Commands::Run) => run(config).await,
        Some(Commands::Once { json }) => once(config, *json),
        Some(Commands::Config { show }) => handle_config(&config, *show),
        Some(Commands::History { json }) => show_history(&config, *json),
    };

    if let Err(e) = result {
        let code = match e.downcast_ref::<ListenerError>() {
            Some(listener_error) => {
                error!(
                    category = listener_error.category(),
                    critical = listener_error.is_critical(),
                    "{:#}",
                    e
                );
                listener_error.exit_code()
            }
            None => {
                error!("{:#}", e);
                EXIT_FAILURE
            }
        };
        process::exit(code);
    }
}

/// Initialize logging from the verbosity flag, CLI level and configuration
fn initialize_logging(cli: &Cli, config: &ListenerConfig) -> anyhow::Result<()> {
    let requested = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match requested.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("listener={}", log_level).parse()?)
        .add_directive("tokio=warn".parse()?);

    if cli.json_logs || config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

/// Tick until a termination signal or a fatal log error
async fn run(config: ListenerConfig) -> anyhow::Result<()> {
    info!(
        log = %config.log_name.display(),
        items_per_line = config.number_of_items_per_line,
        required_files = ?config.files,
        "starting listener"
    );
    let mut scheduler = Scheduler::from_config(&config);

    tokio::select! {
        result = scheduler.run() => {
            result.context("history log is unusable, stopping")?;
        }
        result = wait_for_shutdown() => {
            result?;
        }
    }

    info!(ticks = scheduler.ticks(), "listener stopped");
    Ok(())
}

fn once(config: ListenerConfig, json: bool) -> anyhow::Result<()> {
    let mut scheduler = Scheduler::from_config(&config);
    let report = scheduler.tick().context("history log is unusable")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "wrote {} channel(s), skipped {:?}, missing {} file(s)",
        report.written.len(),
        report.skipped,
        report.missing.len()
    );
    for alert in &report.missing {
        println!("  File {} is missing!!", alert.file);
    }
    Ok(())
}

fn handle_config(config: &ListenerConfig, show: bool) -> anyhow::Result<()> {
    if show {
        println!("Effective configuration:");
        println!("{}", config.to_toml()?);
    } else {
        config.validate().map_err(ListenerError::from)?;
        println!("Configuration is valid");
    }
    Ok(())
}

fn show_history(config: &ListenerConfig, json: bool) -> anyhow::Result<()> {
    let mut store = HistoryStore::from_config(config);
    for name in DEFAULT_CHANNELS {
        store.register_channel(name);
    }
    let windows = store
        .read_all()
        .map_err(ListenerError::from)
        .with_context(|| format!("reading {}", store.path().display()))?;

    let histories: Vec<ChannelHistory> = windows
        .into_iter()
        .enumerate()
        .map(|(line, samples)| ChannelHistory {
            line,
            channel: store.channels().get(line).cloned(),
            samples,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&histories)?);
    } else {
        for history in &histories {
            let name = history.channel.as_deref().unwrap_or("?");
            println!("{:>2} {:<8} {}", history.line, name, history.samples.join(" "));
        }
    }
    Ok(())
}

/// Handle shutdown signals
async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    Ok(())
}
