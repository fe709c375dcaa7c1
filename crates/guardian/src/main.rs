//! Guardian CLI - content risk monitoring and parent alerts.

mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guardian::{
    AlertSettings, ContentSignal, Guardian, GuardianConfig, Incident, SignalScorer,
    MAX_RETENTION_HOURS,
};

/// Guardian CLI - Score on-screen content and alert parents about risks.
#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "Content risk monitoring with throttled parent alerts")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true, env = "GUARDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score text without recording anything
    Scan {
        /// Text to score
        #[arg(long)]
        text: String,
    },

    /// Triage signals read line by line from stdin
    Watch,

    /// Show incident statistics
    Stats,

    /// List recent incidents
    Incidents {
        /// Look-back window in hours
        #[arg(
            long,
            default_value = "24",
            value_parser = clap::value_parser!(i64).range(1..=MAX_RETENTION_HOURS)
        )]
        hours: i64,

        /// Only incidents from this device
        #[arg(long)]
        device: Option<String>,
    },

    /// Mark an incident as reviewed
    Review {
        /// Incident ID
        id: String,
    },

    /// Show or change alert throttling settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Send a test message through every enabled channel
    TestChannels,

    /// Send the incident summary to the parent
    Summary,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current settings
    Show,

    /// Update one or more settings
    Set {
        /// Minimum severity weight (0.0-1.0)
        #[arg(long)]
        min_severity: Option<f32>,

        /// Alerts per term within the window before suppression
        #[arg(long)]
        max_frequency: Option<u32>,

        /// Frequency window in minutes
        #[arg(long)]
        window_minutes: Option<u32>,

        /// Distinct recent terms that force an alert
        #[arg(long)]
        min_diversity: Option<u32>,

        /// Confidence that always alerts (0.0-1.0)
        #[arg(long)]
        high_confidence: Option<f32>,

        /// Enable or disable smart filtering
        #[arg(long)]
        smart_filtering: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    let config = GuardianConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Scan { text } => run_scan(&text),
        Commands::Watch => run_watch(config).await,
        Commands::Stats => run_stats(config).await,
        Commands::Incidents { hours, device } => run_incidents(config, hours, device).await,
        Commands::Review { id } => run_review(config, &id).await,
        Commands::Settings { action } => run_settings(config, action).await,
        Commands::TestChannels => run_test_channels(config).await,
        Commands::Summary => run_summary(config).await,
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("guardian=debug,notify=debug,info")
        } else {
            EnvFilter::new("guardian=info,notify=info,warn")
        }
    });

    // Logs go to stderr so command output stays machine-readable
    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

fn run_scan(text: &str) -> Result<()> {
    let analysis = SignalScorer::default().analyze(text, None);
    let json = serde_json::to_string_pretty(&analysis).context("Failed to serialize analysis")?;
    println!("{json}");
    Ok(())
}

async fn run_watch(config: GuardianConfig) -> Result<()> {
    let guardian = Guardian::start(config)
        .await
        .context("Failed to start guardian")?;
    let triage = Arc::clone(guardian.triage());

    info!("Reading signals from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let outcome = triage.handle(ContentSignal::text(line)).await;
                    ui::print_outcome(&outcome);
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    }

    guardian.shutdown().await;
    Ok(())
}

async fn run_stats(config: GuardianConfig) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let stats = guardian.triage().store().statistics().await;
    ui::print_statistics(&stats);
    Ok(())
}

async fn run_incidents(config: GuardianConfig, hours: i64, device: Option<String>) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let store = guardian.triage().store();
    let window = chrono::Duration::try_hours(hours).context("Look-back window out of range")?;

    let incidents: Vec<Incident> = match device {
        Some(device) => {
            let cutoff = chrono::Utc::now() - window;
            store
                .for_device(&device)
                .await
                .into_iter()
                .filter(|i| i.timestamp >= cutoff)
                .collect()
        }
        None => store.recent(window).await,
    };

    ui::print_section(&format!("Incidents in the last {hours}h"));
    if incidents.is_empty() {
        println!("No incidents found.");
        return Ok(());
    }
    for incident in &incidents {
        ui::print_incident(incident);
    }
    println!("\nTotal: {} incidents", incidents.len());
    Ok(())
}

async fn run_review(config: GuardianConfig, id: &str) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let store = guardian.triage().store();

    if !store.mark_reviewed(id).await {
        bail!("Incident not found: {id}");
    }
    store.flush().await;
    ui::print_success(&format!("Incident {id} marked reviewed"));
    Ok(())
}

async fn run_settings(config: GuardianConfig, action: SettingsAction) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let manager = guardian.triage().settings();

    match action {
        SettingsAction::Show => {}
        SettingsAction::Set {
            min_severity,
            max_frequency,
            window_minutes,
            min_diversity,
            high_confidence,
            smart_filtering,
        } => {
            let current = manager.current();
            let updated = AlertSettings {
                min_severity_weight: min_severity.unwrap_or(current.min_severity_weight),
                max_term_frequency: max_frequency.unwrap_or(current.max_term_frequency),
                frequency_window_minutes: window_minutes
                    .unwrap_or(current.frequency_window_minutes),
                min_term_diversity: min_diversity.unwrap_or(current.min_term_diversity),
                high_confidence_threshold: high_confidence
                    .unwrap_or(current.high_confidence_threshold),
                smart_filtering_enabled: smart_filtering
                    .unwrap_or(current.smart_filtering_enabled),
            };
            manager
                .save(updated)
                .await
                .context("Failed to save settings")?;
            ui::print_success("Settings saved");
        }
    }

    let json = serde_json::to_string_pretty(manager.current().as_ref())?;
    println!("{json}");
    Ok(())
}

async fn run_test_channels(config: GuardianConfig) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let delivery = guardian.triage().delivery();

    if !delivery.has_channels() {
        ui::print_warning("No notification channels configured");
        return Ok(());
    }

    let outcome = delivery.send_test().await;
    if outcome.is_delivered() {
        ui::print_success(&format!("Test message delivered ({outcome:?})"));
    } else {
        ui::print_error(&format!("Test message not delivered ({outcome:?})"));
    }
    Ok(())
}

async fn run_summary(config: GuardianConfig) -> Result<()> {
    let guardian = Guardian::open(config).await?;
    let outcome = guardian.triage().send_summary().await;

    if outcome.is_delivered() {
        ui::print_success("Summary sent");
    } else {
        ui::print_warning(&format!("Summary not delivered ({outcome:?})"));
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_settings_set() {
        let cli = Cli::parse_from([
            "guardian",
            "settings",
            "set",
            "--max-frequency",
            "5",
            "--smart-filtering",
            "false",
        ]);
        match cli.command {
            Commands::Settings {
                action:
                    SettingsAction::Set {
                        max_frequency,
                        smart_filtering,
                        min_severity,
                        ..
                    },
            } => {
                assert_eq!(max_frequency, Some(5));
                assert_eq!(smart_filtering, Some(false));
                assert_eq!(min_severity, None);
            }
            _ => panic!("expected settings set"),
        }
    }

    #[test]
    fn test_parse_incidents_defaults() {
        let cli = Cli::parse_from(["guardian", "incidents", "--device", "tablet"]);
        match cli.command {
            Commands::Incidents { hours, device } => {
                assert_eq!(hours, 24);
                assert_eq!(device.as_deref(), Some("tablet"));
            }
            _ => panic!("expected incidents"),
        }
    }

    #[test]
    fn test_parse_incidents_rejects_out_of_range_hours() {
        for hours in ["0", "-5", "9223372036854775807"] {
            let result = Cli::try_parse_from(["guardian", "incidents", "--hours", hours]);
            assert!(result.is_err(), "--hours {hours} should be rejected");
        }

        let cli = Cli::try_parse_from(["guardian", "incidents", "--hours", "8760"]).unwrap();
        assert!(matches!(cli.command, Commands::Incidents { hours: 8760, .. }));
    }
}
