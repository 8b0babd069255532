//! vigil - continuous security header scanner CLI

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vigil::config::{self, AppConfig, CliOverrides};
use vigil::gateway;
use vigil::models::{SchemeFallback, Severity};
use vigil::scanner::ScanEngine;
use vigil::store::ReportStore;

/// vigil - continuous HTTP security header scanner with live updates
#[derive(Parser)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan loop, publishing a report every interval
    Scan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Serve report reads and live reload notifications
    Serve {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run the scan loop and the gateway in one process
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Scan once, publish the report and exit
    Once {
        #[command(flatten)]
        common: CommonArgs,

        /// Exit with code 1 if any result is at or above this severity (info, medium, high, error)
        #[arg(long)]
        fail_on: Option<Severity>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Targets to scan (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    targets: Option<Vec<String>>,

    /// Seconds between scan starts
    #[arg(long)]
    interval: Option<u64>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Maximum probes in flight
    #[arg(long)]
    concurrency: Option<usize>,

    /// Where the report is stored
    #[arg(long)]
    report_path: Option<PathBuf>,

    /// Gateway listen address
    #[arg(long)]
    bind: Option<String>,

    /// Report polling interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Retry on the other scheme after a transport failure (none, https_to_http, http_to_https)
    #[arg(long)]
    scheme_fallback: Option<SchemeFallback>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "vigil=debug" } else { "vigil=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

fn load(common: &CommonArgs) -> vigil::error::Result<AppConfig> {
    let mut app = if let Some(ref path) = common.config {
        config::load_config(path)?
    } else {
        let default_path = Path::new("config/vigil.toml");
        if default_path.exists() {
            config::load_config(default_path)?
        } else {
            AppConfig::default()
        }
    };

    config::apply_env(&mut app, |key| std::env::var(key).ok())?;
    config::merge_cli_args(
        &mut app,
        CliOverrides {
            targets: common.targets.clone(),
            interval_secs: common.interval,
            timeout_secs: common.timeout,
            concurrency: common.concurrency,
            report_path: common.report_path.clone(),
            bind: common.bind.clone(),
            poll_interval_ms: common.poll_interval_ms,
            scheme_fallback: common.scheme_fallback,
        },
    );
    config::validate(&mut app)?;
    Ok(app)
}

async fn scan_loop(app: &AppConfig) -> vigil::error::Result<()> {
    let engine = ScanEngine::from_config(&app.scan)?;
    let store = ReportStore::new(&app.scan.report_path);
    engine
        .run_forever(
            &app.scan.targets,
            Duration::from_secs(app.scan.interval_secs),
            &store,
        )
        .await
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { common } => {
            init_tracing(common.verbose);
            let app = load(&common)?;
            scan_loop(&app).await?;
        }

        Commands::Serve { common } => {
            init_tracing(common.verbose);
            let app = load(&common)?;
            gateway::serve(&app.gateway).await?;
        }

        Commands::Run { common } => {
            init_tracing(common.verbose);
            let app = load(&common)?;
            info!(
                "Scanning {} targets, gateway on {}",
                app.scan.targets.len(),
                app.gateway.bind
            );
            tokio::select! {
                result = scan_loop(&app) => {
                    if let Err(ref e) = result {
                        error!("Scan loop stopped: {e}");
                    }
                    result?;
                }
                result = gateway::serve(&app.gateway) => {
                    if let Err(ref e) = result {
                        error!("Gateway stopped: {e}");
                    }
                    result?;
                }
            }
        }

        Commands::Once { common, fail_on } => {
            init_tracing(common.verbose);
            let app = load(&common)?;
            let engine = ScanEngine::from_config(&app.scan)?;
            let store = ReportStore::new(&app.scan.report_path);
            store.prepare()?;
            let report = engine.scan_and_publish(&app.scan.targets, &store).await?;

            if let Some(threshold) = fail_on {
                if report.has_severity_at_least(threshold) {
                    error!("Results at or above {threshold} severity detected");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
