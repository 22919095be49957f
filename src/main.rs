//! CLI entry point for the bip! transaction ETL.
//!
//! Provides one subcommand per report: daily transactions, trips between
//! communes (from "trip" or "viaje" exports) and boardings per stop.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bip_etl::config::{EXTRA_LOCATION_TABLE, Settings, ZONE_TABLE};
use bip_etl::files::{DateBounds, parse_date};
use bip_etl::jobs::{publish, run_general, run_stops, run_trips, run_viajes};
use bip_etl::storage::S3Store;
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bip_etl")]
#[command(about = "Builds reports from bip! transaction exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Number of transactions for each day, from .general files
    General(LocalArgs),
    /// Expanded trips between communes, from .trip files
    Trips(LocalArgs),
    /// Expanded trips between communes, from .viaje files
    Viajes(LocalArgs),
    /// Boardings per stop and day, from the early transaction bucket
    Stops {
        /// Lower bound date, for instance 2020-01-01
        #[arg(value_parser = parse_date)]
        start_date: NaiveDate,

        /// Upper bound date, for instance 2020-12-31
        #[arg(value_parser = parse_date)]
        end_date: NaiveDate,

        /// Name of the report (and map) created by the process
        output_filename: String,

        /// Directory where files are saved; defaults to OUTPUT_PATH
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct LocalArgs {
    /// Directory holding the export files
    path: PathBuf,

    /// Directory where files are saved; defaults to OUTPUT_PATH
    #[arg(long)]
    output: Option<PathBuf>,

    /// Send the report to the miscellaneous bucket
    #[arg(long, default_value_t = false)]
    send_to_s3: bool,

    /// Lower bound date to process in YYYY-MM-DD format
    #[arg(long, value_parser = parse_date)]
    lower_bound: Option<NaiveDate>,

    /// Upper bound date to process in YYYY-MM-DD format
    #[arg(long, value_parser = parse_date)]
    upper_bound: Option<NaiveDate>,
}

impl LocalArgs {
    fn bounds(&self) -> Option<DateBounds> {
        DateBounds::from_options(self.lower_bound, self.upper_bound)
            .unwrap_or_else(|e| usage_error(e))
    }
}

/// Reports a usage error the way clap does and exits with status 2.
fn usage_error(e: impl std::fmt::Display) -> ! {
    Cli::command()
        .error(ErrorKind::ArgumentConflict, e.to_string())
        .exit()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bip_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bip_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", LevelFilter::INFO));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::General(args) => {
            info!("Transactions for each day");
            let bounds = args.bounds();
            let output = output_dir(args.output.as_deref(), &settings);
            let report = run_general(&args.path, &output, bounds)?;
            if args.send_to_s3 {
                send_to_s3(&report, &settings).await?;
            }
            info!(report = %report.display(), "Successfully created");
        }
        Commands::Trips(args) => {
            info!("Trips between communes");
            let bounds = args.bounds();
            let output = output_dir(args.output.as_deref(), &settings);
            let report = run_trips(&args.path, &output, bounds, &settings.input(ZONE_TABLE))?;
            if args.send_to_s3 {
                send_to_s3(&report, &settings).await?;
            }
            info!(report = %report.display(), "Successfully created");
        }
        Commands::Viajes(args) => {
            info!("Trips between communes");
            let bounds = args.bounds();
            let output = output_dir(args.output.as_deref(), &settings);
            let extra_locations = settings.input(EXTRA_LOCATION_TABLE);
            let report = run_viajes(&args.path, &output, bounds, &extra_locations)?;
            if args.send_to_s3 {
                send_to_s3(&report, &settings).await?;
            }
            info!(report = %report.display(), "Successfully created");
        }
        Commands::Stops {
            start_date,
            end_date,
            output_filename,
            output,
        } => {
            info!("Transactions by stop");
            let bounds = DateBounds::new(start_date, end_date).unwrap_or_else(|e| usage_error(e));
            let output = output_dir(output.as_deref(), &settings);
            let store = S3Store::from_env().await;
            let report = run_stops(&store, &settings, bounds, &output_filename, &output).await?;
            info!(report = %report.display(), "Successfully created");
        }
    }

    Ok(())
}

/// Filter from `var`, falling back to `default` when it is unset or invalid.
fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(var)
        .from_env_lossy()
}

fn output_dir(output: Option<&Path>, settings: &Settings) -> PathBuf {
    output.map_or_else(|| settings.output_path.clone(), Path::to_path_buf)
}

async fn send_to_s3(report: &Path, settings: &Settings) -> Result<()> {
    let bucket = settings.miscellaneous_bucket()?;
    let store = S3Store::from_env().await;
    publish(&store, report, bucket).await?;
    Ok(())
}
