//! i94-etl CLI - Batch loader for the immigration analytics warehouse.

use clap::{Parser, Subcommand};
use i94_etl::{Config, EtlError, PgWarehouse, Pipeline, RunSummary, Uploaders};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "i94-etl")]
#[command(about = "Batch loader for the immigration analytics warehouse")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean raw immigration extracts into gzip CSV
    Clean,

    /// Upload reference data and cleaned extracts to object storage
    Upload,

    /// Drop and recreate all warehouse tables
    CreateTables,

    /// Load staging and target tables, then run quality checks
    Load,

    /// Run data quality checks only
    Check,

    /// Run every stage: clean, upload, create-tables, load, check
    Run,

    /// Test the warehouse connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), EtlError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(EtlError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let pipeline = Pipeline::new(config);

    // Health check reports its own result rather than a run summary
    if let Commands::HealthCheck = cli.command {
        return health_check(&pipeline, cli.output_json).await;
    }

    let mut summary = RunSummary::begin();

    match cli.command {
        Commands::Clean => {
            summary.clean = Some(pipeline.clean().await?);
        }

        Commands::Upload => {
            let uploaders = Uploaders::s3(&pipeline.config().storage)?;
            summary.uploads = pipeline.upload(&uploaders).await?;
        }

        Commands::CreateTables => {
            let warehouse = PgWarehouse::connect(&pipeline.config().warehouse).await?;
            summary.loads = pipeline.create_tables(&warehouse).await?;
        }

        Commands::Load => {
            let warehouse = PgWarehouse::connect(&pipeline.config().warehouse).await?;
            pipeline.load_and_check(&warehouse, &mut summary).await?;
        }

        Commands::Check => {
            let warehouse = PgWarehouse::connect(&pipeline.config().warehouse).await?;
            summary.reconciliation = Some(pipeline.reconcile(&warehouse).await?);
        }

        Commands::Run => {
            let uploaders = Uploaders::s3(&pipeline.config().storage)?;
            let warehouse = PgWarehouse::connect(&pipeline.config().warehouse).await?;
            pipeline
                .run_into(&warehouse, &uploaders, &mut summary)
                .await?;
        }

        Commands::HealthCheck => unreachable!(), // Handled above
    }

    let summary = summary.finish();

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        println!("\nCompleted!");
        print!("{}", summary);
    }

    Ok(())
}

async fn health_check(pipeline: &Pipeline, output_json: bool) -> Result<(), EtlError> {
    let warehouse = PgWarehouse::connect(&pipeline.config().warehouse).await?;
    let result = Pipeline::health_check(&warehouse).await;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Warehouse ({}): {} ({}ms)",
            warehouse.database(),
            if result.healthy { "OK" } else { "FAILED" },
            result.latency_ms
        );
        if let Some(ref err) = result.error {
            println!("    Error: {}", err);
        }
    }

    if !result.healthy {
        return Err(EtlError::Query("Health check failed".to_string()));
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
