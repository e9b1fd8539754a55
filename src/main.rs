//! CLI entry point for the Piwik visit report.
//!
//! Pulls every visitor profile from the configured Piwik site, summarizes
//! each visit, optionally attributes survey responses, and writes the
//! spreadsheet to `meetaura-stats.xlsx`.

use anyhow::Result;
use clap::Parser;
use piwik_visit_report::config::{OUTPUT_PATH, ReportConfig};
use piwik_visit_report::infra::piwik::PiwikClient;
use piwik_visit_report::pipeline::run;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "piwik_visit_report")]
#[command(about = "Builds a per-visit spreadsheet report from Piwik visitor profiles", long_about = None)]
struct Cli {
    /// Survey export (delimited text) to attribute responses to visits
    #[arg(short = 'q', long = "survey", value_name = "PATH")]
    survey: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/piwik_visit_report.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("piwik_visit_report.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    if let Err(e) = generate(cli).await {
        error!("Report generation failed: {e:#}");
        // flush the JSON log before exiting without unwinding
        drop(_file_guard);
        std::process::exit(1);
    }

    Ok(())
}

async fn generate(cli: Cli) -> Result<()> {
    let config = ReportConfig::from_env()?;
    info!(
        site = %config.id_site,
        period = %config.period,
        date = %config.date,
        survey = cli.survey.is_some(),
        "Generating visit report"
    );

    let client = Arc::new(PiwikClient::from_config(&config)?);
    let report = run(
        client,
        config.max_concurrent_requests,
        cli.survey.as_deref(),
        Path::new(OUTPUT_PATH),
    )
    .await?;

    info!(
        output = OUTPUT_PATH,
        visits = report.summaries.len(),
        "Done"
    );
    Ok(())
}
