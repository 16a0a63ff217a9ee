//! Autograder - Command Line Entry Point
//!
//! Grades one submission and prints the result as JSON on stdout.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autograder::{
    config::{Config, LogConfig, LogFormat},
    grading::ExtractorKind,
    sandbox::DockerSandbox,
    services::GradingService,
    GradeError, GradeResult,
};

#[derive(Parser)]
#[command(author, version, about = "Grade a pytest submission in a sandbox", long_about = None)]
struct Cli {
    /// Assignment the submission belongs to
    assignment_id: i64,

    /// Student who submitted
    submitter_id: i64,

    /// Add a letter grade to the result
    #[arg(long)]
    letter_grade: bool,

    /// Print a per-test summary to stderr
    #[arg(long)]
    summary: bool,

    /// How per-test outcomes are read back (json-report or text-log)
    #[arg(long, value_name = "KIND")]
    extractor: Option<ExtractorKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LogConfig::default());
            return Ok(report_error(&GradeError::from(e)));
        }
    };
    init_tracing(&config.log);

    match run(&cli, config).await {
        Ok(result) => {
            if cli.summary {
                for line in result.summary_lines() {
                    eprintln!("{}", line);
                }
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Ok(report_error(&e)),
    }
}

async fn run(cli: &Cli, mut config: Config) -> Result<GradeResult, GradeError> {
    if cli.letter_grade {
        config.grading.letter_grade = true;
    }
    if let Some(kind) = cli.extractor {
        config.grading.extractor = kind;
    }

    tracing::info!("Connecting to Docker...");
    let sandbox = DockerSandbox::connect(config.sandbox.clone())?;
    sandbox.prepare().await;

    let service = GradingService::new(&config, std::sync::Arc::new(sandbox));
    service.grade(cli.assignment_id, cli.submitter_id).await
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.rust_log.clone().into());

    // stdout carries the result, logs go to stderr
    match log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn report_error(err: &GradeError) -> ExitCode {
    tracing::error!(code = err.error_code(), error = %err, "Grading failed");
    eprintln!("{}: {}", err.error_code(), err);
    ExitCode::from(err.exit_code() as u8)
}
