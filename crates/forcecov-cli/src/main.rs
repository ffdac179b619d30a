//! forcecov command line
//!
//! `forcecov run` deploys the project in the current directory, runs every
//! test class, and publishes coverage. Exit status is 0 on success, 2 when
//! tests fail and 1 for any other failure.

mod logging;
mod settings;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use forcecov_core::{Pipeline, PipelineError, PipelineReport};
use forcecov_remote::{CoverallsClient, ForceClient};
use logging::LogFormat;
use settings::Settings;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("forcecov")
        .version(forcecov_core::VERSION)
        .about("Deploy an Apex project, run its tests and publish coverage to Coveralls")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug-level logging"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the full pipeline")
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Project root containing src/"),
                )
                .arg(
                    Arg::new("skip-deploy")
                        .long("skip-deploy")
                        .action(ArgAction::SetTrue)
                        .help("Test what is already in the org"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the coverage payload to FILE instead of uploading it"),
                )
                .arg(
                    Arg::new("report-json")
                        .long("report-json")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the run report as JSON"),
                ),
        )
}

async fn run(args: &ArgMatches) -> anyhow::Result<Result<PipelineReport, PipelineError>> {
    let settings = Settings::from_env().context("reading configuration")?;

    let project_dir = args
        .get_one::<PathBuf>("project-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = settings
        .pipeline_config(project_dir)
        .skip_deploy(args.get_flag("skip-deploy"));
    if let Some(path) = args.get_one::<PathBuf>("dry-run") {
        config = config.with_dry_run(path.clone());
    }

    let client = ForceClient::new(settings.client_config()).context("creating org client")?;
    let uploader = CoverallsClient::new(settings.coveralls_endpoint.clone());
    tracing::debug!(?config, endpoint = uploader.endpoint(), "Configured");

    let outcome = Pipeline::new(config, Arc::new(client), Arc::new(uploader))
        .run()
        .await;

    if let (Ok(report), Some(path)) = (&outcome, args.get_one::<PathBuf>("report-json")) {
        let json = serde_json::to_vec_pretty(report).context("encoding run report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let Some(("run", args)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };

    let format = if args.get_flag("log-json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    if let Err(e) = logging::init(args.get_flag("verbose"), format) {
        eprintln!("Failed to initialise logging: {e}");
    }

    match run(args).await {
        Ok(Ok(report)) => {
            tracing::info!(
                passed = report.summary.passed,
                skipped = report.summary.skipped,
                covered = report.totals.covered_lines,
                relevant = report.totals.relevant_lines,
                "Run complete"
            );
            ExitCode::SUCCESS
        }
        Ok(Err(failure)) => {
            eprintln!("{failure}");
            ExitCode::from(failure.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
