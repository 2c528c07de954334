//! CLI for pd-manager
//!
//! Run `pd-manager --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pagerduty::{ApiConfig, ENV_BASE_URL};
use pd_manager::{
    reconcile_file, spawn_deadline, ReconcileError, ReconcileOptions, Reconciliation,
    DEFAULT_CONCURRENCY,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pd-manager")]
#[command(about = "Create the teams, users, schedules, escalation policies and services an organization document describes")]
#[command(version)]
struct Cli {
    /// Organization document (JSON)
    file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log format: text, json
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Report format: text, json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Deadline for the whole run, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Entities worked on at once within a phase
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// PagerDuty API endpoint
    #[arg(long, env = ENV_BASE_URL)]
    base_url: Option<String>,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let Some(file) = cli.file.clone() else {
        eprintln!("pd-manager: no organization document given\n\nUsage: pd-manager [OPTIONS] <FILE>");
        std::process::exit(-1);
    };

    if let Err(e) = init_tracing(cli.debug, cli.log_format) {
        eprintln!("pd-manager: failed to initialise logging: {e:#}");
        std::process::exit(-1);
    }

    if let Err(err) = run(&cli, &file).await {
        let phase = err
            .downcast_ref::<ReconcileError>()
            .and_then(ReconcileError::phase);
        error!(phase = ?phase, error = %format!("{err:#}"), "Reconciliation failed");
        std::process::exit(1);
    }
}

/// Rewrite the single-dash `-debug` spelling to `--debug`.
///
/// Clap reads `-debug` as a cluster of short flags. Arguments after `--` are
/// left alone.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut positional_only = false;
    args.into_iter()
        .map(|arg| {
            if !positional_only && arg == "-debug" {
                return OsString::from("--debug");
            }
            if arg == "--" {
                positional_only = true;
            }
            arg
        })
        .collect()
}

fn init_tracing(debug: bool, format: LogFormat) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?,
    }
    Ok(())
}

async fn run(cli: &Cli, file: &Path) -> Result<()> {
    let mut api = ApiConfig::from_env();
    if let Some(base_url) = &cli.base_url {
        api = api.with_base_url(base_url.clone());
    }

    let timeout = Duration::from_secs(cli.timeout_secs);
    let cancel = CancellationToken::new();
    let deadline = spawn_deadline(cancel.clone(), timeout);
    let options = ReconcileOptions::default().with_concurrency(cli.concurrency);

    let result = reconcile_file(file, &api, options, cancel).await;
    deadline.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) if err.is_cancelled() => {
            bail!(
                "run exceeded its {}s deadline: {err}",
                timeout.as_secs()
            )
        }
        Err(err) => return Err(err.into()),
    };

    info!(
        found = outcome.report.found_total(),
        created = outcome.report.created_total(),
        "Reconciliation complete"
    );
    print_report(&outcome, cli.format)
}

fn print_report(outcome: &Reconciliation, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(outcome).context("failed to serialize report")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            for phase in &outcome.report.phases {
                println!(
                    "{:<20} {:>3} found {:>3} created",
                    phase.phase.as_str(),
                    phase.found.len(),
                    phase.created.len()
                );
                for key in &phase.created {
                    println!("  + {key}");
                }
                for membership in &phase.memberships_added {
                    println!("  + member {membership}");
                }
            }
            println!(
                "\n{} found, {} created",
                outcome.report.found_total(),
                outcome.report.created_total()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(normalize_args(args.iter().map(OsString::from)))
    }

    #[test]
    fn test_single_dash_debug_is_accepted() {
        let cli = parse(&["pd-manager", "-debug", "org.json"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.file, Some(PathBuf::from("org.json")));
    }

    #[test]
    fn test_long_and_short_debug_still_parse() {
        assert!(parse(&["pd-manager", "--debug", "org.json"]).unwrap().debug);
        assert!(parse(&["pd-manager", "-d", "org.json"]).unwrap().debug);
        assert!(!parse(&["pd-manager", "org.json"]).unwrap().debug);
    }

    #[test]
    fn test_debug_after_separator_is_a_file() {
        let cli = parse(&["pd-manager", "--", "-debug"]).unwrap();
        assert!(!cli.debug);
        assert_eq!(cli.file, Some(PathBuf::from("-debug")));
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["pd-manager", "org.json"]).unwrap();
        assert_eq!(cli.timeout_secs, 60);
        assert_eq!(cli.concurrency, DEFAULT_CONCURRENCY);
    }
}
