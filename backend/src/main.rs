//! Site Ledger admin CLI
//!
//! Usage:
//!   site-ledger repair site-a
//!   site-ledger repair-all
//!   site-ledger summary site-a 2025-03-01
//!   site-ledger worker-balance w1 site-a
//!   site-ledger validate site-a

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use site_ledger::{Backend, LedgerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "site-ledger")]
#[command(about = "Maintain and inspect the daily project ledger")]
struct Args {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides config and environment
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild every summary of one project in date order
    Repair { project_id: String },
    /// Rebuild every project that has summaries
    RepairAll,
    /// Show the summary of one project day, computed if not stored
    Summary { project_id: String, date: NaiveDate },
    /// Show what a worker is owed on a project
    WorkerBalance { worker_id: String, project_id: String },
    /// Check the stored summary chain of a project
    Validate { project_id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = LedgerConfig::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let backend = Backend::new(&config).await?;

    match args.command {
        Command::Repair { project_id } => {
            let report = backend.recompute_service.recompute_project_history(&project_id).await?;
            print_json(&report)?;
            Ok(exit_code(report.is_success()))
        }
        Command::RepairAll => {
            let results = backend.recompute_service.recompute_all_projects().await?;
            let mut healthy = true;
            for (project_id, result) in results {
                match result {
                    Ok(report) => {
                        healthy &= report.is_success();
                        print_json(&report)?;
                    }
                    Err(e) => {
                        healthy = false;
                        error!("Repair of project {} failed: {}", project_id, e);
                    }
                }
            }
            Ok(exit_code(healthy))
        }
        Command::Summary { project_id, date } => {
            let summary = backend.recompute_service.get_daily_summary(&project_id, date).await?;
            print_json(&summary)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::WorkerBalance { worker_id, project_id } => {
            let balance = backend
                .worker_balance_service
                .get_worker_balance(&worker_id, &project_id)
                .await?;
            print_json(&balance)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { project_id } => {
            let problems = backend.recompute_service.validate_project_chain(&project_id).await?;
            for problem in &problems {
                println!("{}", problem);
            }
            if problems.is_empty() {
                info!("Project {} is consistent", project_id);
            }
            Ok(exit_code(problems.is_empty()))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(healthy: bool) -> ExitCode {
    if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_summary_command() {
        let args = Args::try_parse_from(["site-ledger", "summary", "site-a", "2025-03-01"]).unwrap();
        match args.command {
            Command::Summary { project_id, date } => {
                assert_eq!(project_id, "site-a");
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "site-ledger",
            "repair",
            "site-a",
            "--database-url",
            "sqlite::memory:",
        ])
        .unwrap();
        assert_eq!(args.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(matches!(args.command, Command::Repair { .. }));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Args::try_parse_from(["site-ledger", "summary", "site-a", "March 1st"]).is_err());
    }
}
