use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use toolsync::config::{self, Config};
use toolsync::discovery;
use toolsync::domain::{CommandSequence, ToolStatus};
use toolsync::hierarchy::check_conflicts;
use toolsync::index::{Change, ToolIndex};
use toolsync::reconcile::{ReconciliationReport, reconcile};
use toolsync::sync::{self, SyncOptions, SyncOutcome, sandbox};
use toolsync::timestamp::{format_ts, parse_since};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolsync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("toolsync.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<ExitCode> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Sync {
            generate,
            force,
            exit_errors,
            tools,
            max_workers,
            since,
        } => {
            let mut options = SyncOptions::from_config(&config.sync);
            options.generate = *generate;
            options.force = *force;
            if exit_errors.is_some() {
                options.error_limit = *exit_errors;
            }
            if !tools.is_empty() {
                options.tools = Some(tools.iter().cloned().collect());
            }
            if let Some(n) = max_workers {
                eyre::ensure!(*n > 0, "--max-workers must be > 0");
                options.max_workers = *n;
            }
            if let Some(value) = since {
                let ts = parse_since(value).ok_or_else(|| eyre::eyre!("Invalid --since value: {}", value))?;
                options.since = Some(ts);
            }
            handle_sync_command(&options, config, cli.is_verbose()).await
        }
        Commands::Status => handle_status_command(config).await,
        Commands::Prune { yes } => handle_prune_command(*yes, config).await,
    }
}

async fn handle_sync_command(options: &SyncOptions, config: &Config, verbose: bool) -> Result<ExitCode> {
    info!("Sync requested: {:?}", options);
    // The container mounts the project directory, which must be absolute
    let host_dir = std::env::current_dir()
        .context("Failed to resolve current directory")?
        .join(&config.base_dir);
    let mut context = sandbox::from_config(&config.sandbox, &host_dir);

    match sync::sync(config, options, context.as_mut()).await {
        Ok(outcome) => {
            print_sync_outcome(&outcome, verbose);
            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_sync_outcome(outcome: &SyncOutcome, verbose: bool) {
    let managed = outcome.reconciliation.managed();
    println!("{} {} managed tools", "Reconciled:".green(), managed.len());

    let Some(report) = &outcome.report else {
        println!("{}", "Baselines not regenerated (use --generate)".dimmed());
        return;
    };

    for (sequence, change) in &outcome.changes {
        match change {
            Change::New => println!("  {} {}", "new".green(), sequence),
            Change::Changed { previous } => {
                println!("  {} {} (was {})", "changed".yellow(), sequence, previous)
            }
            Change::Unchanged if verbose => println!("  {} {}", "unchanged".dimmed(), sequence),
            Change::Unchanged => {}
        }
    }
    for failure in &report.errors {
        println!("  {} {}: {}", "failed".red(), failure.sequence, failure.error);
    }

    println!(
        "{} {} processed, {} failed, {} skipped",
        "Summary:".cyan(),
        report.processed,
        report.errors.len(),
        report.skipped
    );
    if report.aborted {
        println!("{}", "Aborted: error limit reached".red().bold());
    }
}

async fn handle_status_command(config: &Config) -> Result<ExitCode> {
    info!("Showing reconciliation status");
    let found = discovery::discover(config, &[]).await?;

    let conflicts = check_conflicts(&found.lists.whitelist, &found.lists.blacklist);
    if !conflicts.is_empty() {
        println!("{}", "Whitelist/blacklist conflicts:".red().bold());
        for conflict in &conflicts {
            println!("  {}", conflict.to_config_path());
        }
        return Ok(ExitCode::FAILURE);
    }

    let report = reconcile(&found)?;
    print_status_table(&report);

    let index = ToolIndex::load(config.index_file())?;
    for tool in report.managed() {
        let Some(entry) = CommandSequence::new(vec![tool.clone()]).and_then(|seq| index.get_entry(&seq).cloned()) else {
            println!("  {} {}", tool, "never captured".dimmed());
            continue;
        };
        println!(
            "  {} {} checked {}, changed {}",
            tool,
            entry.crc,
            format_ts(entry.checked_timestamp),
            format_ts(entry.updated_timestamp)
        );
    }
    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn colored_status(status: ToolStatus) -> ColoredString {
    if status.is_error() {
        status.as_str().red()
    } else if status.is_managed() {
        status.as_str().green()
    } else {
        status.as_str().yellow()
    }
}

fn print_status_table(report: &ReconciliationReport) {
    let width = report.statuses.keys().map(String::len).max().unwrap_or(0);
    for (tool, status) in &report.statuses {
        println!("  {:width$}  {}", tool, colored_status(*status), width = width);
    }
    for tool in &report.unclassified {
        println!("  {:width$}  {}", tool, "UNCLASSIFIED".dimmed(), width = width);
    }
    for violation in report.violations() {
        println!("{} {}", "hint:".cyan(), violation.hint);
    }

    let counts: Vec<String> = report
        .counts()
        .iter()
        .map(|(status, n)| format!("{status}={n}"))
        .collect();
    println!("{} {}", "Totals:".cyan(), counts.join(" "));
}

async fn handle_prune_command(yes: bool, config: &Config) -> Result<ExitCode> {
    info!("Prune requested (confirmed: {})", yes);
    let (_, report) = sync::survey(config, &[]).await?;
    if report.has_errors() {
        print_status_table(&report);
        eyre::bail!("Refusing to prune while reconciliation reports errors");
    }

    let keep: BTreeSet<String> = report.managed();
    let index_path = config.index_file();
    let removed = if yes {
        sync::prune_index(index_path.clone(), keep, config.sync.lock_timeout()).await?
    } else {
        let index = ToolIndex::load(&index_path)?;
        index
            .entries()
            .keys()
            .filter(|tool| !keep.contains(*tool))
            .cloned()
            .collect()
    };

    if removed.is_empty() {
        println!("{}", "Nothing to prune".green());
        return Ok(ExitCode::SUCCESS);
    }
    let verb = if yes { "Removed" } else { "Would remove" };
    for tool in &removed {
        println!("  {} {}", verb.yellow(), tool);
    }
    if !yes {
        println!("{}", "Re-run with --yes to remove these entries".dimmed());
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    let code = run_application(&cli, &config).await.context("Application failed")?;

    Ok(code)
}
