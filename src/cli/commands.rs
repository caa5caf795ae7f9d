//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - sync: reconcile tools and optionally regenerate baselines
//! - status: show the reconciliation table without capturing
//! - prune: drop index entries for tools no longer managed

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolsync - keep managed CLI tools classified and their baselines current
#[derive(Parser, Debug)]
#[command(name = "toolsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile tools and (with --generate) capture baselines
    Sync {
        /// Capture baselines and update the index
        #[arg(short, long)]
        generate: bool,

        /// Capture even entries checked recently
        #[arg(short, long)]
        force: bool,

        /// Stop dispatching after N failed captures (default 1 when given bare)
        #[arg(
            long,
            value_name = "N",
            num_args = 0..=1,
            default_missing_value = "1",
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
        )]
        exit_errors: Option<usize>,

        /// Only sync these tools
        #[arg(short, long, value_delimiter = ',')]
        tools: Vec<String>,

        /// Concurrent capture workers (overrides config)
        #[arg(short = 'j', long)]
        max_workers: Option<usize>,

        /// Skip entries checked at or after this time (epoch seconds, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
    },

    /// Show the reconciliation status of every discovered tool
    Status,

    /// Remove index entries for tools that are no longer managed
    Prune {
        /// Actually remove entries instead of listing them
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["toolsync"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["toolsync", "-v", "status"]).unwrap();
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["toolsync", "-c", "/path/to/toolsync.yml", "status"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/toolsync.yml")));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["toolsync", "status", "--config", "x.yml", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::try_parse_from(["toolsync", "sync"]).unwrap();
        match cli.command {
            Commands::Sync {
                generate,
                force,
                exit_errors,
                tools,
                max_workers,
                since,
            } => {
                assert!(!generate);
                assert!(!force);
                assert!(exit_errors.is_none());
                assert!(tools.is_empty());
                assert!(max_workers.is_none());
                assert!(since.is_none());
            }
            _ => panic!("Expected sync command"),
        }
    }

    #[test]
    fn test_sync_all_flags() {
        let cli = Cli::try_parse_from([
            "toolsync",
            "sync",
            "--generate",
            "--force",
            "--tools=ruff,mypy",
            "--max-workers=8",
            "--since=2024-01-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync {
                generate,
                force,
                tools,
                max_workers,
                since,
                ..
            } => {
                assert!(generate);
                assert!(force);
                assert_eq!(tools, vec!["ruff".to_string(), "mypy".to_string()]);
                assert_eq!(max_workers, Some(8));
                assert_eq!(since.as_deref(), Some("2024-01-01"));
            }
            _ => panic!("Expected sync command"),
        }
    }

    #[test]
    fn test_exit_errors_bare() {
        let cli = Cli::try_parse_from(["toolsync", "sync", "--exit-errors"]).unwrap();
        match cli.command {
            Commands::Sync { exit_errors, .. } => assert_eq!(exit_errors, Some(1)),
            _ => panic!("Expected sync command"),
        }
    }

    #[test]
    fn test_exit_errors_with_value() {
        let cli = Cli::try_parse_from(["toolsync", "sync", "--exit-errors=3"]).unwrap();
        match cli.command {
            Commands::Sync { exit_errors, .. } => assert_eq!(exit_errors, Some(3)),
            _ => panic!("Expected sync command"),
        }
    }

    #[test]
    fn test_exit_errors_rejects_zero() {
        assert!(Cli::try_parse_from(["toolsync", "sync", "--exit-errors=0"]).is_err());
    }

    #[test]
    fn test_status_command() {
        let cli = Cli::try_parse_from(["toolsync", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_prune_command() {
        let cli = Cli::try_parse_from(["toolsync", "prune"]).unwrap();
        assert!(matches!(cli.command, Commands::Prune { yes: false }));

        let cli = Cli::try_parse_from(["toolsync", "prune", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Prune { yes: true }));
    }
}
