//! CLI module for toolsync - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
