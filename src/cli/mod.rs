//! CLI module for mailforge - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running mailbox
//! download jobs, one-shot prompting, and template inspection.

pub mod commands;

pub use commands::Cli;
