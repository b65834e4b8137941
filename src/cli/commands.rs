//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: synthesize, execute and repair a download script for one mailbox
//! - ask: one-shot prompt against the text-generation API
//! - templates: list cached download templates

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Mailforge - generates, runs and repairs mailbox download scripts
#[derive(Parser, Debug)]
#[command(name = "mailforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// File containing the API key (falls back to ./key, then ANTHROPIC_API_KEY)
    #[arg(short, long, global = true)]
    pub key_file: Option<PathBuf>,

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
    /// Download a mailbox: generate a script, run it, repair until verified
    Run {
        /// Full email address of the account
        username: String,

        /// Password or auth code for the account
        password: String,

        /// Mailbox domain; derived from the username when omitted
        #[arg(short, long)]
        domain: Option<String>,

        /// IMAP server hostname
        #[arg(long)]
        imap_server: Option<String>,

        /// IMAP SSL port
        #[arg(long)]
        imap_port: Option<u16>,

        /// Replace the built-in task prompt
        #[arg(short, long)]
        prompt: Option<String>,

        /// Generation attempt budget for this job
        #[arg(short, long)]
        max_attempts: Option<u32>,

        /// Ask the model for the domain's IMAP endpoint before generating
        #[arg(long)]
        auto_query_imap: bool,
    },

    /// Send one prompt and print the raw response
    Ask {
        /// The prompt text
        prompt: String,

        /// Optional system instruction
        #[arg(short, long)]
        system: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Max output tokens
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// List cached download templates
    Templates,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_minimal() {
        let cli = Cli::parse_from(["mailforge", "run", "alice@gmx.com", "s3cr3t"]);
        match cli.command {
            Commands::Run {
                username,
                password,
                domain,
                auto_query_imap,
                ..
            } => {
                assert_eq!(username, "alice@gmx.com");
                assert_eq!(password, "s3cr3t");
                assert!(domain.is_none());
                assert!(!auto_query_imap);
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn test_parse_run_with_options() {
        let cli = Cli::parse_from([
            "mailforge",
            "run",
            "alice@gmx.com",
            "s3cr3t",
            "--imap-server",
            "imap.gmx.com",
            "--imap-port",
            "993",
            "--max-attempts",
            "3",
            "--auto-query-imap",
        ]);
        match cli.command {
            Commands::Run {
                imap_server,
                imap_port,
                max_attempts,
                auto_query_imap,
                ..
            } => {
                assert_eq!(imap_server.as_deref(), Some("imap.gmx.com"));
                assert_eq!(imap_port, Some(993));
                assert_eq!(max_attempts, Some(3));
                assert!(auto_query_imap);
            }
            _ => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["mailforge", "ask", "hello", "--model", "m1"]);
        match cli.command {
            Commands::Ask { prompt, model, .. } => {
                assert_eq!(prompt, "hello");
                assert_eq!(model.as_deref(), Some("m1"));
            }
            _ => panic!("expected ask subcommand"),
        }
    }

    #[test]
    fn test_parse_templates_and_globals() {
        let cli = Cli::parse_from(["mailforge", "--verbose", "templates"]);
        assert!(cli.is_verbose());
        assert!(matches!(cli.command, Commands::Templates));
    }
}
