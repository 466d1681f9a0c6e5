//! CLI argument definitions for toolbridge.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// toolbridge -- MCP servers for the mise version manager and GitHub standups.
#[derive(Parser)]
#[command(
    name = "toolbridge",
    version,
    about = "MCP tool servers for mise and GitHub standup reports",
    long_about = "Exposes the mise version manager and a GitHub activity standup reporter \
                  as Model Context Protocol tools over stdio or HTTP."
)]
pub struct Cli {
    /// Configuration file (defaults to `config/default.toml` when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the mise adapter over stdio.
    Mise,

    /// Serve the standup adapter over stdio.
    Standup,

    /// Serve both adapters over HTTP at `POST /mcp`.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on.
        #[arg(long, short, default_value_t = 8765)]
        port: u16,
    },

    /// Print a standup report for one day.
    Report {
        /// Date expression ("yesterday", "last friday", "2024-07-23").
        #[arg(long, short)]
        date: Option<String>,

        /// GitHub username (defaults to the authenticated user).
        #[arg(long, short)]
        user: Option<String>,

        /// Comma-separated repositories to include.
        #[arg(long, short)]
        repos: Option<String>,

        /// Output format: markdown, text or json.
        #[arg(long, short, default_value = "markdown")]
        format: String,
    },

    /// Resolve a date expression and print the date.
    Date {
        /// Expression to resolve; empty means the last workday.
        #[arg(default_value = "")]
        expression: String,
    },
}
