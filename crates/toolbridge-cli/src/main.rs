//! CLI entry point for toolbridge.
//!
//! Runs the mise or standup MCP server over stdio, both over HTTP, or
//! prints a standup report directly to the terminal.

mod cli;
mod config;
mod helpers;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use toolbridge_adapters::standup::{ReportFormat, config::parse_repo_list, dates, fetch, render};
use toolbridge_adapters::{Adapter, MiseAdapter, StandupAdapter};
use toolbridge_mcp::McpServer;

use crate::cli::{Cli, Commands};
use crate::config::Settings;
use crate::helpers::{init_tracing, log_dotenv};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `.env` may set RUST_LOG, so it is read before the subscriber exists.
    let dotenv = dotenvy::dotenv();
    init_tracing(if cli.verbose { "debug" } else { "info" });
    log_dotenv(&dotenv);

    let settings = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Mise => cmd_mise(settings).await,
        Commands::Standup => cmd_standup(settings).await,
        Commands::Serve { bind, port } => cmd_serve(settings, &bind, port).await,
        Commands::Report {
            date,
            user,
            repos,
            format,
        } => cmd_report(settings, date, user, repos, &format).await,
        Commands::Date { expression } => {
            println!("{}", dates::resolve(&expression).format("%Y-%m-%d"));
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

async fn mise_adapter(settings: &Settings) -> Result<Arc<dyn Adapter>> {
    let mut adapter = MiseAdapter::new("mise", settings.mise.clone());
    adapter
        .connect()
        .await
        .context("failed to connect mise adapter")?;
    Ok(Arc::new(adapter))
}

async fn standup_adapter(settings: &Settings) -> Result<Arc<dyn Adapter>> {
    let mut adapter = StandupAdapter::new("standup", settings.standup.clone());
    adapter
        .connect()
        .await
        .context("failed to connect standup adapter")?;
    Ok(Arc::new(adapter))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn cmd_mise(settings: Settings) -> Result<()> {
    let server = McpServer::new(vec![mise_adapter(&settings).await?]).with_name("mise-mcp");
    toolbridge_mcp::serve_stdin(&server)
        .await
        .context("stdio server failed")
}

async fn cmd_standup(settings: Settings) -> Result<()> {
    let server =
        McpServer::new(vec![standup_adapter(&settings).await?]).with_name("standup-mcp");
    toolbridge_mcp::serve_stdin(&server)
        .await
        .context("stdio server failed")
}

async fn cmd_serve(settings: Settings, bind: &str, port: u16) -> Result<()> {
    let adapters = vec![
        mise_adapter(&settings).await?,
        standup_adapter(&settings).await?,
    ];
    let server = Arc::new(McpServer::new(adapters));
    let addr = format!("{bind}:{port}");
    info!(addr = %addr, "starting HTTP server");
    toolbridge_mcp::serve_http(server, &addr)
        .await
        .context("HTTP server failed")
}

async fn cmd_report(
    settings: Settings,
    date: Option<String>,
    user: Option<String>,
    repos: Option<String>,
    format: &str,
) -> Result<()> {
    let target = dates::resolve(date.as_deref().unwrap_or(""));
    let repos = repos.as_deref().map(parse_repo_list);
    let source = settings.standup.source();

    let collection = fetch(
        source.as_ref(),
        &settings.standup,
        target,
        user.as_deref(),
        repos,
    )
    .await
    .with_context(|| format!("failed to collect activity for {target}"))?;

    let report = render(&collection, ReportFormat::lenient(Some(format)))
        .context("failed to render report")?;
    println!("{report}");
    Ok(())
}
