//! CLI entry point for the appfetch tool.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use appfetch_core::config::{self, LoadedConfig};
use appfetch_core::{Batch, DEFAULT_CONCURRENCY, DownloadEngine, EngineConfig};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;
mod exit_handler;
mod output;
mod terminal;

use cli::Args;
use exit_handler::ProcessExit;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure.into()
        }
    }
}

async fn run() -> Result<ProcessExit> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let no_color = terminal::should_disable_color(
        args.no_color,
        terminal::no_color_env_requested(),
        terminal::is_dumb_terminal(),
    );
    terminal::init_tracing(
        terminal::default_log_level(args.quiet, args.verbose),
        no_color,
    );
    debug!(?args, "CLI arguments parsed");

    let loaded = match &args.config {
        Some(path) => LoadedConfig {
            path: Some(path.clone()),
            config: Some(config::load_file_config(path)?),
            loaded_from_file: true,
        },
        None => config::load_default_file_config()?,
    };
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        info!(path = %path.display(), "using config file");
    }
    let file_config = loaded.file_config();
    let catalog = file_config.catalog()?;

    if args.list {
        output::print_catalog(&catalog);
        return Ok(ProcessExit::Success);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(config::default_output_dir);
    let defaults = EngineConfig::default();
    let engine_config = EngineConfig {
        concurrency: args
            .concurrency
            .map(usize::from)
            .or(file_config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY),
        connect_timeout_secs: file_config
            .connect_timeout_secs
            .unwrap_or(defaults.connect_timeout_secs),
        resolver_timeout_secs: file_config
            .resolver_timeout_secs
            .unwrap_or(defaults.resolver_timeout_secs),
    };
    let engine = DownloadEngine::new(&engine_config)?;
    let batch = Arc::new(Batch::from_catalog(&catalog));

    info!(
        items = batch.len(),
        concurrency = engine.concurrency(),
        output_dir = %output_dir.display(),
        "appfetch starting"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            interrupt.cancel();
        }
    });

    let show_progress = terminal::should_show_progress(
        io::stderr().is_terminal(),
        args.quiet,
        args.json,
        terminal::is_dumb_terminal(),
    );
    let ui_stop = CancellationToken::new();
    let ui_handle = output::spawn_progress_ui(show_progress, Arc::clone(&batch), ui_stop.clone());

    let result = engine
        .run(&batch, &output_dir, cancel.clone())
        .await
        .with_context(|| format!("Failed to download into '{}'", output_dir.display()));

    ui_stop.cancel();
    if let Some(handle) = ui_handle {
        let _ = handle.await;
    }
    let stats = result?;

    let snapshot = batch.snapshot();
    if args.json {
        output::print_json(&snapshot)?;
    } else if !args.quiet {
        output::print_completion_summary(&snapshot, &output_dir, stats.was_cancelled());
    }

    Ok(exit_handler::exit_for_stats(&stats))
}
