//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch the latest installers for a fixed set of desktop apps.
///
/// Appfetch downloads every entry of its catalog into one directory, a few at
/// a time, resolving "latest release" markers to concrete URLs first.
#[derive(Parser, Debug)]
#[command(name = "appfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-100) [default: 5, or config value]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Directory to download into [default: ~/Downloads, or config value]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the final batch state as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print the effective catalog and exit without downloading
    #[arg(long)]
    pub list: bool,
}
