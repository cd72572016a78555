//! forkwatch: keep downstream forks in sync with their upstream repositories.
//!
//! # Usage
//!
//! ```text
//! forkwatch daemon   --repo-list <url|path> [--interval-secs N] [--bind ADDR]
//! forkwatch check    --repo-list <url|path> [--dry-run] [--json]
//! forkwatch validate <url|path> [--json]
//! forkwatch reload   [--repo-list <url|path>] [--url URL]
//! forkwatch sync     [--url URL]
//! forkwatch status   [--url URL]
//! ```
//!
//! `daemon` and `check` also read `GITHUB_USERNAME` / `GITHUB_TOKEN` and the
//! `FORKWATCH_*` variables listed in `--help`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    check::CheckArgs,
    control::{ControlArgs, ReloadArgs},
    daemon::DaemonArgs,
    validate::ValidateArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "forkwatch",
    version,
    about = "Mirror freshly pushed upstream branches onto downstream forks",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler and HTTP control endpoint in the foreground.
    Daemon(DaemonArgs),

    /// Run a single tick now, in this process.
    Check(CheckArgs),

    /// Load and validate a project list without touching any repository.
    Validate(ValidateArgs),

    /// Ask a running daemon to reload its project list.
    Reload(ReloadArgs),

    /// Ask a running daemon to run a tick now.
    Sync(ControlArgs),

    /// Show a running daemon's state and last tick.
    Status(ControlArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Daemon(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Validate(args) => args.run(),
        Commands::Reload(args) => args.run(),
        Commands::Sync(args) => commands::control::sync(args),
        Commands::Status(args) => commands::control::status(args),
    }
}
