//! `forkwatch reload | sync | status`: clients of a running daemon.

use anyhow::{Context, Result};
use clap::Args;

use forkwatch_daemon::{request_reload, request_status, request_sync, DaemonError};

pub const DEFAULT_URL: &str = "http://127.0.0.1:8080";

#[derive(Args, Debug)]
pub struct ControlArgs {
    /// Base URL of the daemon's control endpoint.
    #[arg(long, env = "FORKWATCH_URL", default_value = DEFAULT_URL)]
    pub url: String,
}

#[derive(Args, Debug)]
pub struct ReloadArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Load this list instead of re-reading the one in use.
    #[arg(long)]
    pub repo_list: Option<String>,
}

impl ReloadArgs {
    pub fn run(self) -> Result<()> {
        let data = request_reload(&self.control.url, self.repo_list.as_deref())
            .context("reload failed")?;
        super::print_json(&data)
    }
}

pub fn sync(args: ControlArgs) -> Result<()> {
    let data = request_sync(&args.url).context("sync failed")?;
    super::print_json(&data)
}

pub fn status(args: ControlArgs) -> Result<()> {
    match request_status(&args.url) {
        Ok(status) => super::print_json(&status),
        Err(DaemonError::DaemonNotRunning { .. }) => super::print_json(&serde_json::json!({
            "running": false,
            "url": args.url,
        })),
        Err(err) => Err(err).context("failed to query daemon status"),
    }
}
