//! `forkwatch daemon`: scheduler + control endpoint in the foreground.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;

use forkwatch_daemon::{start_blocking, DaemonConfig, DEFAULT_BIND};

use super::WatchArgs;

#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub watch: WatchArgs,

    /// Address of the HTTP control endpoint.
    #[arg(long, env = "FORKWATCH_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Log JSON lines instead of text.
    #[arg(long, env = "FORKWATCH_LOG_JSON")]
    pub log_json: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let config = DaemonConfig {
            credential: self.watch.credential(),
            interval: self.watch.interval(),
            repo_list: self.watch.repo_list,
            bind: self.bind,
            api_url: self.watch.api_url,
            git_host: self.watch.git_host,
            json_logs: self.log_json,
        };
        start_blocking(config).context("daemon exited with error")
    }
}
