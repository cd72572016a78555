pub mod check;
pub mod control;
pub mod daemon;
pub mod validate;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use forkwatch_core::Credential;
use forkwatch_daemon::DEFAULT_INTERVAL;
use forkwatch_sync::fetcher::GITHUB_API_URL;
use forkwatch_sync::mirror::GITHUB_GIT_HOST;

/// Settings shared by every command that talks to GitHub.
#[derive(Args)]
pub struct WatchArgs {
    /// Project list: an http(s) URL or a local file path.
    #[arg(long, env = "FORKWATCH_REPO_LIST")]
    pub repo_list: String,

    /// Account that pushes to downstream repositories.
    #[arg(long, env = "GITHUB_USERNAME")]
    pub github_username: String,

    /// Token for the commits API and for pushing.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Poll interval in seconds; also the freshness window.
    #[arg(
        long,
        env = "FORKWATCH_INTERVAL_SECS",
        default_value_t = DEFAULT_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_secs: u64,

    /// Base URL of the GitHub REST API.
    #[arg(long, env = "FORKWATCH_API_URL", default_value = GITHUB_API_URL)]
    pub api_url: String,

    /// Base URL repositories are cloned from and pushed to.
    #[arg(long, env = "FORKWATCH_GIT_HOST", default_value = GITHUB_GIT_HOST)]
    pub git_host: String,
}

impl WatchArgs {
    pub fn credential(&self) -> Arc<Credential> {
        Credential::new(self.github_username.clone(), self.github_token.clone())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl fmt::Debug for WatchArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchArgs")
            .field("repo_list", &self.repo_list)
            .field("github_username", &self.github_username)
            .field("github_token", &"***")
            .field("interval_secs", &self.interval_secs)
            .field("api_url", &self.api_url)
            .field("git_host", &self.git_host)
            .finish()
    }
}

/// Pretty-print a JSON value on stdout.
pub fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    use anyhow::Context;

    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
