//! Upstream tip-commit lookup.
//!
//! [`CommitSource`] is keyed by `{upstream, branch}` only, so another hosting
//! provider is a new implementation and nothing else changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use forkwatch_core::{BranchName, Credential, RepoId};

use crate::error::FetchError;

pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Timeout for a single commit lookup.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Committer time of the upstream tip commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    pub committed_at: DateTime<Utc>,
}

/// Looks up the latest commit on a branch.
pub trait CommitSource: Send + Sync {
    fn latest_commit(&self, upstream: &RepoId, branch: &BranchName)
        -> Result<CommitInfo, FetchError>;
}

/// GitHub REST implementation: `GET /repos/{owner}/{name}/commits/{branch}`.
pub struct GithubCommitSource {
    agent: ureq::Agent,
    api_base: String,
    credential: Arc<Credential>,
}

impl GithubCommitSource {
    pub fn new(api_base: impl Into<String>, credential: Arc<Credential>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("forkwatch/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            credential,
        }
    }

    pub fn commit_url(&self, upstream: &RepoId, branch: &BranchName) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base,
            upstream.owner(),
            upstream.name(),
            branch
        )
    }
}

impl CommitSource for GithubCommitSource {
    fn latest_commit(
        &self,
        upstream: &RepoId,
        branch: &BranchName,
    ) -> Result<CommitInfo, FetchError> {
        let url = self.commit_url(upstream, branch);
        tracing::debug!(%url, "fetching upstream tip commit");

        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("token {}", self.credential.token()))
            .set("Accept", "application/vnd.github+json")
            .call()
            .map_err(|err| match err {
                ureq::Error::Status(status, _) => FetchError::Status {
                    url: url.clone(),
                    status,
                },
                ureq::Error::Transport(transport) => FetchError::Transport {
                    url: url.clone(),
                    message: transport.to_string(),
                },
            })?;

        let body = response.into_string().map_err(|e| FetchError::Body {
            url: url.clone(),
            message: e.to_string(),
        })?;
        parse_commit_info(&body, &url)
    }
}

/// Extract `commit.committer.date` from a commit API response body.
///
/// The committer date is used rather than the author date: a rebased or
/// cherry-picked commit keeps its old author date but lands with a new
/// committer date.
pub fn parse_commit_info(body: &str, url: &str) -> Result<CommitInfo, FetchError> {
    let json: Value = serde_json::from_str(body).map_err(|e| FetchError::Body {
        url: url.to_owned(),
        message: e.to_string(),
    })?;

    let date = json
        .get("commit")
        .and_then(|commit| commit.get("committer"))
        .and_then(|committer| committer.get("date"))
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::MissingField {
            url: url.to_owned(),
            field: "commit.committer.date",
        })?;

    let committed_at = DateTime::parse_from_rfc3339(date)
        .map_err(|e| FetchError::Timestamp {
            value: date.to_owned(),
            source: e,
        })?
        .with_timezone(&Utc);
    Ok(CommitInfo { committed_at })
}
