//! Downstream mirroring: clone, add upstream, rebase, force-push.
//!
//! ## `GitMirror::mirror` step protocol
//!
//! 1. Create a private temp directory (released on every exit path).
//! 2. `git clone --branch <b> --single-branch <downstream> repo`.
//! 3. `git remote add upstream <upstream>`.
//! 4. `git pull --rebase upstream <b>`. Downstream-only commits are replayed on
//!    top of upstream; a conflict aborts this project's mirror.
//! 5. `git push --force origin <b>` with the credential on the push URL.
//! 6. Remove the temp directory.
//!
//! The force-push overwrites downstream history on every successful run.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use forkwatch_core::{Credential, Project, RepoId};
use tempfile::TempDir;

use crate::error::{GitStep, MirrorError};

pub const GITHUB_GIT_HOST: &str = "https://github.com";

/// Remote name the upstream repository is registered under.
pub const UPSTREAM_REMOTE: &str = "upstream";
/// Remote name of the cloned downstream repository.
pub const ORIGIN_REMOTE: &str = "origin";

/// Result of a successful mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// Commit the downstream branch now points at.
    pub head: String,
    pub duration: Duration,
}

/// Mirrors one project's upstream branch onto its downstream.
pub trait Mirror: Send + Sync {
    fn mirror(&self, project: &Project) -> Result<MirrorReport, MirrorError>;
}

/// [`Mirror`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitMirror {
    git_host: String,
    credential: Arc<Credential>,
    git_binary: PathBuf,
    work_root: Option<PathBuf>,
}

impl GitMirror {
    pub fn new(git_host: impl Into<String>, credential: Arc<Credential>) -> Self {
        Self {
            git_host: git_host.into().trim_end_matches('/').to_owned(),
            credential,
            git_binary: PathBuf::from("git"),
            work_root: None,
        }
    }

    /// Create working directories under `root` instead of the system temp dir.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn with_git_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.git_binary = binary.into();
        self
    }

    /// Clone/fetch URL for `repo`, without credentials.
    pub fn repo_url(&self, repo: &RepoId) -> String {
        format!("{}/{}.git", self.git_host, repo)
    }

    /// Push URL for `repo`. Credentials are only attached for http(s) hosts,
    /// percent-encoded so `@`, `:` or `/` in them cannot change the authority.
    fn push_url(&self, repo: &RepoId) -> String {
        let url = self.repo_url(repo);
        for scheme in ["https://", "http://"] {
            if let Some(rest) = url.strip_prefix(scheme) {
                return format!(
                    "{scheme}{}:{}@{rest}",
                    urlencoding::encode(&self.credential.username),
                    urlencoding::encode(self.credential.token())
                );
            }
        }
        url
    }

    fn workspace(&self) -> Result<TempDir, MirrorError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("forkwatch-");
        let dir = match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.map_err(|source| MirrorError::Workspace { source })
    }

    fn run_steps(&self, project: &Project, workdir: &Path) -> Result<String, MirrorError> {
        let branch = project.branch.as_str();
        let repo = workdir.join("repo");

        let downstream_url = self.repo_url(&project.downstream);
        self.git(
            GitStep::Clone,
            workdir,
            [
                OsStr::new("clone"),
                OsStr::new("--branch"),
                OsStr::new(branch),
                OsStr::new("--single-branch"),
                OsStr::new(&downstream_url),
                repo.as_os_str(),
            ],
        )?;

        let upstream_url = self.repo_url(&project.upstream);
        self.git(
            GitStep::AddRemote,
            &repo,
            ["remote", "add", UPSTREAM_REMOTE, upstream_url.as_str()],
        )?;

        // Identity is needed when downstream-only commits get replayed.
        let name = format!("user.name={}", self.credential.username);
        let email = format!(
            "user.email={}@users.noreply.github.com",
            self.credential.username
        );
        self.git(
            GitStep::Rebase,
            &repo,
            [
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "pull",
                "--rebase",
                UPSTREAM_REMOTE,
                branch,
            ],
        )?;
        let head = self
            .git(GitStep::Rebase, &repo, ["rev-parse", "HEAD"])?
            .trim()
            .to_owned();

        let push_url = self.push_url(&project.downstream);
        self.git(
            GitStep::Push,
            &repo,
            ["remote", "set-url", "--push", ORIGIN_REMOTE, push_url.as_str()],
        )?;
        self.git(GitStep::Push, &repo, ["push", "--force", ORIGIN_REMOTE, branch])?;

        Ok(head)
    }

    fn git<I, S>(&self, step: GitStep, dir: &Path, args: I) -> Result<String, MirrorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.git_binary)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| MirrorError::Git {
                step,
                message: format!("cannot run {}: {e}", self.git_binary.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            let message = if detail.is_empty() {
                format!("exit code {}", output.status.code().unwrap_or(-1))
            } else {
                self.redact(detail)
            };
            return Err(MirrorError::Git { step, message });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn redact(&self, text: &str) -> String {
        let token = self.credential.token();
        if token.is_empty() {
            return text.to_owned();
        }
        let encoded = urlencoding::encode(token);
        text.replace(token, "***").replace(encoded.as_ref(), "***")
    }
}

impl Mirror for GitMirror {
    fn mirror(&self, project: &Project) -> Result<MirrorReport, MirrorError> {
        let started = Instant::now();
        let workdir = self.workspace()?;
        tracing::info!(
            project = %project.upstream,
            workdir = %workdir.path().display(),
            "cloning downstream"
        );

        let result = self.run_steps(project, workdir.path());

        let path = workdir.path().to_path_buf();
        if let Err(err) = workdir.close() {
            tracing::error!(path = %path.display(), error = %err, "cannot delete working directory");
        }

        result.map(|head| MirrorReport {
            head,
            duration: started.elapsed(),
        })
    }
}
