//! Error types for forkwatch-sync.
//!
//! Both enums are per-project failures: the orchestrator records them in the
//! project's outcome and moves on to the next project.

use std::fmt;

use thiserror::Error;

/// Failure to learn the upstream tip commit time.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS or timeout failure.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The API answered with a non-2xx status.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body could not be read or was not JSON.
    #[error("response from {url} is not valid JSON: {message}")]
    Body { url: String, message: String },

    /// JSON parsed but `commit.committer.date` was absent or not a string.
    #[error("response from {url} has no {field}")]
    MissingField { url: String, field: &'static str },

    /// The committer date is not an RFC 3339 instant.
    #[error("cannot parse commit timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One step of the mirror sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStep {
    Clone,
    AddRemote,
    Rebase,
    Push,
}

impl fmt::Display for GitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitStep::Clone => write!(f, "clone"),
            GitStep::AddRemote => write!(f, "remote add"),
            GitStep::Rebase => write!(f, "rebase"),
            GitStep::Push => write!(f, "push"),
        }
    }
}

/// Failure while mirroring a single project.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The temporary working directory could not be created.
    #[error("cannot create working directory: {source}")]
    Workspace {
        #[source]
        source: std::io::Error,
    },

    /// A git command failed or could not be started. `message` is redacted.
    #[error("git {step} failed: {message}")]
    Git { step: GitStep, message: String },
}

impl MirrorError {
    /// The failed step, if the failure came from git.
    pub fn step(&self) -> Option<GitStep> {
        match self {
            MirrorError::Git { step, .. } => Some(*step),
            MirrorError::Workspace { .. } => None,
        }
    }
}
