//! Error types for forkwatch-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading a project list.
///
/// Fatal to a reload, never to a running daemon: the registry keeps its last
/// good snapshot when a load fails.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The locator was empty or whitespace.
    #[error("project list locator is empty")]
    EmptyLocator,

    /// Local file could not be read.
    #[error("cannot read project list at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Remote document could not be fetched (transport failure or non-2xx).
    #[error("cannot fetch project list from {url}: {message}")]
    Fetch { url: String, message: String },

    /// YAML parse error. Includes the locator and line context from serde_yaml.
    #[error("failed to parse project list at {locator}: {source}")]
    Parse {
        locator: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A project entry parsed but broke an invariant.
    #[error("invalid project #{index} in {locator}: {reason}")]
    InvalidProject {
        locator: String,
        index: usize,
        reason: String,
    },
}
