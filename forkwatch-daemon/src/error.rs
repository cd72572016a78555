use thiserror::Error;

use forkwatch_core::ConfigLoadError;

/// Error surface for the daemon runtime, control server, and control client.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("project list error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (no answer at {url})")]
    DaemonNotRunning { url: String },

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
}

pub(crate) fn io_err(context: impl Into<String>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        context: context.into(),
        source,
    }
}
