//! Project registry: loads the project list and hands out snapshots.
//!
//! # Source locators
//!
//! ```text
//! https://example.com/repos.yaml   fetched over HTTP(S)
//! /etc/forkwatch/repos.yaml        read from disk
//! repos.yaml                       read from disk, relative to the CWD
//! ```
//!
//! Anything that does not start with `http://` or `https://` is a path.
//!
//! # Snapshot model
//!
//! [`ProjectRegistry`] stores an `Arc<ProjectSet>`. Readers clone the `Arc`
//! under a short read lock; reload parses the new document without holding that
//! lock and only then swaps the `Arc` in. A tick that already took its snapshot keeps
//! iterating the old set, and no reader ever sees a half-built collection.
//!
//! Reloads themselves run one at a time, so `reload(None)` always re-reads the
//! locator the previous reload left behind and can never overwrite a newer
//! locator with the old one's set.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::error::ConfigLoadError;
use crate::types::ProjectSet;

/// Timeout for fetching a remote project list.
pub const REMOTE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// 1. Locator
// ---------------------------------------------------------------------------

/// Where a project list document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Url(String),
    Path(PathBuf),
}

impl SourceLocator {
    pub fn parse(raw: &str) -> Result<Self, ConfigLoadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigLoadError::EmptyLocator);
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Url(raw.to_owned()))
        } else {
            Ok(Self::Path(PathBuf::from(raw)))
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Url(url) => url.fmt(f),
            SourceLocator::Path(path) => path.display().fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate a project list from `locator`.
pub fn load(locator: &SourceLocator) -> Result<ProjectSet, ConfigLoadError> {
    let contents = match locator {
        SourceLocator::Path(path) => read_file(path)?,
        SourceLocator::Url(url) => fetch_url(url)?,
    };
    parse(&contents, &locator.to_string())
}

/// Parse a project list document. `origin` only labels errors.
pub fn parse(contents: &str, origin: &str) -> Result<ProjectSet, ConfigLoadError> {
    let set: ProjectSet = serde_yaml::from_str(contents).map_err(|e| ConfigLoadError::Parse {
        locator: origin.to_owned(),
        source: e,
    })?;
    for (index, project) in set.iter().enumerate() {
        project
            .validate()
            .map_err(|reason| ConfigLoadError::InvalidProject {
                locator: origin.to_owned(),
                index,
                reason,
            })?;
    }
    Ok(set)
}

fn read_file(path: &Path) -> Result<String, ConfigLoadError> {
    std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn fetch_url(url: &str) -> Result<String, ConfigLoadError> {
    let agent = ureq::AgentBuilder::new()
        .timeout(REMOTE_FETCH_TIMEOUT)
        .build();
    let response = agent.get(url).call().map_err(|err| {
        let message = match err {
            ureq::Error::Status(code, _) => format!("HTTP {code}"),
            ureq::Error::Transport(transport) => transport.to_string(),
        };
        ConfigLoadError::Fetch {
            url: url.to_owned(),
            message,
        }
    })?;
    response.into_string().map_err(|e| ConfigLoadError::Fetch {
        url: url.to_owned(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// 3. Registry
// ---------------------------------------------------------------------------

struct Loaded {
    locator: SourceLocator,
    projects: Arc<ProjectSet>,
}

/// Owner of the current [`ProjectSet`] and the locator it came from.
pub struct ProjectRegistry {
    inner: RwLock<Loaded>,
    reload_lock: Mutex<()>,
}

impl ProjectRegistry {
    /// Initial load. A failure here is a startup failure.
    pub fn open(locator: SourceLocator) -> Result<Self, ConfigLoadError> {
        let projects = load(&locator)?;
        tracing::info!(source = %locator, projects = projects.len(), "project list loaded");
        Ok(Self::with_projects(locator, projects))
    }

    /// Build a registry around an already-loaded set.
    pub fn with_projects(locator: SourceLocator, projects: ProjectSet) -> Self {
        Self {
            inner: RwLock::new(Loaded {
                locator,
                projects: Arc::new(projects),
            }),
            reload_lock: Mutex::new(()),
        }
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<ProjectSet> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.projects.clone()
    }

    /// Locator of the current snapshot.
    pub fn locator(&self) -> SourceLocator {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.locator.clone()
    }

    /// Replace the project set.
    ///
    /// With `Some(raw)` the new locator is loaded and remembered; with `None`
    /// the last-used locator is re-read. On any error the current snapshot and
    /// locator are left untouched.
    pub fn reload(&self, locator: Option<&str>) -> Result<Arc<ProjectSet>, ConfigLoadError> {
        let _reloading = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let locator = match locator {
            Some(raw) => SourceLocator::parse(raw)?,
            None => self.locator(),
        };
        let projects = Arc::new(load(&locator)?);

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.projects = projects.clone();
        guard.locator = locator;
        tracing::info!(source = %guard.locator, projects = projects.len(), "project list reloaded");
        Ok(projects)
    }
}

impl fmt::Debug for ProjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ProjectRegistry")
            .field("locator", &guard.locator)
            .field("projects", &guard.projects.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ONE: &str = "projects:\n  - upstream: org/lib\n    downstream: me/lib\n    branch: main\n";

    #[test]
    fn locator_detects_urls_case_insensitively() {
        assert_eq!(
            SourceLocator::parse("HTTPS://host/x.yaml").unwrap(),
            SourceLocator::Url("HTTPS://host/x.yaml".into())
        );
        assert_eq!(
            SourceLocator::parse(" repos.yaml ").unwrap(),
            SourceLocator::Path(PathBuf::from("repos.yaml"))
        );
    }

    #[test]
    fn empty_locator_is_rejected() {
        assert!(matches!(
            SourceLocator::parse("  "),
            Err(ConfigLoadError::EmptyLocator)
        ));
    }

    #[test]
    fn parse_reports_invalid_project_index() {
        let yaml = "projects:\n  - upstream: org/lib\n    downstream: me/lib\n    branch: main\n  - upstream: org/x\n    downstream: org/x\n    branch: main\n";
        let err = parse(yaml, "inline").unwrap_err();
        match err {
            ConfigLoadError::InvalidProject { index, .. } => assert_eq!(index, 1),
            other => panic!("expected invalid project, got {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_malformed_repo_id() {
        let yaml = "projects:\n  - upstream: not-a-repo\n    downstream: me/lib\n    branch: main\n";
        assert!(matches!(
            parse(yaml, "inline"),
            Err(ConfigLoadError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_returns_io_error_with_path() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("missing.yaml");
        let err = load(&SourceLocator::Path(path)).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Io { .. }));
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn snapshot_survives_reload() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("repos.yaml");
        std::fs::write(&path, ONE).expect("write");

        let registry = ProjectRegistry::open(SourceLocator::Path(path.clone())).expect("open");
        let before = registry.snapshot();

        std::fs::write(&path, "projects: []\n").expect("rewrite");
        let after = registry.reload(None).expect("reload");

        assert_eq!(before.len(), 1, "old snapshot must be unaffected");
        assert!(after.is_empty());
        assert!(registry.snapshot().is_empty());
    }
}
