//! Domain types for the forkwatch project list.
//!
//! All types are serializable/deserializable via serde + serde_yaml. Repository
//! identifiers are validated on construction, so a loaded [`ProjectSet`] only
//! ever holds well-formed `owner/name` pairs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A hosted repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Parse an `owner/name` identifier.
    ///
    /// Both halves must be non-empty and free of whitespace; exactly one `/`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let mut parts = trimmed.split('/');
        let (Some(owner), Some(name), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("repository '{raw}' must be in owner/name form"));
        };
        let valid = |s: &str| !s.is_empty() && !s.chars().any(char::is_whitespace);
        if !valid(owner) || !valid(name) {
            return Err(format!("repository '{raw}' must be in owner/name form"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or(&self.0)
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for RepoId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for RepoId {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

/// The single branch mirrored between upstream and downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl BranchName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A tracked sync target: `upstream` is mirrored onto `downstream` for `branch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub upstream: RepoId,
    pub downstream: RepoId,
    pub branch: BranchName,
}

impl Project {
    /// Checks the invariants serde cannot express on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream == self.downstream {
            return Err(format!(
                "upstream and downstream must differ (both are '{}')",
                self.upstream
            ));
        }
        if self.branch.0.trim().is_empty() {
            return Err(format!("project '{}' has an empty branch", self.upstream));
        }
        Ok(())
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.upstream, self.downstream, self.branch)
    }
}

/// Root of the project list document.
///
/// Replaced wholesale on reload; shared as `Arc<ProjectSet>` snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectSet {
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl ProjectSet {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Project> {
        self.projects.iter()
    }
}

impl<'a> IntoIterator for &'a ProjectSet {
    type Item = &'a Project;
    type IntoIter = std::slice::Iter<'a, Project>;

    fn into_iter(self) -> Self::IntoIter {
        self.projects.iter()
    }
}

/// Username/token pair used for API reads and pushes.
///
/// Read-only after startup; share it as `Arc<Credential>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            username: username.into(),
            token: token.into(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
