//! forkwatch core library: project list types, loading, and the registry.
//!
//! - [`types`]: repository identifiers, projects, credential
//! - [`error`]: [`ConfigLoadError`]
//! - [`registry`]: locator parsing, load, snapshot-swapping registry

pub mod error;
pub mod registry;
pub mod types;

pub use error::ConfigLoadError;
pub use registry::{ProjectRegistry, SourceLocator};
pub use types::{BranchName, Credential, Project, ProjectSet, RepoId};
