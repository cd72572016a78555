//! # forkwatch-sync
//!
//! Freshness-gated mirroring of upstream repositories into downstream forks.
//!
//! Call [`orchestrator::run_tick`] with a project snapshot, a [`CommitSource`]
//! and a [`Mirror`] to evaluate and mirror every project once.

pub mod error;
pub mod fetcher;
pub mod freshness;
pub mod mirror;
pub mod orchestrator;

pub use error::{FetchError, GitStep, MirrorError};
pub use fetcher::{CommitInfo, CommitSource, GithubCommitSource};
pub use mirror::{GitMirror, Mirror, MirrorReport};
pub use orchestrator::{run_tick, ProjectOutcome, ProjectResult, TickOptions, TickReport};
