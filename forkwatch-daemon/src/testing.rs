//! In-process fakes for runtime and router tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use forkwatch_core::{BranchName, Project, ProjectRegistry, ProjectSet, RepoId, SourceLocator};
use forkwatch_sync::{
    CommitInfo, CommitSource, FetchError, Mirror, MirrorError, MirrorReport, TickOptions,
};

use crate::runtime::TickEngine;

pub(crate) fn project(name: &str) -> Project {
    Project {
        upstream: RepoId::parse(&format!("org/{name}")).unwrap(),
        downstream: RepoId::parse(&format!("me/{name}")).unwrap(),
        branch: BranchName::from("main"),
    }
}

/// Reports every upstream as committed "now", so every tick mirrors.
pub(crate) struct StubSource;

impl StubSource {
    pub(crate) fn fresh() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl CommitSource for StubSource {
    fn latest_commit(&self, _: &RepoId, _: &BranchName) -> Result<CommitInfo, FetchError> {
        Ok(CommitInfo {
            committed_at: Utc::now(),
        })
    }
}

#[derive(Default)]
pub(crate) struct CountingMirror {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl CountingMirror {
    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// The first mirror call blocks until the returned sender fires or drops.
    pub(crate) fn gated() -> (Self, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        let mirror = Self {
            gate: Mutex::new(Some(gate)),
            ..Default::default()
        };
        (mirror, release)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Mirror for CountingMirror {
    fn mirror(&self, _project: &Project) -> Result<MirrorReport, MirrorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let gate = self.gate.lock().ok().and_then(|mut gate| gate.take());
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(MirrorReport {
            head: "0000000".into(),
            duration: self.delay,
        })
    }
}

pub(crate) fn engine(
    projects: Vec<Project>,
    source: Arc<dyn CommitSource>,
    mirror: Arc<dyn Mirror>,
) -> TickEngine {
    engine_with_registry(
        Arc::new(ProjectRegistry::with_projects(
            SourceLocator::Path(PathBuf::from("projects.yaml")),
            ProjectSet::new(projects),
        )),
        source,
        mirror,
    )
}

pub(crate) fn engine_with_registry(
    registry: Arc<ProjectRegistry>,
    source: Arc<dyn CommitSource>,
    mirror: Arc<dyn Mirror>,
) -> TickEngine {
    TickEngine {
        registry,
        source,
        mirror,
        options: TickOptions::default(),
    }
}
