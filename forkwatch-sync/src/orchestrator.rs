//! Per-tick sync pipeline shared by the CLI and the daemon.
//!
//! For each project, in set order: look up the upstream tip commit, compare it
//! with the tick time, and mirror when fresh. Every project is handled on its
//! own: a failure is recorded in that project's [`ProjectOutcome`] and the loop
//! continues with the next one.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use forkwatch_core::{Project, ProjectSet};

use crate::fetcher::CommitSource;
use crate::freshness::{self, DEFAULT_WINDOW};
use crate::mirror::Mirror;

/// Knobs for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOptions {
    pub window: Duration,
    /// Evaluate freshness but never mirror.
    pub dry_run: bool,
}

impl Default for TickOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            dry_run: false,
        }
    }
}

/// What happened to one project during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    Mirrored { head: String },
    /// `dry_run` mode: the project *would* have been mirrored.
    WouldMirror,
    /// Upstream has no commit inside the window.
    UpToDate { age_secs: i64 },
    FetchFailed { error: String },
    MirrorFailed { error: String },
}

impl ProjectOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProjectOutcome::FetchFailed { .. } | ProjectOutcome::MirrorFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectResult {
    pub project: Project,
    pub committed_at: Option<DateTime<Utc>>,
    pub outcome: ProjectOutcome,
}

/// All outcomes of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick_time: DateTime<Utc>,
    pub results: Vec<ProjectResult>,
    pub duration: Duration,
}

impl TickReport {
    pub fn count(&self, pred: impl Fn(&ProjectOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn mirrored(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::Mirrored { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(ProjectOutcome::is_failure)
    }
}

/// Run one tick over `projects` with `tick_time` as the reference time.
pub fn run_tick(
    projects: &ProjectSet,
    tick_time: DateTime<Utc>,
    source: &dyn CommitSource,
    mirror: &dyn Mirror,
    options: &TickOptions,
) -> TickReport {
    let started = Instant::now();
    let results = projects
        .iter()
        .map(|project| process_project(project, tick_time, source, mirror, options))
        .collect();

    let report = TickReport {
        tick_time,
        results,
        duration: started.elapsed(),
    };
    tracing::info!(
        tick = %tick_time.to_rfc3339(),
        projects = report.results.len(),
        mirrored = report.mirrored(),
        failed = report.failed(),
        "--------- check for {} finished",
        tick_time.to_rfc3339()
    );
    report
}

fn process_project(
    project: &Project,
    tick_time: DateTime<Utc>,
    source: &dyn CommitSource,
    mirror: &dyn Mirror,
    options: &TickOptions,
) -> ProjectResult {
    let upstream = &project.upstream;

    let commit = match source.latest_commit(upstream, &project.branch) {
        Ok(commit) => commit,
        Err(err) => {
            tracing::warn!(project = %upstream, error = %err, "cannot fetch upstream commit, skipping");
            return ProjectResult {
                project: project.clone(),
                committed_at: None,
                outcome: ProjectOutcome::FetchFailed {
                    error: err.to_string(),
                },
            };
        }
    };

    let committed_at = Some(commit.committed_at);
    let age_secs = freshness::elapsed_seconds(commit.committed_at, tick_time);
    if !freshness::is_fresh(commit.committed_at, tick_time, options.window) {
        tracing::info!(
            project = %upstream,
            age = %freshness::format_age(age_secs),
            "no push in the last interval"
        );
        return ProjectResult {
            project: project.clone(),
            committed_at,
            outcome: ProjectOutcome::UpToDate { age_secs },
        };
    }

    if options.dry_run {
        tracing::info!(project = %upstream, "[dry-run] would mirror to {}", project.downstream);
        return ProjectResult {
            project: project.clone(),
            committed_at,
            outcome: ProjectOutcome::WouldMirror,
        };
    }

    let outcome = match mirror.mirror(project) {
        Ok(report) => {
            tracing::info!(
                project = %upstream,
                downstream = %project.downstream,
                head = %report.head,
                duration_ms = report.duration.as_millis() as u64,
                "downstream updated"
            );
            ProjectOutcome::Mirrored { head: report.head }
        }
        Err(err) => {
            tracing::error!(project = %upstream, error = %err, "mirror failed");
            ProjectOutcome::MirrorFailed {
                error: err.to_string(),
            }
        }
    };

    ProjectResult {
        project: project.clone(),
        committed_at,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::TimeZone;
    use forkwatch_core::{BranchName, RepoId};

    use super::*;
    use crate::error::{FetchError, GitStep, MirrorError};
    use crate::fetcher::CommitInfo;
    use crate::mirror::MirrorReport;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::minutes(m)
    }

    fn project(name: &str) -> Project {
        Project {
            upstream: RepoId::parse(&format!("org/{name}")).unwrap(),
            downstream: RepoId::parse(&format!("me/{name}")).unwrap(),
            branch: BranchName::from("main"),
        }
    }

    /// Every upstream committed at `t0()` unless listed in `failing`.
    struct StubSource {
        failing: Vec<&'static str>,
    }

    impl CommitSource for StubSource {
        fn latest_commit(
            &self,
            upstream: &RepoId,
            _branch: &BranchName,
        ) -> Result<CommitInfo, FetchError> {
            if self.failing.iter().any(|f| *f == upstream.as_str()) {
                return Err(FetchError::Status {
                    url: format!("stub/{upstream}"),
                    status: 502,
                });
            }
            Ok(CommitInfo { committed_at: t0() })
        }
    }

    #[derive(Default)]
    struct RecordingMirror {
        calls: Mutex<Vec<String>>,
        failures: HashMap<&'static str, GitStep>,
    }

    impl RecordingMirror {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Mirror for RecordingMirror {
        fn mirror(&self, project: &Project) -> Result<MirrorReport, MirrorError> {
            self.calls.lock().unwrap().push(project.upstream.to_string());
            if let Some(step) = self.failures.get(project.upstream.as_str()) {
                return Err(MirrorError::Git {
                    step: *step,
                    message: "CONFLICT".into(),
                });
            }
            Ok(MirrorReport {
                head: "abc123".into(),
                duration: Duration::ZERO,
            })
        }
    }

    fn ok_source() -> StubSource {
        StubSource { failing: vec![] }
    }

    #[test]
    fn fresh_commit_mirrors_exactly_once() {
        let set = ProjectSet::new(vec![project("lib")]);
        let mirror = RecordingMirror::default();

        let report = run_tick(&set, minutes(30), &ok_source(), &mirror, &TickOptions::default());

        assert_eq!(mirror.calls(), ["org/lib"]);
        assert_eq!(
            report.results[0].outcome,
            ProjectOutcome::Mirrored { head: "abc123".into() }
        );
        assert_eq!(report.results[0].committed_at, Some(t0()));
    }

    #[test]
    fn stale_commit_never_mirrors() {
        let set = ProjectSet::new(vec![project("lib")]);
        let mirror = RecordingMirror::default();

        let report = run_tick(&set, minutes(120), &ok_source(), &mirror, &TickOptions::default());

        assert!(mirror.calls().is_empty());
        assert_eq!(
            report.results[0].outcome,
            ProjectOutcome::UpToDate { age_secs: 7200 }
        );
    }

    #[test]
    fn fetch_failure_does_not_block_later_projects() {
        let set = ProjectSet::new(vec![project("a"), project("b")]);
        let source = StubSource { failing: vec!["org/a"] };
        let mirror = RecordingMirror::default();

        let report = run_tick(&set, minutes(10), &source, &mirror, &TickOptions::default());

        assert!(matches!(report.results[0].outcome, ProjectOutcome::FetchFailed { .. }));
        assert!(matches!(report.results[1].outcome, ProjectOutcome::Mirrored { .. }));
        assert_eq!(mirror.calls(), ["org/b"]);
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn mirror_failure_does_not_block_later_projects() {
        let set = ProjectSet::new(vec![project("a"), project("b"), project("c")]);
        let mirror = RecordingMirror {
            failures: HashMap::from([("org/b", GitStep::Rebase)]),
            ..Default::default()
        };

        let report = run_tick(&set, minutes(5), &ok_source(), &mirror, &TickOptions::default());

        assert_eq!(mirror.calls(), ["org/a", "org/b", "org/c"], "order must follow the set");
        match &report.results[1].outcome {
            ProjectOutcome::MirrorFailed { error } => assert!(error.contains("rebase")),
            other => panic!("expected mirror failure, got {other:?}"),
        }
        assert_eq!(report.mirrored(), 2);
    }

    #[test]
    fn dry_run_reports_without_mirroring() {
        let set = ProjectSet::new(vec![project("lib")]);
        let mirror = RecordingMirror::default();
        let options = TickOptions {
            dry_run: true,
            ..Default::default()
        };

        let report = run_tick(&set, minutes(1), &ok_source(), &mirror, &options);

        assert!(mirror.calls().is_empty());
        assert_eq!(report.results[0].outcome, ProjectOutcome::WouldMirror);
    }

    #[test]
    fn empty_set_is_an_empty_report() {
        let mirror = RecordingMirror::default();
        let report = run_tick(
            &ProjectSet::default(),
            t0(),
            &ok_source(),
            &mirror,
            &TickOptions::default(),
        );
        assert!(report.results.is_empty());
        assert_eq!(report.tick_time, t0());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ProjectOutcome::UpToDate { age_secs: 90 }).unwrap();
        assert_eq!(json["status"], "up_to_date");
        assert_eq!(json["age_secs"], 90);
    }
}
