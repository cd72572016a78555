use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use forkwatch_core::{Credential, Project, ProjectRegistry, SourceLocator};
use forkwatch_sync::{
    run_tick, CommitSource, GitMirror, GithubCommitSource, Mirror, ProjectOutcome, TickOptions,
    TickReport,
};

use crate::error::{io_err, DaemonError};
use crate::server::{self, AppState};

/// Default poll interval. Also the freshness window.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default control server address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Everything the daemon needs to start.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Project list locator: `http(s)://` URL or local path.
    pub repo_list: String,
    pub credential: Arc<Credential>,
    pub interval: Duration,
    pub bind: SocketAddr,
    pub api_url: String,
    pub git_host: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

/// What caused a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTrigger {
    Schedule,
    Manual,
    /// A one-off tick outside the daemon (`forkwatch check`).
    Once,
}

impl fmt::Display for TickTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickTrigger::Schedule => write!(f, "schedule"),
            TickTrigger::Manual => write!(f, "manual"),
            TickTrigger::Once => write!(f, "once"),
        }
    }
}

/// The dependencies a tick runs against.
#[derive(Clone)]
pub struct TickEngine {
    pub registry: Arc<ProjectRegistry>,
    pub source: Arc<dyn CommitSource>,
    pub mirror: Arc<dyn Mirror>,
    pub options: TickOptions,
}

impl TickEngine {
    /// GitHub API lookups and `git` CLI mirroring, as configured.
    pub fn github(registry: Arc<ProjectRegistry>, config: &DaemonConfig) -> Self {
        Self {
            registry,
            source: Arc::new(GithubCommitSource::new(
                config.api_url.clone(),
                config.credential.clone(),
            )),
            mirror: Arc::new(GitMirror::new(
                config.git_host.clone(),
                config.credential.clone(),
            )),
            options: TickOptions {
                window: config.interval,
                dry_run: false,
            },
        }
    }

    /// One tick over the current snapshot. Blocking.
    pub fn run(&self, tick_time: DateTime<Utc>) -> TickReport {
        let projects = self.registry.snapshot();
        run_tick(
            &projects,
            tick_time,
            self.source.as_ref(),
            self.mirror.as_ref(),
            &self.options,
        )
    }
}

struct TickJob {
    tick_time: DateTime<Utc>,
    trigger: TickTrigger,
    /// `None` for scheduled ticks; nobody waits on those.
    respond_to: Option<oneshot::Sender<TickSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub outcome: ProjectOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub tick_time: DateTime<Utc>,
    pub trigger: TickTrigger,
    pub projects: Vec<ProjectSummary>,
    pub mirrored: usize,
    pub up_to_date: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

/// Queue handle for requesting ticks and reading the last one's summary.
#[derive(Clone)]
pub struct TickHandle {
    tx: mpsc::Sender<TickJob>,
    last: Arc<RwLock<Option<TickSummary>>>,
}

impl TickHandle {
    /// Enqueue a tick at the current time and wait for its summary.
    ///
    /// Ticks run one at a time; a request made while another tick is running
    /// waits for it to finish.
    pub async fn run_now(&self, trigger: TickTrigger) -> Result<TickSummary, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.submit(TickJob {
            tick_time: Utc::now(),
            trigger,
            respond_to: Some(tx),
        })
        .await?;

        rx.await
            .map_err(|_| DaemonError::ChannelClosed("tick response"))
    }

    /// Queue a tick stamped `tick_time` without waiting for it to run.
    ///
    /// Only waits while the queue is full.
    pub async fn enqueue(
        &self,
        trigger: TickTrigger,
        tick_time: DateTime<Utc>,
    ) -> Result<(), DaemonError> {
        self.submit(TickJob {
            tick_time,
            trigger,
            respond_to: None,
        })
        .await
    }

    async fn submit(&self, job: TickJob) -> Result<(), DaemonError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| DaemonError::ChannelClosed("tick queue"))
    }

    pub async fn last(&self) -> Option<TickSummary> {
        self.last.read().await.clone()
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing(config.json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon runtime until Ctrl-C.
///
/// The initial project list load happens before anything is spawned; a
/// failure there is returned and the daemon never starts.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let locator = SourceLocator::parse(&config.repo_list)?;
    let registry = tokio::task::spawn_blocking(move || ProjectRegistry::open(locator))
        .await
        .map_err(|err| DaemonError::Protocol(format!("initial load join error: {err}")))??;
    let engine = TickEngine::github(Arc::new(registry), &config);

    let listener = TcpListener::bind(config.bind)
        .await
        .map_err(|e| io_err(format!("bind {}", config.bind), e))?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let served = serve(listener, engine, config.interval, shutdown_tx.clone()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;
    served
}

/// Run the scheduler, tick processor, and control server on `listener` until
/// `shutdown` fires or one of them fails.
pub async fn serve(
    listener: TcpListener,
    engine: TickEngine,
    interval: Duration,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let addr = listener
        .local_addr()
        .map_err(|e| io_err("control server address", e))?;
    let registry = engine.registry.clone();

    let (ticks, processor_handle) = spawn_tick_processor(engine, shutdown.clone());

    let scheduler_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let ticks = ticks.clone();
        tokio::spawn(async move {
            let result = scheduler_task(interval, ticks, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let server_handle = {
        let shutdown = shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        let app = server::build_router(AppState {
            registry,
            ticks,
            started_at: Utc::now(),
            interval,
        });
        tokio::spawn(async move {
            tracing::info!(%addr, "control server listening");
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(|e| io_err("control server", e));
            let _ = shutdown.send(());
            result
        })
    };

    let (processor_result, scheduler_result, server_result) =
        tokio::join!(processor_handle, scheduler_handle, server_handle);

    handle_join("tick_processor", processor_result)?;
    handle_join("scheduler", scheduler_result)?;
    handle_join("control_server", server_result)?;
    Ok(())
}

/// Spawn the single task that runs ticks, and return the handle that feeds it.
pub fn spawn_tick_processor(
    engine: TickEngine,
    shutdown: broadcast::Sender<()>,
) -> (TickHandle, JoinHandle<Result<(), DaemonError>>) {
    let (tx, rx) = mpsc::channel::<TickJob>(16);
    let last = Arc::new(RwLock::new(None));
    let handle = TickHandle {
        tx,
        last: last.clone(),
    };

    let shutdown_rx = shutdown.subscribe();
    let join = tokio::spawn(async move {
        let result = tick_processor_task(engine, rx, last, shutdown_rx).await;
        let _ = shutdown.send(());
        result
    });
    (handle, join)
}

async fn tick_processor_task(
    engine: TickEngine,
    mut tick_rx: mpsc::Receiver<TickJob>,
    last: Arc<RwLock<Option<TickSummary>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = tick_rx.recv() => {
                let Some(job) = maybe_job else { break };
                tracing::debug!(trigger = %job.trigger, tick = %job.tick_time.to_rfc3339(), "tick started");

                let tick_engine = engine.clone();
                let tick_time = job.tick_time;
                let report = tokio::task::spawn_blocking(move || tick_engine.run(tick_time))
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("tick task join error: {err}")))?;

                let summary = TickSummary::from_report(report, job.trigger);
                tracing::info!(
                    trigger = %summary.trigger,
                    tick = %summary.tick_time.to_rfc3339(),
                    projects = summary.projects.len(),
                    mirrored = summary.mirrored,
                    failed = summary.failed,
                    duration_ms = summary.duration_ms,
                    "tick completed",
                );
                *last.write().await = Some(summary.clone());
                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(summary);
                }
            }
        }
    }

    Ok(())
}

async fn scheduler_task(
    interval: Duration,
    ticks: TickHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // The first tick completes immediately. Ticks that fall due while the
    // queue is full are delivered late, each stamped with its own fire time.
    let started = Instant::now();
    let started_at = Utc::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            fired = ticker.tick() => {
                let offset = chrono::Duration::from_std(fired.duration_since(started))
                    .unwrap_or_else(|_| chrono::Duration::zero());
                let tick_time = started_at + offset;

                match ticks.enqueue(TickTrigger::Schedule, tick_time).await {
                    Ok(()) => {
                        tracing::debug!(tick = %tick_time.to_rfc3339(), "scheduled tick queued");
                    }
                    Err(DaemonError::ChannelClosed(channel)) => {
                        tracing::debug!(channel, "tick processor gone, stopping scheduler");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled tick could not be queued");
                    }
                }
            }
        }
    }

    Ok(())
}

impl TickSummary {
    pub fn from_report(report: TickReport, trigger: TickTrigger) -> Self {
        let mirrored = report.mirrored();
        let failed = report.failed();
        let up_to_date = report.count(|o| matches!(o, ProjectOutcome::UpToDate { .. }));

        let projects = report
            .results
            .into_iter()
            .map(|result| ProjectSummary {
                project: result.project,
                committed_at: result.committed_at,
                outcome: result.outcome,
            })
            .collect();

        Self {
            tick_time: report.tick_time,
            trigger,
            projects,
            mirrored,
            up_to_date,
            failed,
            duration_ms: report.duration.as_millis(),
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global tracing subscriber on stderr. `RUST_LOG` overrides the
/// `info` default. Safe to call more than once.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
