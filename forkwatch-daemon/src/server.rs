//! HTTP control endpoint.
//!
//! | Method | Path                     | Effect                                      |
//! |--------|--------------------------|---------------------------------------------|
//! | GET    | `/watcher/reload-config` | reload the project list (`?repoList=` opt.) |
//! | POST   | `/watcher/sync`          | run a tick now, answer with its summary     |
//! | GET    | `/watcher/status`        | locator, projects, last tick summary        |
//!
//! Every body is a [`DaemonResponse`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use forkwatch_core::ProjectRegistry;

use crate::protocol::DaemonResponse;
use crate::runtime::{TickHandle, TickTrigger};

pub const RELOAD_PATH: &str = "/watcher/reload-config";
pub const SYNC_PATH: &str = "/watcher/sync";
pub const STATUS_PATH: &str = "/watcher/status";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProjectRegistry>,
    pub ticks: TickHandle,
    pub started_at: DateTime<Utc>,
    pub interval: Duration,
}

#[derive(Debug, Deserialize)]
pub struct ReloadParams {
    #[serde(rename = "repoList")]
    pub repo_list: Option<String>,
}

type Reply = (StatusCode, Json<DaemonResponse>);

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(RELOAD_PATH, get(reload_config))
        .route(SYNC_PATH, post(sync_now))
        .route(STATUS_PATH, get(status))
        .with_state(state)
}

async fn reload_config(State(state): State<AppState>, Query(params): Query<ReloadParams>) -> Reply {
    let registry = state.registry.clone();
    let requested = params.repo_list.clone();
    let reloaded =
        tokio::task::spawn_blocking(move || registry.reload(requested.as_deref())).await;

    match reloaded {
        Ok(Ok(projects)) => {
            let source = state.registry.locator().to_string();
            (
                StatusCode::OK,
                Json(DaemonResponse::ok(json!({
                    "message": "Config reloaded",
                    "source": source,
                    "projects": projects.len(),
                }))),
            )
        }
        Ok(Err(err)) => {
            tracing::warn!(
                requested = params.repo_list.as_deref().unwrap_or("<last used>"),
                error = %err,
                "config couldn't be reloaded, keeping previous project list"
            );
            internal_error(format!("Config couldn't be reloaded: {err}"))
        }
        Err(err) => internal_error(format!("reload task join error: {err}")),
    }
}

async fn sync_now(State(state): State<AppState>) -> Reply {
    match state.ticks.run_now(TickTrigger::Manual).await {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(data) => (StatusCode::OK, Json(DaemonResponse::ok(data))),
            Err(err) => internal_error(format!("cannot encode tick summary: {err}")),
        },
        Err(err) => {
            tracing::error!(error = %err, "manual tick failed");
            internal_error(err.to_string())
        }
    }
}

async fn status(State(state): State<AppState>) -> Reply {
    let projects = state.registry.snapshot();
    let names: Vec<String> = projects.iter().map(ToString::to_string).collect();

    (
        StatusCode::OK,
        Json(DaemonResponse::ok(json!({
            "running": true,
            "started_at": state.started_at,
            "interval_secs": state.interval.as_secs(),
            "source": state.registry.locator().to_string(),
            "project_count": projects.len(),
            "projects": names,
            "last_tick": state.ticks.last().await,
        }))),
    )
}

fn internal_error(message: String) -> Reply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(DaemonResponse::error(message)),
    )
}
