//! forkwatch daemon runtime: interval scheduler + tick processor + HTTP control server.

mod error;
pub mod protocol;
mod runtime;
pub mod server;
#[cfg(test)]
mod testing;

pub use error::DaemonError;
pub use protocol::{request_reload, request_status, request_sync, send_request, DaemonResponse};
pub use runtime::{
    init_tracing, run, serve, spawn_tick_processor, start_blocking, DaemonConfig, ProjectSummary,
    TickEngine, TickHandle, TickSummary, TickTrigger, DEFAULT_BIND, DEFAULT_INTERVAL,
};
pub use server::{build_router, AppState};
