use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DaemonError;
use crate::server::{RELOAD_PATH, STATUS_PATH, SYNC_PATH};

/// Connect timeout for control requests. A manual sync can run for as long
/// as the tick takes, so there is no read timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON body of every control endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Send one request to the control endpoint at `base_url` and decode the
/// [`DaemonResponse`], including the body of 5xx answers.
pub fn send_request(
    base_url: &str,
    method: &str,
    path: &str,
    query: &[(&str, &str)],
) -> Result<DaemonResponse, DaemonError> {
    let url = format!("{}{path}", base_url.trim_end_matches('/'));
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .build();

    let mut request = agent.request(method, &url);
    for (key, value) in query {
        request = request.query(key, value);
    }

    let response = match request.call() {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            return response.into_json::<DaemonResponse>().map_err(|_| DaemonError::Http {
                url: url.clone(),
                message: format!("HTTP {status}"),
            });
        }
        Err(ureq::Error::Transport(transport)) => {
            return Err(match transport.kind() {
                ureq::ErrorKind::ConnectionFailed => DaemonError::DaemonNotRunning { url },
                _ => DaemonError::Http {
                    url,
                    message: transport.to_string(),
                },
            });
        }
    };

    response.into_json::<DaemonResponse>().map_err(|err| {
        DaemonError::Protocol(format!("invalid response from {url}: {err}"))
    })
}

pub fn request_status(base_url: &str) -> Result<Value, DaemonError> {
    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(base_url, "GET", STATUS_PATH, &[]) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

/// Ask the daemon to reload its project list, from `repo_list` if given or
/// from the last-used source otherwise.
pub fn request_reload(base_url: &str, repo_list: Option<&str>) -> Result<Value, DaemonError> {
    let query: Vec<(&str, &str)> = repo_list.map(|v| ("repoList", v)).into_iter().collect();
    let response = send_request(base_url, "GET", RELOAD_PATH, &query)?;
    response_into_data(response)
}

pub fn request_sync(base_url: &str) -> Result<Value, DaemonError> {
    let response = send_request(base_url, "POST", SYNC_PATH, &[])?;
    response_into_data(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}
