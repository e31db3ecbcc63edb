// Network Diagnostics
// A single ICMP ping against the database host, to tell network problems from listener problems

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::db::connection::port_from_value;

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// The port is only echoed back, so anything unreadable becomes null
fn optional_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(port_from_value))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseRequest {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, deserialize_with = "optional_port")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseReport {
    pub hostname: String,
    pub port: Option<u16>,
    pub ping_success: bool,
    pub ping_result: String,
    pub suggestions: Vec<String>,
}

impl DiagnoseReport {
    fn new(
        request: &DiagnoseRequest,
        ping_success: bool,
        ping_result: String,
        suggestion: &str,
    ) -> Self {
        Self {
            hostname: request.hostname.clone(),
            port: request.port,
            ping_success,
            ping_result,
            suggestions: vec![suggestion.to_string()],
        }
    }
}

/// Platform ping invocation for one echo request
fn ping_args(hostname: &str) -> Vec<String> {
    let count_flag = if cfg!(windows) { "-n" } else { "-c" };
    vec![count_flag.to_string(), "1".to_string(), hostname.to_string()]
}

/// Anything that could be read as an option by ping is refused
fn is_acceptable_host(hostname: &str) -> bool {
    !hostname.is_empty()
        && !hostname.starts_with('-')
        && !hostname.chars().any(char::is_whitespace)
}

/// Runs the OS `ping` once against the requested host
pub struct Diagnostics {
    program: String,
    timeout: Duration,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
            timeout: PING_TIMEOUT,
        }
    }

    /// Use another executable and timeout, e.g. in tests
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub async fn diagnose(&self, request: &DiagnoseRequest) -> DiagnoseReport {
        let hostname = request.hostname.trim();
        if !is_acceptable_host(hostname) {
            return DiagnoseReport::new(
                request,
                false,
                "Invalid hostname".to_string(),
                "Provide a valid hostname or IP address",
            );
        }

        self.run(request, &ping_args(hostname)).await
    }

    async fn run(&self, request: &DiagnoseRequest, args: &[String]) -> DiagnoseReport {
        info!(program = %self.program, ?args, "Running connectivity check");

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", self.program, e);
                return DiagnoseReport::new(request, false, e.to_string(), "Failed to run ping");
            }
        };

        // Dropping the output future on timeout kills the child
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let success = output.status.success();
                let text = String::from_utf8_lossy(&output.stdout).into_owned();
                let suggestion = if success {
                    "Host reachable - the problem may be the port or the Oracle configuration"
                } else {
                    "Host unreachable - check the hostname/IP and network connectivity"
                };
                DiagnoseReport::new(request, success, text, suggestion)
            }
            Ok(Err(e)) => DiagnoseReport::new(request, false, e.to_string(), "Failed to run ping"),
            Err(_) => {
                warn!(hostname = %request.hostname, "Ping timed out");
                DiagnoseReport::new(
                    request,
                    false,
                    "Timeout".to_string(),
                    "Ping timed out - check network connectivity",
                )
            }
        }
    }
}
