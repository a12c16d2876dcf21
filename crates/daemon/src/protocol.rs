// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the control client and the daemon.
//!
//! Newline-delimited JSON over the daemon's Unix socket; one request,
//! one response per line.

use serde::{Deserialize, Serialize};
use tend_core::{Goal, JobState};
use thiserror::Error;

/// Daemon protocol version, negotiated via `Ping`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Health check ping.
    Ping,
    /// Enumerate known jobs with current goal/state/pid.
    List,
    /// Flip a job's goal to start.
    Start { name: String },
    /// Flip a job's goal to stop.
    Stop { name: String },
    /// Query one job.
    Status { name: String },
    /// Enqueue an event.
    Emit {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<(String, String)>,
    },
    /// Reload configuration sources (same path as SIGHUP).
    Reload,
}

/// Response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong { version: String },
    Ok,
    Jobs { jobs: Vec<JobSummary> },
    Job { job: JobSummary },
    Error { message: String },
}

/// Summary of a job for listing and status queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
    pub goal: Goal,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("daemon went away")]
    Disconnected,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
