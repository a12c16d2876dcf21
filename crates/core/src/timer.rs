// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identifier type for tracking scheduled timers.
//!
//! A `TimerId` encodes what the timer is for so the engine can route a
//! firing back to the right job without a side table.

use serde::{Deserialize, Serialize};

/// Unique identifier for a single-shot timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(String);

impl TimerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Kill-escalation timer for a job.
    pub fn kill(job: &str) -> Self {
        Self(format!("kill:{job}"))
    }

    /// Daemon-detection timer for a job.
    pub fn pid(job: &str) -> Self {
        Self(format!("pid:{job}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse this timer ID into a typed `TimerKind`.
    pub fn kind(&self) -> Option<TimerKind<'_>> {
        TimerKind::parse(&self.0)
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed representation of a timer ID for type-safe routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind<'a> {
    /// Kill timeout expired; escalate to SIGKILL.
    Kill(&'a str),
    /// Daemon-detection window expired.
    Pid(&'a str),
}

impl<'a> TimerKind<'a> {
    /// Parse a timer ID string into a typed `TimerKind`.
    ///
    /// Returns `None` for unrecognized timer ID formats.
    pub fn parse(id: &'a str) -> Option<TimerKind<'a>> {
        if let Some(job) = id.strip_prefix("kill:") {
            return Some(TimerKind::Kill(job));
        }
        if let Some(job) = id.strip_prefix("pid:") {
            return Some(TimerKind::Pid(job));
        }
        None
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
