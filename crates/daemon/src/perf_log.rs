// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot performance log.
//!
//! One line per job state change: `<uptime_busy> <sectors_read>
//! statechange <name> <state>`. The stats fields are snapshots of
//! /proc/uptime and /proc/diskstats taken when the entry is queued,
//! with `-` substituted when a stats file is missing or malformed.
//! Entries are formatted at flush time and survive transient write
//! failures in the queue.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use tend_core::JobState;

/// A queued log entry with its stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PerfEntry {
    uptime_busy: String,
    sectors_read: String,
    message: String,
}

pub struct PerfLog {
    log_path: Option<PathBuf>,
    uptime_path: PathBuf,
    diskstats_path: PathBuf,
    queue: VecDeque<PerfEntry>,
}

impl PerfLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            log_path: None,
            uptime_path: PathBuf::from("/proc/uptime"),
            diskstats_path: PathBuf::from("/proc/diskstats"),
            queue: VecDeque::new(),
        }
    }

    pub fn new(
        log_path: impl Into<PathBuf>,
        uptime_path: impl Into<PathBuf>,
        diskstats_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            log_path: Some(log_path.into()),
            uptime_path: uptime_path.into(),
            diskstats_path: diskstats_path.into(),
            queue: VecDeque::new(),
        }
    }

    /// Record a job state change.
    pub fn log_state_change(&mut self, job: &str, state: JobState) {
        self.message(format!("statechange {job} {state}"));
    }

    /// Queue a message with a stats snapshot taken now, then try to
    /// write everything out.
    pub fn message(&mut self, message: String) {
        if self.log_path.is_none() {
            return;
        }
        let entry = PerfEntry {
            uptime_busy: field_of(&self.uptime_path, 0),
            sectors_read: field_of(&self.diskstats_path, 2),
            message,
        };
        self.queue.push_back(entry);
        self.flush();
    }

    /// Attempt to write queued entries; entries that cannot be written
    /// stay queued for the next attempt.
    pub fn flush(&mut self) {
        let Some(path) = &self.log_path else { return };
        let Ok(mut file) =
            std::fs::OpenOptions::new().create(true).append(true).open(path)
        else {
            return;
        };
        while let Some(entry) = self.queue.front() {
            let line =
                format!("{} {} {}\n", entry.uptime_busy, entry.sectors_read, entry.message);
            if file.write_all(line.as_bytes()).is_err() {
                break;
            }
            self.queue.pop_front();
        }
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// Read a whitespace-delimited field from a stats file, `-` when the
/// file is missing or has too few fields.
fn field_of(path: &Path, index: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return "-".to_string();
    };
    content.split_whitespace().nth(index).map_or_else(|| "-".to_string(), str::to_string)
}

#[cfg(test)]
#[path = "perf_log_tests.rs"]
mod tests;
