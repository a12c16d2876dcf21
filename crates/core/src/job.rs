// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job instance state machine.
//!
//! Every job is a `(goal, state)` pair: the goal is what the outside
//! world wants, the state is what is physically true. [`next_state`]
//! maps the pair to the state the job should move to next; the engine
//! applies it repeatedly until the job rests.

use crate::class::JobClass;
use crate::timer::TimerId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// The desired outcome for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Stop,
    Start,
}

crate::simple_display! {
    Goal {
        Stop => "stop",
        Start => "start",
    }
}

/// The current observable phase of a job's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Starting,
    Running,
    Stopping,
    Respawning,
}

crate::simple_display! {
    JobState {
        Waiting => "waiting",
        Starting => "starting",
        Running => "running",
        Stopping => "stopping",
        Respawning => "respawning",
    }
}

/// What is known about the job's child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// No process.
    None,
    /// Forked but awaiting daemon detection.
    Spawned,
    /// Alive and accounted for.
    Active,
    /// Termination signal sent, awaiting death.
    Killed,
}

crate::simple_display! {
    ProcessState {
        None => "none",
        Spawned => "spawned",
        Active => "active",
        Killed => "killed",
    }
}

/// The state a job should move to next, given its goal.
///
/// `Waiting` is a fixed point here: leaving it happens on a goal flip,
/// not through this function. The caller sets the goal before asking.
pub fn next_state(goal: Goal, state: JobState) -> JobState {
    match state {
        JobState::Waiting => JobState::Waiting,
        JobState::Starting => match goal {
            Goal::Stop => JobState::Stopping,
            Goal::Start => JobState::Running,
        },
        JobState::Running => match goal {
            Goal::Stop => JobState::Stopping,
            Goal::Start => JobState::Respawning,
        },
        JobState::Stopping => match goal {
            Goal::Stop => JobState::Waiting,
            Goal::Start => JobState::Starting,
        },
        JobState::Respawning => match goal {
            Goal::Stop => JobState::Stopping,
            Goal::Start => JobState::Running,
        },
    }
}

/// The runtime state of one invocation of a [`JobClass`].
#[derive(Debug)]
pub struct Job {
    /// The class this instance runs. Kept alive here even after the
    /// class is deleted, so a replaced definition survives as a
    /// tombstone until this instance rests.
    pub class: Arc<JobClass>,
    pub goal: Goal,
    pub state: JobState,
    pub process_state: ProcessState,
    /// Child pid; `None` exactly when `process_state` is `None`.
    pub pid: Option<i32>,
    pub kill_timer: Option<TimerId>,
    pub pid_timer: Option<TimerId>,
    respawn_count: u32,
    respawn_window: Option<Instant>,
}

impl Job {
    pub fn new(class: Arc<JobClass>) -> Self {
        Self {
            class,
            goal: Goal::Stop,
            state: JobState::Waiting,
            process_state: ProcessState::None,
            pid: None,
            kill_timer: None,
            pid_timer: None,
            respawn_count: 0,
            respawn_window: None,
        }
    }

    /// Whether the job needs no further transitions without new input.
    pub fn is_resting(&self) -> bool {
        matches!(
            (self.goal, self.state),
            (Goal::Stop, JobState::Waiting) | (Goal::Start, JobState::Running)
        )
    }

    /// Whether anything is still live: a process or a pending timer.
    pub fn is_active(&self) -> bool {
        self.process_state != ProcessState::None
            || self.kill_timer.is_some()
            || self.pid_timer.is_some()
    }

    /// Account for one respawn at `now`.
    ///
    /// Returns `false` when the respawn limit has been exceeded within
    /// the policy window, in which case the caller should fail the job
    /// instead of restarting it. The window resets once `interval` has
    /// elapsed since its first respawn.
    pub fn note_respawn(&mut self, now: Instant) -> bool {
        let policy = &self.class.respawn;
        match self.respawn_window {
            Some(start) if now.duration_since(start) < policy.interval => {
                self.respawn_count += 1;
            }
            _ => {
                self.respawn_window = Some(now);
                self.respawn_count = 1;
            }
        }
        self.respawn_count <= policy.limit
    }

    /// Clear respawn-window accounting, e.g. when the job rests.
    pub fn reset_respawn_window(&mut self) {
        self.respawn_count = 0;
        self.respawn_window = None;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
