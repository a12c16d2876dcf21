// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job class: the static description of a job.
//!
//! A `JobClass` is parsed from a definition file by `tend-jobdef` and
//! installed by the configuration manager. Running instances keep an
//! `Arc` to their class; when a class is replaced while an instance is
//! live the old class is flagged `deleted` and survives as a tombstone
//! until the instance rests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a daemon main process gets to settle before detection runs.
pub const DEFAULT_PID_TIMEOUT: Duration = Duration::from_secs(10);

/// File-mode creation mask applied to spawned processes.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Respawns allowed within [`DEFAULT_RESPAWN_INTERVAL`] before the job is failed.
pub const DEFAULT_RESPAWN_LIMIT: u32 = 10;

/// Window over which respawns are counted.
pub const DEFAULT_RESPAWN_INTERVAL: Duration = Duration::from_secs(5);

/// Which lifecycle state a process descriptor runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    /// Runs on entry to `starting`.
    PreStart,
    /// The job's main process; runs on entry to `running`.
    Main,
    /// Runs on entry to `stopping`.
    PostStop,
    /// Runs on entry to `respawning`.
    Respawn,
}

crate::simple_display! {
    ProcessKind {
        PreStart => "pre-start",
        Main => "main",
        PostStop => "post-stop",
        Respawn => "respawn",
    }
}

/// What a process descriptor executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessAction {
    /// A single command line, split on whitespace (or handed to the
    /// shell when it contains metacharacters).
    Command(String),
    /// Verbatim shell script, run under `sh -e -c`.
    Script(String),
}

/// Console wiring for spawned processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleMode {
    /// stdin/stdout/stderr on /dev/null.
    #[default]
    None,
    /// Output to the console device.
    Output,
    /// Console device plus controlling terminal.
    Owner,
}

crate::simple_display! {
    ConsoleMode {
        None => "none",
        Output => "output",
        Owner => "owner",
    }
}

/// A resource limit the spawner applies to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Memlock,
    Nofile,
    Nproc,
    Rss,
    Stack,
}

crate::simple_display! {
    ResourceKind {
        As => "as",
        Core => "core",
        Cpu => "cpu",
        Data => "data",
        Fsize => "fsize",
        Memlock => "memlock",
        Nofile => "nofile",
        Nproc => "nproc",
        Rss => "rss",
        Stack => "stack",
    }
}

/// Soft/hard limit pair; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimit {
    pub resource: ResourceKind,
    pub soft: Option<u64>,
    pub hard: Option<u64>,
}

/// Failure behavior for the main process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnPolicy {
    /// Restart the main process when it dies abnormally.
    pub respawn: bool,
    /// Exit statuses that mean the job is done rather than failed.
    pub normal_exit: BTreeSet<i32>,
    /// Respawns allowed within `interval` before the job is failed.
    pub limit: u32,
    pub interval: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            respawn: false,
            normal_exit: BTreeSet::new(),
            limit: DEFAULT_RESPAWN_LIMIT,
            interval: DEFAULT_RESPAWN_INTERVAL,
        }
    }
}

/// Execution environment shared by all of a class's process descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSettings {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub console: ConsoleMode,
    pub umask: u32,
    pub nice: Option<i8>,
    pub limits: Vec<ResourceLimit>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            working_dir: None,
            env: Vec::new(),
            console: ConsoleMode::default(),
            umask: DEFAULT_UMASK,
            nice: None,
            limits: Vec::new(),
        }
    }
}

/// The static description of a job.
#[derive(Debug)]
pub struct JobClass {
    /// Unique name: the definition path relative to its source root,
    /// minus extension, separators preserved.
    pub name: String,
    /// Path of the definition file this class was parsed from.
    pub path: PathBuf,
    pub description: Option<String>,
    /// Event names whose emission flips the goal to start.
    pub start_on: Vec<String>,
    /// Event names whose emission flips the goal to stop.
    pub stop_on: Vec<String>,
    /// Event names this job declares it emits.
    pub emits: Vec<String>,
    pre_start: Option<ProcessAction>,
    main: Option<ProcessAction>,
    post_stop: Option<ProcessAction>,
    respawn_action: Option<ProcessAction>,
    pub exec: ExecSettings,
    pub kill_timeout: Duration,
    pub respawn: RespawnPolicy,
    /// Main process forks and the parent exits.
    pub daemon: bool,
    /// Consulted at daemon detection to learn the surviving pid.
    pub pidfile: Option<PathBuf>,
    pub pid_timeout: Duration,
    /// Set when the class has been superseded or its file removed; a
    /// deleted class must not start new instances.
    deleted: AtomicBool,
}

impl JobClass {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: None,
            start_on: Vec::new(),
            stop_on: Vec::new(),
            emits: Vec::new(),
            pre_start: None,
            main: None,
            post_stop: None,
            respawn_action: None,
            exec: ExecSettings::default(),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            respawn: RespawnPolicy::default(),
            daemon: false,
            pidfile: None,
            pid_timeout: DEFAULT_PID_TIMEOUT,
            deleted: AtomicBool::new(false),
        }
    }

    /// The descriptor hosted by the given state, if any.
    pub fn process(&self, kind: ProcessKind) -> Option<&ProcessAction> {
        match kind {
            ProcessKind::PreStart => self.pre_start.as_ref(),
            ProcessKind::Main => self.main.as_ref(),
            ProcessKind::PostStop => self.post_stop.as_ref(),
            ProcessKind::Respawn => self.respawn_action.as_ref(),
        }
    }

    pub fn set_process(&mut self, kind: ProcessKind, action: Option<ProcessAction>) {
        match kind {
            ProcessKind::PreStart => self.pre_start = action,
            ProcessKind::Main => self.main = action,
            ProcessKind::PostStop => self.post_stop = action,
            ProcessKind::Respawn => self.respawn_action = action,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Flag this class for replacement; no new instance may start from it.
    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Relaxed);
    }
}

// Definition equality ignores the `deleted` tombstone flag, which is
// runtime bookkeeping rather than part of the parsed definition.
impl PartialEq for JobClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.description == other.description
            && self.start_on == other.start_on
            && self.stop_on == other.stop_on
            && self.emits == other.emits
            && self.pre_start == other.pre_start
            && self.main == other.main
            && self.post_stop == other.post_stop
            && self.respawn_action == other.respawn_action
            && self.exec == other.exec
            && self.kill_timeout == other.kill_timeout
            && self.respawn == other.respawn
            && self.daemon == other.daemon
            && self.pidfile == other.pidfile
            && self.pid_timeout == other.pid_timeout
    }
}

impl Eq for JobClass {}

#[cfg(test)]
#[path = "class_tests.rs"]
mod tests;
