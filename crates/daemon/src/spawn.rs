// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawning and signal delivery.
//!
//! The engine talks to processes through the [`ProcessAdapter`] trait;
//! [`SystemSpawner`] is the real implementation, [`FakeSpawner`] the
//! test double.

use std::path::Path;
use std::process::{Command, Stdio};
use tend_core::{ConsoleMode, ExecSettings, ProcessAction, ProcessKind, ResourceKind};
use thiserror::Error;

/// Shell used for scripts and for commands with metacharacters.
pub const SHELL: &str = "/bin/sh";

/// Console device handed to processes that want one.
pub const CONSOLE: &str = "/dev/console";

/// Everything the spawner needs to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub job: String,
    pub kind: ProcessKind,
    pub action: ProcessAction,
    pub exec: ExecSettings,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("spawn failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Whether retrying the spawn may succeed (EAGAIN-class failures).
    pub fn is_transient(&self) -> bool {
        let SpawnError::Io(err) = self;
        matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::OutOfMemory
        ) || err.raw_os_error() == Some(libc::EAGAIN)
    }
}

#[derive(Debug, Error)]
pub enum KillError {
    #[error("no such process")]
    NoSuchProcess,
    #[error("kill failed: {0}")]
    Os(nix::errno::Errno),
}

/// Spawns children and delivers signals by pid.
pub trait ProcessAdapter {
    fn spawn(&self, req: &SpawnRequest) -> Result<i32, SpawnError>;

    /// Send SIGTERM (or SIGKILL when `force`) to `pid`.
    fn kill(&self, pid: i32, force: bool) -> Result<(), KillError>;
}

/// Build the argv for a process action.
///
/// Commands containing shell metacharacters are handed to the shell
/// with `exec` prepended so the shell replaces itself; simple commands
/// are split on whitespace. Scripts always run under `sh -e -c` so
/// unchecked command failures abort the script.
pub fn build_argv(action: &ProcessAction) -> Vec<String> {
    match action {
        ProcessAction::Command(cmd) => {
            if cmd.contains(|c| "~`!$^&*()=|\\{}[];\"'<>?".contains(c)) {
                vec![SHELL.to_string(), "-c".to_string(), format!("exec {cmd}")]
            } else {
                cmd.split_whitespace().map(str::to_string).collect()
            }
        }
        ProcessAction::Script(script) => vec![
            SHELL.to_string(),
            "-e".to_string(),
            "-c".to_string(),
            script.clone(),
        ],
    }
}

/// The real spawner.
#[derive(Debug, Clone, Default)]
pub struct SystemSpawner;

impl SystemSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessAdapter for SystemSpawner {
    fn spawn(&self, req: &SpawnRequest) -> Result<i32, SpawnError> {
        let argv = build_argv(&req.action);
        if argv.is_empty() {
            return Err(SpawnError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            )));
        }

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        if let Some(dir) = &req.exec.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &req.exec.env {
            command.env(key, value);
        }
        apply_console(&mut command, req.exec.console);

        let settings = req.exec.clone();
        // Child-side setup between fork and exec. Only async-signal-safe
        // calls are permitted here; failures are not reportable and the
        // limits are applied best-effort.
        #[allow(unsafe_code)]
        unsafe {
            use std::os::unix::process::CommandExt;
            command.pre_exec(move || {
                unsafe {
                    libc::setsid();
                    libc::umask(settings.umask as libc::mode_t);
                    if let Some(nice) = settings.nice {
                        libc::nice(nice as libc::c_int);
                    }
                    for limit in &settings.limits {
                        let rlim = libc::rlimit {
                            rlim_cur: limit.soft.unwrap_or(libc::RLIM_INFINITY),
                            rlim_max: limit.hard.unwrap_or(libc::RLIM_INFINITY),
                        };
                        libc::setrlimit(resource_raw(limit.resource), &rlim);
                    }
                }
                Ok(())
            });
        }

        let child = command.spawn()?;
        Ok(child.id() as i32)
    }

    fn kill(&self, pid: i32, force: bool) -> Result<(), KillError> {
        use nix::sys::signal::{kill, Signal};
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        match kill(nix::unistd::Pid::from_raw(pid), signal) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Err(KillError::NoSuchProcess),
            Err(errno) => Err(KillError::Os(errno)),
        }
    }
}

fn apply_console(command: &mut Command, mode: ConsoleMode) {
    use std::fs::OpenOptions;
    match mode {
        ConsoleMode::None => {
            command.stdin(Stdio::null());
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
        ConsoleMode::Output | ConsoleMode::Owner => {
            // Fall back to /dev/null when the console cannot be opened.
            match OpenOptions::new().read(true).write(true).open(Path::new(CONSOLE)) {
                Ok(console) => {
                    if let (Ok(out), Ok(err)) = (console.try_clone(), console.try_clone()) {
                        command.stdin(Stdio::from(console));
                        command.stdout(Stdio::from(out));
                        command.stderr(Stdio::from(err));
                    }
                }
                Err(_) => {
                    command.stdin(Stdio::null());
                    command.stdout(Stdio::null());
                    command.stderr(Stdio::null());
                }
            }
        }
    }
}

fn resource_raw(kind: ResourceKind) -> libc::__rlimit_resource_t {
    match kind {
        ResourceKind::As => libc::RLIMIT_AS,
        ResourceKind::Core => libc::RLIMIT_CORE,
        ResourceKind::Cpu => libc::RLIMIT_CPU,
        ResourceKind::Data => libc::RLIMIT_DATA,
        ResourceKind::Fsize => libc::RLIMIT_FSIZE,
        ResourceKind::Memlock => libc::RLIMIT_MEMLOCK,
        ResourceKind::Nofile => libc::RLIMIT_NOFILE,
        ResourceKind::Nproc => libc::RLIMIT_NPROC,
        ResourceKind::Rss => libc::RLIMIT_RSS,
        ResourceKind::Stack => libc::RLIMIT_STACK,
    }
}

/// Recorded fake for engine and scenario tests.
///
/// Assigns sequential pids, records every spawn and kill, and lets the
/// test choose failure behavior.
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSpawner;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{KillError, ProcessAdapter, SpawnError, SpawnRequest};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeState {
        next_pid: i32,
        spawns: Vec<(i32, SpawnRequest)>,
        kills: Vec<(i32, bool)>,
        kill_error: Option<KillError>,
    }

    #[derive(Clone, Default)]
    pub struct FakeSpawner {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeSpawner {
        pub fn new() -> Self {
            let spawner = Self::default();
            spawner.state.lock().next_pid = 100;
            spawner
        }

        /// All spawns so far as `(pid, request)` pairs.
        pub fn spawns(&self) -> Vec<(i32, SpawnRequest)> {
            self.state.lock().spawns.clone()
        }

        pub fn last_pid(&self) -> Option<i32> {
            self.state.lock().spawns.last().map(|(pid, _)| *pid)
        }

        /// All kills so far as `(pid, force)` pairs.
        pub fn kills(&self) -> Vec<(i32, bool)> {
            self.state.lock().kills.clone()
        }

        /// Make the next `kill` call fail once with the given error.
        pub fn fail_next_kill(&self, error: KillError) {
            self.state.lock().kill_error = Some(error);
        }
    }

    impl ProcessAdapter for FakeSpawner {
        fn spawn(&self, req: &SpawnRequest) -> Result<i32, SpawnError> {
            let mut state = self.state.lock();
            state.next_pid += 1;
            let pid = state.next_pid;
            state.spawns.push((pid, req.clone()));
            Ok(pid)
        }

        fn kill(&self, pid: i32, force: bool) -> Result<(), KillError> {
            let mut state = self.state.lock();
            state.kills.push((pid, force));
            match state.kill_error.take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
