// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child reaping.
//!
//! Runs once per main-loop iteration in response to SIGCHLD and
//! surfaces every exited child as a [`ChildExit`]. The engine ignores
//! pids it does not know about.

use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// One reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub pid: i32,
    /// True when the child was killed by a signal; `status` is then the
    /// signal number rather than an exit status.
    pub killed: bool,
    pub status: i32,
}

impl ChildExit {
    pub fn exited(pid: i32, status: i32) -> Self {
        Self { pid, killed: false, status }
    }

    pub fn signaled(pid: i32, signal: i32) -> Self {
        Self { pid, killed: true, status: signal }
    }
}

/// Reap every exited child without blocking.
pub fn reap_exited() -> Vec<ChildExit> {
    let mut exits = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, status)) => {
                exits.push(ChildExit::exited(pid.as_raw(), status));
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                exits.push(ChildExit::signaled(pid.as_raw(), signal as i32));
            }
            Ok(WaitStatus::StillAlive) => break,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
    exits
}
