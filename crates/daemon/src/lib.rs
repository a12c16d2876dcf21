// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tend-daemon: the supervisor.
//!
//! The daemon watches configuration sources for job definitions, keeps
//! a registry of job classes, and drives each job instance through its
//! lifecycle from a single-threaded main loop. The `tendd` binary wires
//! this library to the real system; tests and the workspace spec suite
//! drive it with fake adapters instead.

pub mod conf;
pub mod config;
pub mod crash;
pub mod engine;
pub mod listener;
pub mod perf_log;
pub mod protocol;
pub mod reap;
pub mod spawn;
pub mod supervisor;
pub mod watch;

pub use conf::{ClassLifecycle, ConfManager, SourceKind};
pub use config::Config;
pub use engine::Engine;
pub use perf_log::PerfLog;
pub use protocol::{JobSummary, Request, Response};
#[cfg(any(test, feature = "test-support"))]
pub use spawn::FakeSpawner;
pub use spawn::{ProcessAdapter, SpawnRequest, SystemSpawner};
pub use supervisor::Supervisor;
