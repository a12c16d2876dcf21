// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tendd - the tend supervisor daemon.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tend_core::SystemClock;
use tend_daemon::listener::Listener;
use tend_daemon::{conf::SourceKind, crash, Config, PerfLog, Supervisor, SystemSpawner};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tendd", version, about = "Event-driven process supervisor")]
struct Args {
    /// Top-level configuration file
    #[arg(long, value_name = "FILE")]
    conf: Option<PathBuf>,

    /// Job-definition directory (scanned recursively)
    #[arg(long, value_name = "DIR")]
    jobs: Option<PathBuf>,

    /// Control socket path
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Append boot performance data to this file
    #[arg(long = "perf-log", value_name = "FILE")]
    perf_log: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::default();
        if let Some(conf) = self.conf {
            config.conf_file = conf;
        }
        if let Some(jobs) = self.jobs {
            config.job_dir = jobs;
        }
        if let Some(socket) = self.socket {
            config.socket_path = socket;
        }
        config.perf_log = self.perf_log;
        config
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config();

    crash::install();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "unable to build runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> std::io::Result<()> {
    let perf = match &config.perf_log {
        Some(path) => PerfLog::new(path.clone(), &config.uptime_path, &config.diskstats_path),
        None => PerfLog::disabled(),
    };

    let mut supervisor = Supervisor::new(SystemSpawner::new(), SystemClock, perf);
    supervisor.add_source(&config.conf_file, SourceKind::File);
    supervisor.add_source(&config.job_dir, SourceKind::JobDir);

    // Control is not critical: the supervisor runs on without it.
    match Listener::bind(&config.socket_path, supervisor.control_handle()) {
        Ok(listener) => {
            info!(socket = %config.socket_path.display(), "listening for control connections");
            tokio::spawn(listener.run());
        }
        Err(err) => {
            warn!(%err, socket = %config.socket_path.display(),
                "unable to listen for control connections");
        }
    }

    supervisor.run().await
}
