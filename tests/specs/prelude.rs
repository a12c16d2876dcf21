//! Shared fixture for the scenario specs.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tend_core::FakeClock;
use tend_daemon::reap::ChildExit;
use tend_daemon::watch::{WatchEvent, WatchKind};
use tend_daemon::{FakeSpawner, PerfLog, SourceKind, Supervisor};

/// A supervisor over a temporary job directory, with fake process and
/// clock adapters, plus helpers to mimic what the watcher and reaper
/// would feed in.
pub struct World {
    pub dir: TempDir,
    pub supervisor: Supervisor<FakeSpawner, FakeClock>,
    pub spawner: FakeSpawner,
    pub clock: FakeClock,
}

impl World {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let spawner = FakeSpawner::new();
        let clock = FakeClock::new();
        let mut supervisor = Supervisor::new(spawner.clone(), clock.clone(), PerfLog::disabled());
        supervisor.add_source(dir.path(), SourceKind::JobDir);
        Self { dir, supervisor, spawner, clock }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a job file without delivering a watch event (pre-reload
    /// filesystem setup).
    pub fn seed(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, content).expect("write job file");
        path
    }

    /// Write a file and deliver the corresponding watch notification.
    pub fn write(&mut self, name: &str, content: &str) {
        let existed = self.path(name).exists();
        let path = self.seed(name, content);
        let kind = if existed { WatchKind::Modify } else { WatchKind::Create };
        self.supervisor.handle_watch_event(WatchEvent { source: 0, kind, path });
    }

    /// Remove a file and deliver the corresponding watch notification.
    pub fn remove(&mut self, name: &str) {
        let path = self.path(name);
        fs::remove_file(&path).expect("remove job file");
        self.supervisor
            .handle_watch_event(WatchEvent { source: 0, kind: WatchKind::Delete, path });
    }

    /// Reap the most recently spawned process with the given status.
    pub fn reap_last(&mut self, status: i32) {
        let pid = self.spawner.last_pid().expect("a process was spawned");
        self.supervisor.engine_mut().handle_child(ChildExit::exited(pid, status));
    }

    pub fn fire_timers(&mut self) {
        self.supervisor.fire_timers();
    }
}
