//! Source priority scenarios.

use super::prelude::World;
use std::fs;
use tempfile::TempDir;
use tend_core::FakeClock;
use tend_daemon::{FakeSpawner, PerfLog, SourceKind, Supervisor};

fn two_source_world() -> (TempDir, TempDir, Supervisor<FakeSpawner, FakeClock>) {
    let high = TempDir::new().expect("tempdir");
    let low = TempDir::new().expect("tempdir");
    let mut supervisor =
        Supervisor::new(FakeSpawner::new(), FakeClock::new(), PerfLog::disabled());
    supervisor.add_source(high.path(), SourceKind::JobDir);
    supervisor.add_source(low.path(), SourceKind::JobDir);
    (high, low, supervisor)
}

#[test]
fn higher_priority_source_shadows_lower() {
    let (high, low, mut supervisor) = two_source_world();
    fs::write(high.path().join("svc.conf"), "exec = \"/bin/a\"\n").expect("write");
    fs::write(low.path().join("svc.conf"), "exec = \"/bin/b\"\n").expect("write");

    supervisor.reload();

    let selected = supervisor.conf().select_job("svc").expect("selected");
    assert!(selected.path.starts_with(high.path()));
}

#[test]
fn removing_the_shadowing_file_reselects_the_lower_source() {
    let (high, low, mut supervisor) = two_source_world();
    let shadow = high.path().join("svc.conf");
    fs::write(&shadow, "exec = \"/bin/a\"\n").expect("write");
    fs::write(low.path().join("svc.conf"), "exec = \"/bin/b\"\n").expect("write");
    supervisor.reload();

    fs::remove_file(&shadow).expect("remove");
    supervisor.handle_watch_event(tend_daemon::watch::WatchEvent {
        source: 0,
        kind: tend_daemon::watch::WatchKind::Delete,
        path: shadow,
    });

    let selected = supervisor.conf().select_job("svc").expect("selected");
    assert!(selected.path.starts_with(low.path()));
}

#[test]
fn world_fixture_uses_a_single_source() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\n");
    world.supervisor.reload();
    assert_eq!(world.supervisor.conf().sources().len(), 1);
    assert!(world.supervisor.conf().select_job("svc").is_some());
}
