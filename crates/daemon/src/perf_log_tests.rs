// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::TempDir;
use tend_core::JobState;

fn fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn state_change_line_carries_stats_snapshot() {
    let dir = TempDir::new().unwrap();
    let uptime = fixture(&dir, "uptime", "207.64 208.57\n");
    let diskstats = fixture(&dir, "diskstats", "8 0 sda 1898 268 62908 14346\n");
    let log = dir.path().join("perf.log");

    let mut perf = PerfLog::new(&log, &uptime, &diskstats);
    perf.log_state_change("svc", JobState::Starting);

    let written = fs::read_to_string(&log).unwrap();
    assert_eq!(written, "207.64 62908 statechange svc starting\n");
}

#[test]
fn missing_stats_files_substitute_dashes() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("perf.log");

    let mut perf =
        PerfLog::new(&log, dir.path().join("no-uptime"), dir.path().join("no-diskstats"));
    perf.message("statechange svc running".to_string());

    let written = fs::read_to_string(&log).unwrap();
    assert_eq!(written, "- - statechange svc running\n");
}

#[test]
fn short_stats_files_substitute_dashes() {
    let dir = TempDir::new().unwrap();
    let uptime = fixture(&dir, "uptime", "\n");
    let diskstats = fixture(&dir, "diskstats", "8 0\n");
    let log = dir.path().join("perf.log");

    let mut perf = PerfLog::new(&log, &uptime, &diskstats);
    perf.message("statechange svc waiting".to_string());

    let written = fs::read_to_string(&log).unwrap();
    assert_eq!(written, "- - statechange svc waiting\n");
}

#[test]
fn entries_queue_while_log_is_unwritable_and_flush_later() {
    let dir = TempDir::new().unwrap();
    let uptime = fixture(&dir, "uptime", "1.00 2.00\n");
    let diskstats = fixture(&dir, "diskstats", "8 0 sda 1 2 3 4\n");
    // Parent directory does not exist yet, so the open fails.
    let log = dir.path().join("later").join("perf.log");

    let mut perf = PerfLog::new(&log, &uptime, &diskstats);
    perf.message("statechange svc starting".to_string());
    perf.message("statechange svc running".to_string());
    assert_eq!(perf.queued(), 2);

    fs::create_dir_all(log.parent().unwrap()).unwrap();
    perf.flush();
    assert_eq!(perf.queued(), 0);

    let written = fs::read_to_string(&log).unwrap();
    let lines: Vec<_> = written.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("statechange svc starting"));
    assert!(lines[1].ends_with("statechange svc running"));
}

#[test]
fn appends_across_instances() {
    let dir = TempDir::new().unwrap();
    let uptime = fixture(&dir, "uptime", "1.0 1.0\n");
    let diskstats = fixture(&dir, "diskstats", "8 0 sda 1 2 3 4\n");
    let log = dir.path().join("perf.log");

    PerfLog::new(&log, &uptime, &diskstats).message("one".to_string());
    PerfLog::new(&log, &uptime, &diskstats).message("two".to_string());

    let written = fs::read_to_string(&log).unwrap();
    assert_eq!(written.lines().count(), 2);
}

#[test]
fn disabled_log_records_nothing() {
    let mut perf = PerfLog::disabled();
    perf.log_state_change("svc", JobState::Running);
    assert_eq!(perf.queued(), 0);
}
