//! Reload equivalence and idempotence scenarios.

use super::prelude::World;
use tend_core::{Goal, JobState};
use tend_daemon::Request;

#[test]
fn hangup_reload_matches_a_fresh_process() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\nnice = 0\nkill_timeout = 7\n");
    world.supervisor.reload();

    // Mutate the job file externally, then reload as SIGHUP would.
    world.seed("svc.conf", "exec = \"/bin/svc\"\nnice = 4\nkill_timeout = 9\n");
    world.supervisor.handle_control(Request::Reload);

    // A process started fresh over the same tree sees the same state.
    let mut fresh = World::new();
    fresh.seed("svc.conf", "exec = \"/bin/svc\"\nnice = 4\nkill_timeout = 9\n");
    fresh.supervisor.reload();

    let reloaded = world.supervisor.conf().select_job("svc").expect("class");
    let pristine = fresh.supervisor.conf().select_job("svc").expect("class");
    assert_eq!(reloaded.exec.nice, pristine.exec.nice);
    assert_eq!(reloaded.kill_timeout, pristine.kill_timeout);
    assert_eq!(reloaded.start_on, pristine.start_on);
}

#[test]
fn reload_without_changes_is_idempotent() {
    let mut world = World::new();
    world.seed("one.conf", "exec = \"/bin/one\"\nrespawn = true\n");
    world.seed("two.conf", "exec = \"/bin/two\"\nstart_on = [\"startup\"]\n");
    world.supervisor.reload();

    let before: Vec<_> = world
        .supervisor
        .conf()
        .job_names()
        .iter()
        .map(|name| world.supervisor.conf().select_job(name).expect("class"))
        .collect();

    world.supervisor.reload();

    let after: Vec<_> = world
        .supervisor
        .conf()
        .job_names()
        .iter()
        .map(|name| world.supervisor.conf().select_job(name).expect("class"))
        .collect();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(**a, **b);
    }
}

#[test]
fn reload_does_not_disturb_running_jobs() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\n");
    world.supervisor.reload();
    world.supervisor.handle_control(Request::Start { name: "svc".into() });
    let pid = world.spawner.last_pid().expect("spawned");

    world.supervisor.handle_control(Request::Reload);

    let job = world.supervisor.engine().job("svc").expect("instance");
    assert_eq!((job.goal, job.state), (Goal::Start, JobState::Running));
    assert_eq!(job.pid, Some(pid));
    assert!(world.spawner.kills().is_empty());
}

#[test]
fn status_of_unstarted_job_is_the_resting_pair() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\n");
    world.supervisor.reload();

    let summary = world.supervisor.summary("svc").expect("summary");
    assert_eq!((summary.goal, summary.state, summary.pid), (Goal::Stop, JobState::Waiting, None));
}
