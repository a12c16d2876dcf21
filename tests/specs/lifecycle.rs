//! Job lifecycle scenarios: start→run→stop, respawn, kill escalation.

use super::prelude::World;
use std::time::Duration;
use tend_core::{Event, Goal, JobState, ProcessState};
use tend_daemon::reap::ChildExit;
use tend_daemon::Request;

#[test]
fn start_run_stop() {
    let mut world = World::new();
    world.seed(
        "foo.conf",
        "exec = \"/bin/echo hi\"\nstart_on = [\"startup\"]\nstop_on = [\"shutdown\"]\n",
    );

    world.supervisor.startup();
    world.supervisor.dispatch_events();

    // The startup event flipped the goal; the job ran through waiting →
    // starting → running.
    let job = world.supervisor.engine().job("foo").expect("instance");
    assert_eq!(job.goal, Goal::Start);
    assert_eq!(job.state, JobState::Running);
    let pid = job.pid.expect("spawned");

    // The child exits; with no respawn the goal flips and the job
    // returns to waiting.
    world.supervisor.engine_mut().handle_child(ChildExit::exited(pid, 0));
    let job = world.supervisor.engine().job("foo").expect("instance");
    assert_eq!(job.goal, Goal::Stop);
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.process_state, ProcessState::None);
}

#[test]
fn shutdown_event_stops_a_running_job() {
    let mut world = World::new();
    world.seed(
        "foo.conf",
        "exec = \"/bin/sleep 999\"\nstart_on = [\"startup\"]\nstop_on = [\"shutdown\"]\n",
    );
    world.supervisor.startup();
    world.supervisor.dispatch_events();
    let pid = world.spawner.last_pid().expect("spawned");

    world.supervisor.emit(Event::new("shutdown"));
    world.supervisor.dispatch_events();

    // TERM went out; the death completes the stop.
    assert_eq!(world.spawner.kills(), vec![(pid, false)]);
    world.supervisor.engine_mut().handle_child(ChildExit::signaled(pid, 15));
    let job = world.supervisor.engine().job("foo").expect("instance");
    assert_eq!(job.state, JobState::Waiting);
}

#[test]
fn respawn_until_window_exhausts_then_fail() {
    let mut world = World::new();
    world.seed(
        "bar.conf",
        concat!(
            "exec = \"/bin/false\"\n",
            "start_on = [\"startup\"]\n",
            "normal_exit = [0]\n",
            "\n",
            "[respawn]\n",
            "limit = 1\n",
            "interval = 60\n",
        ),
    );
    world.supervisor.startup();
    world.supervisor.dispatch_events();

    // First abnormal exit: one respawn within the window.
    world.reap_last(1);
    assert_eq!(world.supervisor.engine().job("bar").unwrap().state, JobState::Running);
    assert_eq!(world.spawner.spawns().len(), 2);

    // Second abnormal exit exceeds the limit: goal stop, waiting.
    world.reap_last(1);
    let job = world.supervisor.engine().job("bar").unwrap();
    assert_eq!(job.goal, Goal::Stop);
    assert_eq!(job.state, JobState::Waiting);
}

#[test]
fn normal_exit_ends_the_respawn_cycle() {
    let mut world = World::new();
    world.seed(
        "bar.conf",
        "exec = \"/bin/app\"\nstart_on = [\"startup\"]\nrespawn = true\nnormal_exit = [0]\n",
    );
    world.supervisor.startup();
    world.supervisor.dispatch_events();

    world.reap_last(0);
    let job = world.supervisor.engine().job("bar").unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(world.spawner.spawns().len(), 1);
}

#[test]
fn kill_escalation_after_timeout() {
    let mut world = World::new();
    world.seed("stuck.conf", "exec = \"/bin/stuck\"\nkill_timeout = 5\n");
    world.supervisor.reload();
    world.supervisor.handle_control(Request::Start { name: "stuck".into() });
    let pid = world.spawner.last_pid().unwrap();

    // The process ignores TERM.
    world.supervisor.handle_control(Request::Stop { name: "stuck".into() });
    assert_eq!(
        world.supervisor.engine().job("stuck").unwrap().process_state,
        ProcessState::Killed
    );

    world.clock.advance(Duration::from_secs(6));
    world.fire_timers();

    // KILL was sent, the pid cleared, and the job advanced through
    // stopping to waiting without waiting for a reap.
    assert_eq!(world.spawner.kills(), vec![(pid, false), (pid, true)]);
    let job = world.supervisor.engine().job("stuck").unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.pid, None);

    // The eventual reap of the wedged task is dropped silently.
    world.supervisor.engine_mut().handle_child(ChildExit::signaled(pid, 9));
    assert_eq!(world.supervisor.engine().job("stuck").unwrap().state, JobState::Waiting);
}

#[test]
fn death_before_kill_timeout_cancels_escalation() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\n");
    world.supervisor.reload();
    world.supervisor.handle_control(Request::Start { name: "svc".into() });
    let pid = world.spawner.last_pid().unwrap();

    world.supervisor.handle_control(Request::Stop { name: "svc".into() });
    world.supervisor.engine_mut().handle_child(ChildExit::signaled(pid, 15));

    world.clock.advance(Duration::from_secs(60));
    world.fire_timers();

    // No SIGKILL was ever sent.
    assert_eq!(world.spawner.kills(), vec![(pid, false)]);
}
