//! Override merge scenarios, including replacement of a running job.

use super::prelude::World;
use tend_core::{Goal, JobState};
use tend_daemon::reap::ChildExit;
use tend_daemon::Request;

#[test]
fn override_merge_then_delete_restores_base() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\nnice = 0\n");
    world.supervisor.reload();
    assert_eq!(world.supervisor.conf().select_job("svc").unwrap().exec.nice, Some(0));

    // Adding the override mutates only what it names.
    world.write("svc.override", "nice = 10\n");
    let merged = world.supervisor.conf().select_job("svc").unwrap();
    assert_eq!(merged.exec.nice, Some(10));

    // Deleting it reverts to the base definition.
    world.remove("svc.override");
    let reverted = world.supervisor.conf().select_job("svc").unwrap();
    assert_eq!(reverted.exec.nice, Some(0));
}

#[test]
fn conf_edit_while_running_defers_replacement() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/old\"\n");
    world.supervisor.reload();
    world.supervisor.handle_control(Request::Start { name: "svc".into() });
    let pid = world.spawner.last_pid().unwrap();
    let old_class = world.supervisor.engine().job("svc").unwrap().class.clone();

    // The definition changes under a running job: the new class is
    // installed, the old one is tombstoned, and the process is not
    // disturbed.
    world.write("svc.conf", "exec = \"/bin/new\"\n");
    assert!(old_class.is_deleted());
    let installed = world.supervisor.conf().select_job("svc").unwrap();
    assert!(!installed.is_deleted());
    let job = world.supervisor.engine().job("svc").unwrap();
    assert_eq!(job.state, JobState::Running);
    assert_eq!(job.pid, Some(pid));
    assert!(world.spawner.kills().is_empty());

    // Replacement completes at the next clean rest.
    world.supervisor.engine_mut().handle_child(ChildExit::exited(pid, 0));
    assert!(world.supervisor.engine().job("svc").is_none());

    // A fresh start uses the new definition.
    world.supervisor.handle_control(Request::Start { name: "svc".into() });
    let spawns = world.spawner.spawns();
    let request = &spawns.last().unwrap().1;
    assert_eq!(
        request.action,
        tend_core::ProcessAction::Command("/bin/new".to_string())
    );
}

#[test]
fn orphan_override_never_yields_a_job() {
    let mut world = World::new();
    world.supervisor.reload();
    world.write("ghost.override", "nice = 3\n");

    assert!(world.supervisor.conf().select_job("ghost").is_none());
    let response = world.supervisor.handle_control(Request::Start { name: "ghost".into() });
    assert!(matches!(response, tend_daemon::Response::Error { .. }));
}

#[test]
fn override_applies_while_job_keeps_running() {
    let mut world = World::new();
    world.seed("svc.conf", "exec = \"/bin/svc\"\nnice = 0\n");
    world.supervisor.reload();
    world.supervisor.handle_control(Request::Start { name: "svc".into() });
    let pid = world.spawner.last_pid().unwrap();

    world.write("svc.override", "nice = 10\n");

    // The merged class is authoritative for the next start; the live
    // process is untouched.
    assert_eq!(world.supervisor.conf().select_job("svc").unwrap().exec.nice, Some(10));
    let job = world.supervisor.engine().job("svc").unwrap();
    assert_eq!((job.goal, job.state), (Goal::Start, JobState::Running));
    assert_eq!(job.pid, Some(pid));
}
