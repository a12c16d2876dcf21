// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job lifecycle engine.
//!
//! Every job is a `(goal, state)` pair. Goal changes come from events
//! and the control surface; the engine applies `next_state` repeatedly
//! until the job rests, spawning and killing processes as states are
//! entered. All mutation happens from the main loop, so the engine is
//! plain single-threaded state.

pub mod scheduler;

use crate::conf::{ClassLifecycle, ConfManager};
use crate::perf_log::PerfLog;
use crate::reap::ChildExit;
use crate::spawn::{KillError, ProcessAdapter, SpawnRequest};
use scheduler::Scheduler;
use std::collections::HashMap;
use std::sync::Arc;
use tend_core::{
    next_state, Clock, Event, Goal, Job, JobClass, JobState, ProcessKind, ProcessState, TimerId,
    TimerKind,
};
use tracing::{debug, error, info, warn};

/// Emitted when a job exhausts its respawn window.
pub const FAILED_EVENT: &str = "failed";

/// Drives job instances through their lifecycle.
pub struct Engine<S: ProcessAdapter, C: Clock> {
    spawner: S,
    clock: C,
    pub scheduler: Scheduler,
    perf: PerfLog,
    jobs: HashMap<String, Job>,
    /// Pid index into `jobs`; unique across all instances.
    pids: HashMap<i32, String>,
    /// Events produced by the engine this iteration, collected by the loop.
    emitted: Vec<Event>,
}

impl<S: ProcessAdapter, C: Clock> Engine<S, C> {
    pub fn new(spawner: S, clock: C, perf: PerfLog) -> Self {
        Self {
            spawner,
            clock,
            scheduler: Scheduler::new(),
            perf,
            jobs: HashMap::new(),
            pids: HashMap::new(),
            emitted: Vec::new(),
        }
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Events the engine emitted since the last take.
    pub fn take_emitted(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.emitted)
    }

    /// Flip a job's goal to start, instantiating it if needed.
    pub fn start(&mut self, class: Arc<JobClass>) {
        if class.is_deleted() {
            warn!(job = %class.name, "not starting deleted job");
            return;
        }
        let name = class.name.clone();
        self.jobs.entry(name.clone()).or_insert_with(|| Job::new(class));
        self.change_goal(&name, Goal::Start);
    }

    /// Flip a job's goal to stop. Returns false when no instance exists.
    pub fn stop(&mut self, name: &str) -> bool {
        if !self.jobs.contains_key(name) {
            return false;
        }
        self.change_goal(name, Goal::Stop);
        true
    }

    fn change_goal(&mut self, name: &str, goal: Goal) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        if job.goal == goal {
            return;
        }
        let old = job.goal;
        job.goal = goal;
        info!(job = name, from = %old, to = %goal, "goal change");

        match (goal, job.state, job.process_state) {
            (Goal::Start, JobState::Waiting, _) => {
                // Leaving the resting state happens on the goal flip
                // itself, not through next_state.
                self.change_state(name, JobState::Starting);
            }
            (Goal::Stop, JobState::Running, ProcessState::Active) => {
                self.kill_process(name);
            }
            (_, state, ProcessState::None) => {
                let target = next_state(goal, state);
                if target != state {
                    self.change_state(name, target);
                }
            }
            // A process is in flight; the new goal is recorded and
            // acted on at the next reconciliation point.
            _ => {}
        }
    }

    /// Walk the state machine until the job rests or waits on a process.
    fn change_state(&mut self, name: &str, mut target: JobState) {
        loop {
            let Some(job) = self.jobs.get_mut(name) else { return };
            if job.state == target {
                return;
            }
            debug_assert_eq!(job.process_state, ProcessState::None);
            info!(job = name, from = %job.state, to = %target, "state change");
            job.state = target;
            self.perf.log_state_change(name, target);

            let next = match target {
                JobState::Waiting => {
                    self.enter_waiting(name);
                    return;
                }
                JobState::Starting => self.enter_process_state(name, ProcessKind::PreStart),
                JobState::Running => self.enter_running(name),
                JobState::Stopping => self.enter_process_state(name, ProcessKind::PostStop),
                JobState::Respawning => self.enter_process_state(name, ProcessKind::Respawn),
            };

            match next {
                Some(state) => target = state,
                None => return,
            }
        }
    }

    fn enter_waiting(&mut self, name: &str) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        debug_assert_eq!(job.goal, Goal::Stop);
        job.reset_respawn_window();
        if job.class.is_deleted() {
            // Completes the replacement protocol: the tombstone class
            // dies with this last reference.
            info!(job = name, "removing instance of deleted job");
            self.jobs.remove(name);
        }
    }

    /// Enter a state that hosts one process descriptor. Returns the
    /// next state to step to when there is nothing to run (or the spawn
    /// failed terminally), `None` when a process is now in flight.
    fn enter_process_state(&mut self, name: &str, kind: ProcessKind) -> Option<JobState> {
        let Some(job) = self.jobs.get(name) else { return None };
        if job.class.process(kind).is_none() {
            return Some(next_state(job.goal, job.state));
        }
        if self.run_process(name, kind) {
            None
        } else {
            let job = self.jobs.get_mut(name)?;
            job.goal = Goal::Stop;
            Some(next_state(job.goal, job.state))
        }
    }

    /// Enter `running`: spawn the main process, or stop a job with
    /// nothing to run so it does not spin through respawning.
    fn enter_running(&mut self, name: &str) -> Option<JobState> {
        let Some(job) = self.jobs.get(name) else { return None };
        if job.class.process(ProcessKind::Main).is_none() {
            let job = self.jobs.get_mut(name)?;
            job.goal = Goal::Stop;
            return Some(next_state(job.goal, job.state));
        }
        if self.run_process(name, ProcessKind::Main) {
            None
        } else {
            let job = self.jobs.get_mut(name)?;
            job.goal = Goal::Stop;
            Some(next_state(job.goal, job.state))
        }
    }

    /// Spawn the descriptor for `kind`, retrying transient failures.
    /// Returns false on a terminal spawn failure.
    fn run_process(&mut self, name: &str, kind: ProcessKind) -> bool {
        let Some(job) = self.jobs.get(name) else { return false };
        debug_assert_ne!(job.state, JobState::Waiting);
        debug_assert_eq!(job.process_state, ProcessState::None);
        let Some(action) = job.class.process(kind) else { return false };

        let request = SpawnRequest {
            job: name.to_string(),
            kind,
            action: action.clone(),
            exec: job.class.exec.clone(),
        };

        let mut logged = false;
        let pid = loop {
            match self.spawner.spawn(&request) {
                Ok(pid) => break pid,
                Err(err) if err.is_transient() => {
                    if !logged {
                        error!(job = name, %err, "failed to spawn process, retrying");
                        logged = true;
                    }
                }
                Err(err) => {
                    error!(job = name, %err, "failed to spawn process");
                    return false;
                }
            }
        };

        let daemon = job.class.daemon;
        let pid_timeout = job.class.pid_timeout;
        let Some(job) = self.jobs.get_mut(name) else { return false };
        job.pid = Some(pid);
        self.pids.insert(pid, name.to_string());
        if daemon && job.state == JobState::Running && kind == ProcessKind::Main {
            info!(job = name, pid, "spawned process, awaiting daemon");
            job.process_state = ProcessState::Spawned;
            let id = TimerId::pid(name);
            job.pid_timer = Some(id.clone());
            self.scheduler.set_timer(id, pid_timeout, self.clock.now());
        } else {
            info!(job = name, pid, kind = %kind, "active process");
            job.process_state = ProcessState::Active;
        }
        true
    }

    /// Begin the kill protocol for a running main process.
    fn kill_process(&mut self, name: &str) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        debug_assert_eq!(job.state, JobState::Running);
        debug_assert_eq!(job.process_state, ProcessState::Active);
        let Some(pid) = job.pid else { return };

        debug!(job = name, pid, "sending TERM signal");
        match self.spawner.kill(pid, false) {
            Ok(()) => {
                job.process_state = ProcessState::Killed;
                let id = TimerId::kill(name);
                job.kill_timer = Some(id.clone());
                let timeout = job.class.kill_timeout;
                self.scheduler.set_timer(id, timeout, self.clock.now());
            }
            Err(err) => {
                // ESRCH means it went away on its own while we were
                // dawdling; anything else is logged but the job is
                // still treated as dead and advanced.
                if !matches!(err, KillError::NoSuchProcess) {
                    error!(job = name, pid, %err, "failed to send TERM signal");
                }
                self.clear_process(name);
                self.change_state(name, JobState::Stopping);
            }
        }
    }

    /// A timer fired; route it by kind.
    pub fn handle_timer(&mut self, id: &TimerId) {
        match id.kind() {
            Some(TimerKind::Kill(job)) => self.kill_timer_fired(&job.to_string()),
            Some(TimerKind::Pid(job)) => self.pid_timer_fired(&job.to_string()),
            None => {}
        }
    }

    /// Kill timeout expired: escalate to SIGKILL and advance without
    /// waiting. A wedged kernel task is treated as dead; the late reap,
    /// if any, finds no matching job and is dropped.
    fn kill_timer_fired(&mut self, name: &str) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        if job.process_state != ProcessState::Killed {
            return;
        }
        let Some(pid) = job.pid else { return };

        debug!(job = name, pid, "sending KILL signal");
        if let Err(err) = self.spawner.kill(pid, true) {
            if !matches!(err, KillError::NoSuchProcess) {
                error!(job = name, pid, %err, "failed to send KILL signal");
            }
        }

        self.clear_process(name);
        self.change_state(name, JobState::Stopping);
    }

    /// Daemon-detection window expired: adopt the pidfile's pid when
    /// one is configured, then mark the process active.
    fn pid_timer_fired(&mut self, name: &str) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        if job.process_state != ProcessState::Spawned {
            return;
        }
        job.pid_timer = None;

        if let Some(pidfile) = &job.class.pidfile {
            match std::fs::read_to_string(pidfile) {
                Ok(content) => match content.trim().parse::<i32>() {
                    Ok(new_pid) if new_pid > 0 => {
                        if let Some(old) = job.pid.replace(new_pid) {
                            self.pids.remove(&old);
                        }
                        self.pids.insert(new_pid, name.to_string());
                        info!(job = name, pid = new_pid, "daemon pid from pidfile");
                    }
                    _ => warn!(job = name, pidfile = %pidfile.display(), "malformed pidfile"),
                },
                Err(err) => {
                    warn!(job = name, pidfile = %pidfile.display(), %err, "unreadable pidfile");
                }
            }
        }

        let Some(job) = self.jobs.get_mut(name) else { return };
        job.process_state = ProcessState::Active;
        info!(job = name, pid = job.pid, "daemon detected");

        // A stop requested while detection was pending acts now.
        if job.goal == Goal::Stop && job.state == JobState::Running {
            self.kill_process(name);
        }
    }

    /// A child died. Unknown pids belong to helper forks and are
    /// silently ignored.
    pub fn handle_child(&mut self, exit: ChildExit) {
        let Some(name) = self.pids.get(&exit.pid).cloned() else { return };
        let Some(job) = self.jobs.get_mut(&name) else { return };

        if exit.killed {
            info!(job = %name, pid = exit.pid, signal = exit.status, "process killed by signal");
        } else {
            info!(job = %name, pid = exit.pid, status = exit.status, "process terminated");
        }

        self.pids.remove(&exit.pid);
        job.pid = None;
        job.process_state = ProcessState::None;
        if let Some(timer) = job.kill_timer.take() {
            self.scheduler.cancel_timer(&timer);
        }
        if let Some(timer) = job.pid_timer.take() {
            self.scheduler.cancel_timer(&timer);
        }

        match job.state {
            JobState::Running => {
                if job.goal == Goal::Start {
                    self.decide_respawn(&name, &exit);
                }
            }
            _ => {
                // Death during a transition script: failure flips the
                // goal so the job unwinds to waiting.
                if exit.killed || exit.status != 0 {
                    job.goal = Goal::Stop;
                }
            }
        }

        let Some(job) = self.jobs.get(&name) else { return };
        let target = next_state(job.goal, job.state);
        self.change_state(&name, target);
    }

    /// Main process died while we wanted it running.
    fn decide_respawn(&mut self, name: &str, exit: &ChildExit) {
        let now = self.clock.now();
        let Some(job) = self.jobs.get_mut(name) else { return };

        let normal = !exit.killed && job.class.respawn.normal_exit.contains(&exit.status);
        if normal {
            job.goal = Goal::Stop;
            return;
        }

        if !job.class.respawn.respawn {
            job.goal = Goal::Stop;
            return;
        }

        if job.note_respawn(now) {
            info!(job = name, "restarting");
        } else {
            warn!(job = name, "respawning too fast, stopped");
            job.goal = Goal::Stop;
            self.emitted.push(
                Event::new(FAILED_EVENT).with_env(vec![("JOB".to_string(), name.to_string())]),
            );
        }
    }

    /// Present one event to every authoritative job class.
    pub fn dispatch_event(&mut self, event: &Event, conf: &ConfManager) {
        for name in conf.job_names() {
            let Some(class) = conf.select_job(&name) else { continue };
            if class.start_on.iter().any(|on| on == &event.name) {
                self.start(class);
            } else if class.stop_on.iter().any(|on| on == &event.name) {
                self.stop(&name);
            }
        }
    }

    fn clear_process(&mut self, name: &str) {
        let Some(job) = self.jobs.get_mut(name) else { return };
        if let Some(pid) = job.pid.take() {
            self.pids.remove(&pid);
        }
        job.process_state = ProcessState::None;
        if let Some(timer) = job.kill_timer.take() {
            self.scheduler.cancel_timer(&timer);
        }
        if let Some(timer) = job.pid_timer.take() {
            self.scheduler.cancel_timer(&timer);
        }
    }
}

impl<S: ProcessAdapter, C: Clock> ClassLifecycle for Engine<S, C> {
    /// The configuration manager dropped a class (file deleted or
    /// definition replaced). A live instance keeps it as a tombstone;
    /// a resting instance is discarded now.
    fn class_removed(&mut self, class: &Arc<JobClass>) {
        class.mark_deleted();
        let Some(job) = self.jobs.get(&class.name) else { return };
        if !Arc::ptr_eq(&job.class, class) {
            return;
        }
        if job.is_active() || job.state != JobState::Waiting {
            debug!(job = %class.name, "retaining deleted class until instance rests");
        } else {
            self.jobs.remove(&class.name);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
