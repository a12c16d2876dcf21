// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The main loop.
//!
//! Single-threaded and cooperative: one iteration dispatches, in fixed
//! order, pending signals, file-watcher notifications, child reaping,
//! expired timers, the event queue, and external control, then blocks
//! on a multiplexed wait. All engine and configuration state is only
//! ever touched from here; the socket listener task merely forwards
//! parsed requests through a channel.

use crate::conf::{ConfManager, SourceKind};
use crate::engine::Engine;
use crate::perf_log::PerfLog;
use crate::protocol::{JobSummary, Request, Response, VERSION};
use crate::reap;
use crate::spawn::ProcessAdapter;
use crate::watch::WatchEvent;
use std::collections::BTreeSet;
use std::path::PathBuf;
use futures_util::FutureExt;
use tend_core::{Clock, Event, EventQueue, Goal, JobState};
use tokio::sync::{mpsc, oneshot};
use tracing::info;

/// Event emitted once at boot.
pub const STARTUP_EVENT: &str = "startup";

/// Event emitted on SIGINT (console ctrl-alt-delete).
pub const CTRLALTDEL_EVENT: &str = "ctrlaltdel";

/// Event emitted on SIGWINCH (console keyboard request).
pub const KBDREQUEST_EVENT: &str = "kbdrequest";

/// Event emitted on SIGPWR.
pub const PWRSTATUS_EVENT: &str = "power-status-changed";

/// A control request with its reply slot, as forwarded by the listener.
pub struct ControlRequest {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Signal work noted during the wait, acted on at the top of the loop.
#[derive(Debug, Default)]
struct PendingSignals {
    reload: bool,
    reconnect: bool,
    ctrlaltdel: bool,
    kbdrequest: bool,
    power: bool,
    shutdown: bool,
}

/// The supervisor context threaded through the loop.
pub struct Supervisor<S: ProcessAdapter, C: Clock> {
    conf: ConfManager,
    engine: Engine<S, C>,
    events: EventQueue,
    clock: C,
    watch_rx: mpsc::UnboundedReceiver<WatchEvent>,
    control_rx: mpsc::Receiver<ControlRequest>,
    control_tx: mpsc::Sender<ControlRequest>,
    pending: PendingSignals,
    pending_control: Option<ControlRequest>,
}

impl<S: ProcessAdapter, C: Clock> Supervisor<S, C> {
    pub fn new(spawner: S, clock: C, perf: PerfLog) -> Self {
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(32);
        Self {
            conf: ConfManager::new(watch_tx),
            engine: Engine::new(spawner, clock.clone(), perf),
            events: EventQueue::new(),
            clock,
            watch_rx,
            control_rx,
            control_tx,
            pending: PendingSignals::default(),
            pending_control: None,
        }
    }

    /// Handle for the socket listener to forward requests through.
    pub fn control_handle(&self) -> mpsc::Sender<ControlRequest> {
        self.control_tx.clone()
    }

    pub fn add_source(&mut self, path: impl Into<PathBuf>, kind: SourceKind) {
        self.conf.add_source(path, kind);
    }

    pub fn conf(&self) -> &ConfManager {
        &self.conf
    }

    pub fn engine(&self) -> &Engine<S, C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<S, C> {
        &mut self.engine
    }

    /// Load all configuration sources.
    pub fn reload(&mut self) {
        self.conf.reload(&mut self.engine);
    }

    /// Append an event to the queue.
    pub fn emit(&mut self, event: Event) {
        self.events.emit(event);
    }

    /// Initial load and the boot event.
    pub fn startup(&mut self) {
        self.reload();
        self.emit(Event::new(STARTUP_EVENT));
    }

    /// Handle one watcher notification.
    pub fn handle_watch_event(&mut self, event: WatchEvent) {
        self.conf.handle_watch_event(event, &mut self.engine);
    }

    /// Drain buffered watcher notifications.
    pub fn drain_watch_events(&mut self) {
        while let Ok(event) = self.watch_rx.try_recv() {
            self.conf.handle_watch_event(event, &mut self.engine);
        }
    }

    /// Reap all exited children in one non-blocking pass.
    pub fn reap_children(&mut self) {
        for exit in reap::reap_exited() {
            self.engine.handle_child(exit);
        }
    }

    /// Fire every expired timer.
    pub fn fire_timers(&mut self) {
        let fired = self.engine.scheduler.fired_timers(self.clock.now());
        for id in fired {
            self.engine.handle_timer(&id);
        }
    }

    /// Drain the event queue, presenting each event to every job class.
    /// Events emitted during dispatch are handled in the same drain.
    pub fn dispatch_events(&mut self) {
        for emitted in self.engine.take_emitted() {
            self.events.emit(emitted);
        }
        while let Some(event) = self.events.take_next() {
            info!(event = %event.name, "handling event");
            self.engine.dispatch_event(&event, &self.conf);
            for emitted in self.engine.take_emitted() {
                self.events.emit(emitted);
            }
            self.events.settle(event);
        }
        self.events.sweep_finished();
    }

    /// Serve one control request.
    pub fn handle_control(&mut self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong { version: VERSION.to_string() },
            Request::List => {
                let mut names: BTreeSet<String> = self.conf.job_names();
                names.extend(self.engine.jobs().map(|job| job.class.name.clone()));
                let jobs = names.iter().filter_map(|name| self.summary(name)).collect();
                Response::Jobs { jobs }
            }
            Request::Start { name } => match self.conf.select_job(&name) {
                Some(class) => {
                    self.engine.start(class);
                    self.job_response(&name)
                }
                None => Response::Error { message: format!("unknown job: {name}") },
            },
            Request::Stop { name } => {
                self.engine.stop(&name);
                self.job_response(&name)
            }
            Request::Status { name } => self.job_response(&name),
            Request::Emit { name, args, env } => {
                self.emit(Event::new(name).with_args(args).with_env(env));
                Response::Ok
            }
            Request::Reload => {
                info!("reloading configuration");
                self.reload();
                Response::Ok
            }
        }
    }

    fn job_response(&self, name: &str) -> Response {
        match self.summary(name) {
            Some(job) => Response::Job { job },
            None => Response::Error { message: format!("unknown job: {name}") },
        }
    }

    /// Current goal/state/pid for a job, resting defaults when no
    /// instance exists.
    pub fn summary(&self, name: &str) -> Option<JobSummary> {
        if let Some(job) = self.engine.job(name) {
            return Some(JobSummary {
                name: name.to_string(),
                goal: job.goal,
                state: job.state,
                pid: job.pid,
            });
        }
        self.conf.select_job(name).map(|_| JobSummary {
            name: name.to_string(),
            goal: Goal::Stop,
            state: JobState::Waiting,
            pid: None,
        })
    }

    /// Run the supervisor until told to shut down.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut signals = SignalStreams::new()?;
        self.startup();

        loop {
            // (1) pending signals
            self.note_signals(&mut signals);
            if self.act_on_signals() {
                info!("orderly shutdown");
                return Ok(());
            }
            // (2) watcher notifications
            self.drain_watch_events();
            // (3) child reaping
            self.reap_children();
            // (4) expired timers
            self.fire_timers();
            // (5) event queue
            self.dispatch_events();
            // (6) external control
            if let Some(req) = self.pending_control.take() {
                let response = self.handle_control(req.request);
                let _ = req.reply.send(response);
            }
            while let Ok(req) = self.control_rx.try_recv() {
                let response = self.handle_control(req.request);
                let _ = req.reply.send(response);
            }

            self.wait(&mut signals).await;
        }
    }

    /// Collect any signals delivered but not yet noted.
    fn note_signals(&mut self, signals: &mut SignalStreams) {
        while signals.sigchld.recv().now_or_never().flatten().is_some() {}
        while signals.sighup.recv().now_or_never().flatten().is_some() {
            self.pending.reload = true;
        }
        while signals.sigusr1.recv().now_or_never().flatten().is_some() {
            self.pending.reconnect = true;
        }
        while signals.sigint.recv().now_or_never().flatten().is_some() {
            self.pending.ctrlaltdel = true;
        }
        while signals.sigwinch.recv().now_or_never().flatten().is_some() {
            self.pending.kbdrequest = true;
        }
        while signals.sigpwr.recv().now_or_never().flatten().is_some() {
            self.pending.power = true;
        }
        while signals.sigterm.recv().now_or_never().flatten().is_some() {
            self.pending.shutdown = true;
        }
    }

    /// Act on noted signals. Returns true on shutdown.
    fn act_on_signals(&mut self) -> bool {
        let pending = std::mem::take(&mut self.pending);
        if pending.shutdown {
            return true;
        }
        if pending.reload {
            info!("reloading configuration");
            self.reload();
        }
        if pending.reconnect {
            // The control socket needs no reconnection; noted for
            // operators used to the signal.
            info!("control connection reopen requested");
        }
        if pending.ctrlaltdel {
            self.emit(Event::new(CTRLALTDEL_EVENT));
        }
        if pending.kbdrequest {
            self.emit(Event::new(KBDREQUEST_EVENT));
        }
        if pending.power {
            self.emit(Event::new(PWRSTATUS_EVENT));
        }
        false
    }

    /// Block until a signal, watcher notification, control request, or
    /// timer expiry needs attention.
    async fn wait(&mut self, signals: &mut SignalStreams) {
        if self.events.has_pending() {
            // Events emitted from the control phase are handled on the
            // next pass without sleeping.
            return;
        }
        let deadline = self.engine.scheduler.next_deadline();
        let sleep = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = signals.sigchld.recv() => {}
            _ = signals.sighup.recv() => { self.pending.reload = true; }
            _ = signals.sigusr1.recv() => { self.pending.reconnect = true; }
            _ = signals.sigint.recv() => { self.pending.ctrlaltdel = true; }
            _ = signals.sigwinch.recv() => { self.pending.kbdrequest = true; }
            _ = signals.sigpwr.recv() => { self.pending.power = true; }
            _ = signals.sigterm.recv() => { self.pending.shutdown = true; }
            event = self.watch_rx.recv() => {
                if let Some(event) = event {
                    self.conf.handle_watch_event(event, &mut self.engine);
                }
            }
            request = self.control_rx.recv() => {
                self.pending_control = request;
            }
            _ = sleep => {}
        }
    }
}

/// The reserved signal set, as tokio streams.
struct SignalStreams {
    sigchld: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
    sigusr1: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
    sigwinch: tokio::signal::unix::Signal,
    sigpwr: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

impl SignalStreams {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigchld: signal(SignalKind::child())?,
            sighup: signal(SignalKind::hangup())?,
            sigusr1: signal(SignalKind::user_defined1())?,
            sigint: signal(SignalKind::interrupt())?,
            sigwinch: signal(SignalKind::window_change())?,
            sigpwr: signal(SignalKind::from_raw(libc::SIGPWR))?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
