//! Event-driven poll loop.
//!
//! Shutdown requests, downstream availability changes and timer ticks are
//! all funnelled through one channel and handled in arrival order by a
//! single dispatch loop, which is the only place telemetry is fetched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{Error, Result, Severity};
use crate::gateway::TelemetrySource;
use crate::metric_collector::MetricCollector;
use crate::snapshot::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollEvent {
    Shutdown,
    AvailabilityChanged(bool),
    TimerFired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Connected,
    Polling,
    Paused,
    Draining,
    Stopped,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    /// Added to the poll interval each time the gateway pushes back.
    pub backoff_step: Duration,
    pub report_vitals: bool,
}

/// Cloneable producer side of the poller's event channel.
#[derive(Clone, Debug)]
pub struct PollHandle {
    events: Sender<PollEvent>,
}

impl PollHandle {
    /// Returns `false` once the poller is gone.
    pub fn send(&self, event: PollEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(PollEvent::Shutdown)
    }

    pub fn availability_changed(&self, available: bool) -> bool {
        self.send(PollEvent::AvailabilityChanged(available))
    }
}

struct Timer {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl Timer {
    /// Enqueue `TimerFired` every `interval` milliseconds, re-reading the
    /// interval after each wake so backoff takes effect on the next wait.
    fn spawn(interval: Arc<AtomicU64>, events: Sender<PollEvent>) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::spawn(move || loop {
            let wait = Duration::from_millis(interval.load(Ordering::Acquire));
            match stopped.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {
                    if events.send(PollEvent::TimerFired).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        });
        Self { stop, thread }
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.thread.join().is_err() {
            error!("Timer thread panicked");
        }
    }
}

pub struct Poller<S: TelemetrySource> {
    source: S,
    collectors: Vec<Box<dyn MetricCollector>>,
    state: PollState,
    interval_ms: Arc<AtomicU64>,
    backoff_step: Duration,
    report_vitals: bool,
    sender: Sender<PollEvent>,
    events: Receiver<PollEvent>,
    last_snapshot: Option<Snapshot>,
    failure: Option<Error>,
}

impl<S: TelemetrySource> Poller<S> {
    pub fn new(source: S, settings: PollerSettings) -> Self {
        let (sender, events) = mpsc::channel();
        Self {
            source,
            collectors: Vec::new(),
            state: PollState::Idle,
            interval_ms: Arc::new(AtomicU64::new(settings.poll_interval.as_millis() as u64)),
            backoff_step: settings.backoff_step,
            report_vitals: settings.report_vitals,
            sender,
            events,
            last_snapshot: None,
            failure: None,
        }
    }

    pub fn add_collector(&mut self, collector: Box<dyn MetricCollector>) {
        self.collectors.push(collector);
    }

    pub fn handle(&self) -> PollHandle {
        PollHandle {
            events: self.sender.clone(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    /// The error that ended polling, if any.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    fn transition(&mut self, next: PollState) {
        if self.state != next {
            info!("Poller state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn discover(&mut self, snapshot: &Snapshot) {
        for collector in self.collectors.iter_mut() {
            collector.discover(snapshot);
        }
    }

    fn publish(&mut self, snapshot: &Snapshot) {
        for collector in self.collectors.iter_mut() {
            collector.publish(snapshot);
        }
    }

    /// Initial fetch, discovery and publish; moves `Idle` to `Connected`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PollState::Idle {
            return Ok(());
        }
        let snapshot = self.source.snapshot(false, self.report_vitals)?;
        self.discover(&snapshot);
        self.publish(&snapshot);
        self.last_snapshot = Some(snapshot);
        self.transition(PollState::Connected);
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        let snapshot = self.source.snapshot(true, self.report_vitals)?;
        self.publish(&snapshot);
        self.last_snapshot = Some(snapshot);
        Ok(())
    }

    fn resync(&mut self) -> Result<()> {
        if let Some(snapshot) = self.last_snapshot.take() {
            self.discover(&snapshot);
            self.last_snapshot = Some(snapshot);
        }
        self.refresh()
    }

    fn handle_failure(&mut self, err: Error) {
        match err.severity() {
            Severity::Backoff => {
                let step = self.backoff_step.as_millis() as u64;
                let interval = self.interval_ms.fetch_add(step, Ordering::AcqRel) + step;
                warn!("{err}");
                warn!(
                    "Increasing poll interval by {:?} to {:?}",
                    self.backoff_step,
                    Duration::from_millis(interval)
                );
            }
            Severity::Transient => warn!("Skipping poll cycle: {err}"),
            Severity::Fatal => {
                error!("{err}");
                self.failure = Some(err);
                self.transition(PollState::Draining);
            }
        }
    }

    /// Handle one event and return the resulting state.
    pub fn dispatch(&mut self, event: PollEvent) -> PollState {
        debug!("Dispatching {event:?} in state {}", self.state);
        if matches!(self.state, PollState::Draining | PollState::Stopped) {
            return self.state;
        }

        let outcome = match event {
            PollEvent::Shutdown => {
                info!("Received shutdown signal");
                self.transition(PollState::Draining);
                Ok(())
            }
            PollEvent::AvailabilityChanged(false) => {
                info!("Downstream went offline, pausing");
                self.transition(PollState::Paused);
                Ok(())
            }
            PollEvent::AvailabilityChanged(true) => {
                info!("Downstream came online, resyncing");
                self.transition(PollState::Polling);
                self.resync()
            }
            PollEvent::TimerFired => match self.state {
                PollState::Paused => {
                    debug!("Paused, skipping refresh");
                    Ok(())
                }
                PollState::Idle => Ok(()),
                _ => {
                    info!("Processing update from timer");
                    self.transition(PollState::Polling);
                    self.refresh()
                }
            },
        };

        if let Err(err) = outcome {
            self.handle_failure(err);
        }
        self.state
    }

    /// Run the dispatch loop until shutdown or a fatal failure.
    ///
    /// Performs the initial fetch first if `start` was not called. Returns
    /// the fatal error, if that is what ended the loop.
    pub fn run(mut self) -> Result<()> {
        self.start()?;
        self.transition(PollState::Polling);

        let timer = Timer::spawn(Arc::clone(&self.interval_ms), self.sender.clone());
        while self.state != PollState::Draining {
            match self.events.recv() {
                Ok(event) => {
                    self.dispatch(event);
                }
                Err(_) => break,
            }
        }
        timer.stop();
        self.transition(PollState::Stopped);

        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
