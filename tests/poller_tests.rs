use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Local;
use pw3mqtt::error::{Error, Result};
use pw3mqtt::gateway::TelemetrySource;
use pw3mqtt::metric_collector::MetricCollector;
use pw3mqtt::poller::{PollEvent, PollState, Poller, PollerSettings};
use pw3mqtt::resource::ResourceKey;
use pw3mqtt::snapshot::{FirmwareInfo, Snapshot};
use serde_json::json;

/// Hands out empty snapshots, or the next scripted failure.
#[derive(Default)]
struct FakeSource {
    calls: AtomicUsize,
    forced: AtomicUsize,
    failures: Mutex<VecDeque<Error>>,
}

impl FakeSource {
    fn fail_next(&self, err: Error) {
        self.failures.lock().unwrap().push_back(err);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TelemetrySource for FakeSource {
    fn snapshot(&self, force: bool, include_vitals: bool) -> Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Snapshot {
            firmware: Arc::new(FirmwareInfo::default()),
            config: Arc::new(json!({})),
            status: Arc::new(json!({})),
            vitals: include_vitals.then(|| Arc::new(Default::default())),
            fetched_at: Local::now(),
        })
    }
}

#[derive(Clone, Default)]
struct Counts {
    discovered: Arc<AtomicUsize>,
    published: Arc<AtomicUsize>,
}

impl Counts {
    fn discovered(&self) -> usize {
        self.discovered.load(Ordering::SeqCst)
    }

    fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

struct RecordingCollector(Counts);

impl MetricCollector for RecordingCollector {
    fn discover(&mut self, _snapshot: &Snapshot) {
        self.0.discovered.fetch_add(1, Ordering::SeqCst);
    }

    fn publish(&mut self, _snapshot: &Snapshot) {
        self.0.published.fetch_add(1, Ordering::SeqCst);
    }
}

fn settings(poll_interval: Duration) -> PollerSettings {
    PollerSettings {
        poll_interval,
        backoff_step: Duration::from_secs(1),
        report_vitals: true,
    }
}

fn poller(source: &Arc<FakeSource>, poll_interval: Duration) -> (Poller<Arc<FakeSource>>, Counts) {
    let counts = Counts::default();
    let mut poller = Poller::new(Arc::clone(source), settings(poll_interval));
    poller.add_collector(Box::new(RecordingCollector(counts.clone())));
    (poller, counts)
}

fn started(source: &Arc<FakeSource>) -> (Poller<Arc<FakeSource>>, Counts) {
    let (mut poller, counts) = poller(source, Duration::from_secs(30));
    poller.start().unwrap();
    assert_eq!(poller.state(), PollState::Connected);
    assert_eq!(counts.discovered(), 1);
    assert_eq!(counts.published(), 1);
    (poller, counts)
}

#[test]
fn start_fetches_cached_snapshot_once() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, _) = started(&source);
    assert_eq!(source.calls(), 1);
    assert_eq!(source.forced.load(Ordering::SeqCst), 0);

    // a second start is a no-op
    poller.start().unwrap();
    assert_eq!(source.calls(), 1);
}

#[test]
fn timer_triggers_forced_refresh() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = started(&source);

    assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Polling);
    assert_eq!(source.forced.load(Ordering::SeqCst), 1);
    assert_eq!(counts.published(), 2);
    assert_eq!(counts.discovered(), 1);
}

#[test]
fn paused_poller_skips_timer_and_resyncs_on_resume() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = started(&source);
    poller.dispatch(PollEvent::TimerFired);
    let calls = source.calls();

    assert_eq!(
        poller.dispatch(PollEvent::AvailabilityChanged(false)),
        PollState::Paused
    );
    for _ in 0..3 {
        assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Paused);
    }
    assert_eq!(source.calls(), calls);

    assert_eq!(
        poller.dispatch(PollEvent::AvailabilityChanged(true)),
        PollState::Polling
    );
    assert_eq!(source.calls(), calls + 1);
    assert_eq!(counts.discovered(), 2);
    assert_eq!(counts.published(), 3);
}

#[test]
fn rate_limiting_stretches_interval_monotonically() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = started(&source);

    let mut previous = poller.poll_interval();
    for _ in 0..3 {
        source.fail_next(Error::RateLimiting {
            status: 429,
            cooldown: Duration::from_secs(300),
        });
        assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Polling);
        let interval = poller.poll_interval();
        assert_eq!(interval, previous + Duration::from_secs(1));
        previous = interval;
    }
    assert_eq!(poller.poll_interval(), Duration::from_secs(33));

    // success does not shrink it again
    poller.dispatch(PollEvent::TimerFired);
    assert_eq!(poller.poll_interval(), Duration::from_secs(33));
    assert_eq!(counts.published(), 2);
}

#[test]
fn transient_failures_skip_one_cycle() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = started(&source);

    source.fail_next(Error::LockTimeout {
        resource: ResourceKey::Status,
        timeout: Duration::from_secs(5),
    });
    assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Polling);
    source.fail_next(Error::RateLimited);
    assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Polling);

    assert_eq!(counts.published(), 1);
    assert_eq!(poller.poll_interval(), Duration::from_secs(30));
    assert!(poller.failure().is_none());

    poller.dispatch(PollEvent::TimerFired);
    assert_eq!(counts.published(), 2);
}

#[test]
fn fatal_failure_drains() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = started(&source);

    source.fail_next(Error::AccessDenied);
    assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Draining);
    assert!(matches!(poller.failure(), Some(Error::AccessDenied)));

    // nothing is accepted once draining
    let calls = source.calls();
    assert_eq!(poller.dispatch(PollEvent::TimerFired), PollState::Draining);
    assert_eq!(
        poller.dispatch(PollEvent::AvailabilityChanged(true)),
        PollState::Draining
    );
    assert_eq!(source.calls(), calls);
    assert_eq!(counts.published(), 1);
}

#[test]
fn din_mismatch_during_resync_is_fatal() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, _) = started(&source);

    poller.dispatch(PollEvent::AvailabilityChanged(false));
    source.fail_next(Error::DinMismatch {
        previous: "A".into(),
        current: "B".into(),
    });
    assert_eq!(
        poller.dispatch(PollEvent::AvailabilityChanged(true)),
        PollState::Draining
    );
}

#[test]
fn shutdown_drains() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, _) = started(&source);
    assert_eq!(poller.dispatch(PollEvent::Shutdown), PollState::Draining);
    assert!(poller.failure().is_none());
}

#[test]
fn run_polls_until_shutdown() {
    let source = Arc::new(FakeSource::default());
    let (poller, counts) = poller(&source, Duration::from_millis(20));
    let handle = poller.handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        handle.shutdown();
    });
    poller.run().unwrap();
    stopper.join().unwrap();

    assert_eq!(counts.discovered(), 1);
    assert!(counts.published() >= 2, "{}", counts.published());
}

#[test]
fn run_returns_fatal_error() {
    let source = Arc::new(FakeSource::default());
    let (poller, _) = poller(&source, Duration::from_millis(10));
    let handle = poller.handle();

    // first forced refresh fails
    let failing = Arc::clone(&source);
    let feeder = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        failing.fail_next(Error::Protocol(500));
        thread::sleep(Duration::from_millis(500));
        // only reached if the poller did not stop on its own
        handle.shutdown();
    });

    let err = poller.run().unwrap_err();
    assert!(matches!(err, Error::Protocol(500)), "{err}");
    feeder.join().unwrap();
}

#[test]
fn start_failure_is_reported() {
    let source = Arc::new(FakeSource::default());
    let (mut poller, counts) = poller(&source, Duration::from_secs(30));
    source.fail_next(Error::UnsupportedGateway);
    assert!(matches!(poller.start(), Err(Error::UnsupportedGateway)));
    assert_eq!(poller.state(), PollState::Idle);
    assert_eq!(counts.published(), 0);
}
