use crate::snapshot::Snapshot;

/// A sink for gateway telemetry.
///
/// `discover` announces what the sink will publish (sent at startup and again
/// whenever the downstream side comes back online); `publish` is called after
/// every successful refresh.
pub trait MetricCollector {
    fn discover(&mut self, snapshot: &Snapshot);

    fn publish(&mut self, snapshot: &Snapshot);
}
