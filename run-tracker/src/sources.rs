//! Collaborators that feed the trackers.
//!
//! Sensors and platform services are reached only through these traits; the
//! trackers never see a concrete platform API.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use run_types::{DeviceNode, DeviceRole, ExerciseError, Position};
use tokio::time::{interval_at, Instant};

/// Default period of [`IntervalTicker`].
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(200);

/// Source of position fixes.
pub trait PositionSource: Send + Sync {
    /// Start observing; fixes arrive roughly every `interval` until the
    /// stream is dropped.
    fn observe(&self, interval: Duration) -> BoxStream<'static, Position>;
}

/// Source of elapsed-time deltas while a session is tracking.
pub trait Ticker: Send + Sync {
    /// A lazy stream of time elapsed since the previous item.
    fn ticks(&self) -> BoxStream<'static, Duration>;
}

/// Reachable nodes of the paired role, as seen by the platform.
pub trait NodeDiscovery: Send + Sync {
    /// Stream of reachable node sets; each item replaces the previous one.
    fn observe_nodes(&self, local: DeviceRole) -> BoxStream<'static, Vec<DeviceNode>>;
}

/// The companion's exercise service (heart-rate sensor and workout session).
#[async_trait]
pub trait ExerciseTracker: Send + Sync {
    /// Whether the device can measure heart rate.
    async fn is_heart_rate_supported(&self) -> bool;

    /// Warm up sensors before a start.
    async fn prepare(&self) -> Result<(), ExerciseError>;

    /// Start a new exercise.
    async fn start(&self) -> Result<(), ExerciseError>;

    /// Resume a paused exercise.
    async fn resume(&self) -> Result<(), ExerciseError>;

    /// Pause the running exercise.
    async fn pause(&self) -> Result<(), ExerciseError>;

    /// End the exercise.
    async fn stop(&self) -> Result<(), ExerciseError>;

    /// Heart-rate samples in beats per minute.
    fn heart_rate(&self) -> BoxStream<'static, u32>;
}

/// Wall-clock ticker backed by `tokio::time`.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTicker {
    period: Duration,
}

impl IntervalTicker {
    /// Ticker firing every `period`.
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl Ticker for IntervalTicker {
    fn ticks(&self) -> BoxStream<'static, Duration> {
        let start = Instant::now();
        let interval = interval_at(start + self.period, self.period);

        stream::unfold((interval, start), |(mut interval, last)| async move {
            let now = interval.tick().await;
            Some((now.saturating_duration_since(last), (interval, now)))
        })
        .boxed()
    }
}
