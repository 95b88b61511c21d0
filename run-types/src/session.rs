//! Position samples and the session snapshot published by the fusion engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single position fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude above sea level in meters.
    pub altitude: f64,
}

impl Position {
    /// Create a new position fix.
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// A position stamped with the session's elapsed time when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPosition {
    /// The position fix.
    pub position: Position,
    /// Elapsed tracking time since the session started.
    pub elapsed: Duration,
}

impl TimedPosition {
    /// Stamp a position with an elapsed time.
    pub fn new(position: Position, elapsed: Duration) -> Self {
        Self { position, elapsed }
    }
}

/// One contiguous run of samples collected while tracking was continuously on.
pub type Segment = Vec<TimedPosition>;

/// Immutable view of the session, republished on every recomputation.
///
/// Segments are append-only: a pause freezes the last segment and the next
/// resume opens a new one. They are never merged or reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Total distance over all segments, rounded to meters.
    pub distance_meters: u32,
    /// Average pace (time per kilometer), zero while distance is zero.
    pub pace: Duration,
    /// Position samples grouped by tracking segment.
    pub segments: Vec<Segment>,
    /// Heart rates received from the companion, in arrival order.
    pub heart_rates: Vec<u32>,
}

impl SessionSnapshot {
    /// Total number of recorded position samples across all segments.
    pub fn sample_count(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// First recorded position of the session, if any.
    pub fn first_position(&self) -> Option<&TimedPosition> {
        self.segments.iter().flatten().next()
    }

    /// Last recorded position of the session, if any.
    pub fn last_position(&self) -> Option<&TimedPosition> {
        self.segments.iter().flatten().last()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0 && self.heart_rates.is_empty()
    }
}
