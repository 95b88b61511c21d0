//! The persisted record of one completed workout.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CodecError, Position, RunId};

/// A completed run as stored locally and on the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Identifier; `None` until one is assigned when the run is queued.
    pub id: Option<RunId>,
    /// Total tracked (non-paused) duration.
    pub duration: Duration,
    /// Unix timestamp (seconds, UTC) when the session started.
    pub started_at: i64,
    /// Total distance in meters.
    pub distance_meters: u32,
    /// Where the run started.
    pub location: Position,
    /// Fastest speed between two consecutive samples.
    pub max_speed_kmh: f64,
    /// Sum of positive altitude changes.
    pub total_elevation_meters: u32,
    /// Average heart rate, when the companion reported any.
    pub avg_heart_rate: Option<u32>,
    /// Maximum heart rate, when the companion reported any.
    pub max_heart_rate: Option<u32>,
    /// Remote URL of the rendered route picture, filled by the remote service.
    pub map_picture_url: Option<String>,
}

impl Run {
    /// Average speed over the tracked duration.
    pub fn avg_speed_kmh(&self) -> f64 {
        let hours = self.duration.as_secs_f64() / 3600.0;
        if hours == 0.0 {
            return 0.0;
        }
        (self.distance_meters as f64 / 1000.0) / hours
    }

    /// Return a copy with the given id.
    pub fn with_id(mut self, id: RunId) -> Self {
        self.id = Some(id);
        self
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(self).map_err(CodecError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        rmp_serde::from_slice(bytes).map_err(CodecError::Deserialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(distance_meters: u32, duration: Duration) -> Run {
        Run {
            id: None,
            duration,
            started_at: 1_700_000_000,
            distance_meters,
            location: Position::new(48.1, 11.5, 520.0),
            max_speed_kmh: 14.2,
            total_elevation_meters: 35,
            avg_heart_rate: Some(151),
            max_heart_rate: Some(178),
            map_picture_url: None,
        }
    }

    #[test]
    fn avg_speed_from_distance_and_duration() {
        let r = run(10_000, Duration::from_secs(3600));
        assert!((r.avg_speed_kmh() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn avg_speed_is_zero_without_duration() {
        assert_eq!(run(500, Duration::ZERO).avg_speed_kmh(), 0.0);
    }

    #[test]
    fn payload_survives_store_encoding() {
        let id = RunId::new();
        let original = run(5_123, Duration::from_secs(1_800)).with_id(id);
        let restored = Run::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.id, Some(id));
    }

    #[test]
    fn corrupt_payload_is_reported() {
        assert!(matches!(
            Run::from_bytes(&[0xc1]),
            Err(CodecError::Deserialization(_))
        ));
    }
}
