//! Great-circle distance and run statistics over segmented samples.
//!
//! Segments are measured independently: the gap between the last sample of
//! one segment and the first sample of the next is never counted.

use run_types::{Position, Segment};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two positions, in meters.
///
/// Altitude is ignored.
pub fn haversine_meters(a: &Position, b: &Position) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);
    let c = 2. * f64::asin(f64::sqrt(h.min(1.0)));

    EARTH_RADIUS_METERS * c
}

/// Unrounded length of a single segment.
pub fn segment_distance_meters(segment: &Segment) -> f64 {
    segment
        .windows(2)
        .map(|pair| haversine_meters(&pair[0].position, &pair[1].position))
        .sum()
}

/// Total distance over all segments, rounded to the nearest meter.
///
/// Rounding happens once on the grand total so that many short segments do
/// not accumulate rounding error.
pub fn total_distance_meters(segments: &[Segment]) -> u32 {
    let total: f64 = segments.iter().map(segment_distance_meters).sum();
    total.round() as u32
}

/// Fastest speed between two consecutive samples, in km/h.
///
/// Pairs whose elapsed time did not advance are skipped.
pub fn max_speed_kmh(segments: &[Segment]) -> f64 {
    segments
        .iter()
        .flat_map(|segment| segment.windows(2))
        .filter_map(|pair| {
            let dt = pair[1].elapsed.checked_sub(pair[0].elapsed)?;
            if dt.is_zero() {
                return None;
            }
            let meters = haversine_meters(&pair[0].position, &pair[1].position);
            Some((meters / 1000.0) / (dt.as_secs_f64() / 3600.0))
        })
        .fold(0.0, f64::max)
}

/// Sum of altitude gains within segments, rounded to meters.
pub fn total_elevation_meters(segments: &[Segment]) -> u32 {
    let gain: f64 = segments
        .iter()
        .flat_map(|segment| segment.windows(2))
        .map(|pair| (pair[1].position.altitude - pair[0].position.altitude).max(0.0))
        .sum();
    gain.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use run_types::TimedPosition;
    use std::time::Duration;

    fn at(lat: f64, lon: f64, secs: u64) -> TimedPosition {
        TimedPosition::new(Position::new(lat, lon, 0.0), Duration::from_secs(secs))
    }

    fn high(alt: f64, secs: u64) -> TimedPosition {
        TimedPosition::new(Position::new(0.0, 0.0, alt), Duration::from_secs(secs))
    }

    #[test]
    fn one_degree_diagonal_is_about_157_km() {
        let segments = vec![vec![at(0.0, 0.0, 0), at(1.0, 1.0, 60)]];
        let distance = total_distance_meters(&segments) as f64;
        let expected = 157_000.0;
        assert!(
            (distance - expected).abs() / expected < 0.03,
            "got {distance}"
        );
    }

    #[test]
    fn empty_and_single_point_segments_contribute_nothing() {
        assert_eq!(total_distance_meters(&[]), 0);
        assert_eq!(total_distance_meters(&[vec![], vec![at(1.0, 1.0, 0)]]), 0);
    }

    #[test]
    fn gap_between_segments_is_not_counted() {
        let joined = vec![vec![at(0.0, 0.0, 0), at(0.0, 0.01, 10), at(0.0, 0.02, 20)]];
        let split = vec![
            vec![at(0.0, 0.0, 0), at(0.0, 0.01, 10)],
            vec![at(0.0, 0.02, 20)],
        ];
        assert!(total_distance_meters(&split) < total_distance_meters(&joined));
    }

    #[test]
    fn rounding_happens_on_the_total() {
        // Each segment is ~0.6 m; rounding per segment would give 3 * 1 = 3.
        let step = 0.6 / EARTH_RADIUS_METERS * (180.0 / std::f64::consts::PI);
        let segment = vec![at(0.0, 0.0, 0), at(step, 0.0, 1)];
        let segments = vec![segment.clone(), segment.clone(), segment];
        assert_eq!(total_distance_meters(&segments), 2);
    }

    #[test]
    fn max_speed_picks_fastest_pair() {
        // ~111 m in 10 s (~40 km/h) then ~111 m in 60 s.
        let segments = vec![vec![at(0.0, 0.0, 0), at(0.001, 0.0, 10), at(0.002, 0.0, 70)]];
        let speed = max_speed_kmh(&segments);
        assert!((speed - 40.0).abs() < 0.5, "got {speed}");
    }

    #[test]
    fn max_speed_skips_zero_time_pairs() {
        let segments = vec![vec![at(0.0, 0.0, 5), at(0.01, 0.0, 5)]];
        assert_eq!(max_speed_kmh(&segments), 0.0);
    }

    #[test]
    fn elevation_counts_only_gains() {
        let segments = vec![
            vec![high(100.0, 0), high(110.0, 1), high(105.0, 2), high(112.5, 3)],
            vec![high(300.0, 4), high(301.0, 5)],
        ];
        // 10 + 7.5 + 1, the jump between segments is ignored
        assert_eq!(total_elevation_meters(&segments), 19);
    }
}
