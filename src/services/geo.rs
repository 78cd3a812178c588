//! Great-circle proximity math for stop arrival/departure decisions.

use crate::domain::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A bus within this distance of a stop has arrived at it.
pub const ARRIVAL_RADIUS_METERS: f64 = 50.0;

/// Ceiling on the distance a bus must put between itself and a stop
/// before it counts as departed.
pub const DEPARTURE_RADIUS_METERS: f64 = 80.0;

/// For closely spaced stops the departure threshold shrinks to this
/// fraction of the gap to the next located stop.
pub const NEXT_STOP_DEPARTURE_FRACTION: f64 = 0.4;

/// Haversine great-circle distance in meters on a spherical Earth.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

pub fn distance_between(a: &GeoPoint, b: &GeoPoint) -> f64 {
    distance_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Callers reject invalid samples before any evaluation.
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && latitude.abs() <= 90.0
        && longitude.abs() <= 180.0
}

/// Distance a bus must exceed from `stop` to count as departed.
/// Tightened when the next located stop is close by.
pub fn departure_threshold(stop: &GeoPoint, next_stop: Option<&GeoPoint>) -> f64 {
    match next_stop {
        Some(next) => {
            let gap = distance_between(stop, next);
            DEPARTURE_RADIUS_METERS.min(NEXT_STOP_DEPARTURE_FRACTION * gap)
        }
        None => DEPARTURE_RADIUS_METERS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert_eq!(distance_meters(33.65, -117.73, 33.65, -117.73), 0.0);
    }

    #[test]
    fn known_distance_one_degree_latitude() {
        // One degree of latitude is ~111.2 km on a 6371 km sphere.
        let d = distance_meters(33.0, -117.73, 34.0, -117.73);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn small_offsets_resolve_to_meters() {
        // ~0.0009 degrees latitude is ~100 m.
        let d = distance_meters(33.65, -117.73, 33.6509, -117.73);
        assert!((d - 100.0).abs() < 2.0, "got {d}");
    }

    #[test]
    fn departure_threshold_caps_at_radius() {
        let stop = GeoPoint {
            latitude: 33.65,
            longitude: -117.73,
        };
        // Next stop ~1 km away: 0.4 * 1000 > 80, so the cap applies.
        let far_next = GeoPoint {
            latitude: 33.659,
            longitude: -117.73,
        };
        assert_eq!(
            departure_threshold(&stop, Some(&far_next)),
            DEPARTURE_RADIUS_METERS
        );
        assert_eq!(departure_threshold(&stop, None), DEPARTURE_RADIUS_METERS);
    }

    #[test]
    fn departure_threshold_shrinks_for_close_stops() {
        let stop = GeoPoint {
            latitude: 33.65,
            longitude: -117.73,
        };
        // Next stop ~100 m away: threshold becomes ~40 m.
        let near_next = GeoPoint {
            latitude: 33.6509,
            longitude: -117.73,
        };
        let t = departure_threshold(&stop, Some(&near_next));
        assert!(t < DEPARTURE_RADIUS_METERS);
        assert!((t - 40.0).abs() < 2.0, "got {t}");
    }

    #[test]
    fn coordinate_validation() {
        assert!(is_valid_coordinate(33.65, -117.73));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(91.0, 0.0));
        assert!(!is_valid_coordinate(0.0, 181.0));
    }
}
