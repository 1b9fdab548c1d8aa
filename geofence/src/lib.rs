//! Geofence evaluation.
//!
//! A voter may corroborate an issue only from inside its circular catchment:
//! the great-circle distance between the voter and the issue origin must not
//! exceed the issue's *current* radius. Distances use the haversine formula on
//! a spherical Earth.

use civic_types::Coordinates;
use thiserror::Error;

/// Mean Earth radius used by the spherical approximation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeofenceError {
    #[error("invalid location {0}: latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidLocation(Coordinates),
}

/// Great-circle distance between two points, in meters.
pub fn distance_meters(a: &Coordinates, b: &Coordinates) -> Result<f64, GeofenceError> {
    for point in [a, b] {
        if !point.is_valid() {
            return Err(GeofenceError::InvalidLocation(*point));
        }
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();
    Ok(EARTH_RADIUS_METERS * c)
}

/// Outcome of a geofence check, carrying the measured distance for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Eligibility {
    pub distance_meters: f64,
    pub radius_meters: f64,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        self.distance_meters <= self.radius_meters
    }
}

/// Measure a voter against an issue's catchment.
pub fn evaluate(
    origin: &Coordinates,
    radius_meters: f64,
    voter: &Coordinates,
) -> Result<Eligibility, GeofenceError> {
    let distance = distance_meters(origin, voter)?;
    Ok(Eligibility {
        distance_meters: distance,
        radius_meters,
    })
}

/// `true` iff the voter stands within `radius_meters` of the origin.
pub fn is_eligible(
    origin: &Coordinates,
    radius_meters: f64,
    voter: &Coordinates,
) -> Result<bool, GeofenceError> {
    evaluate(origin, radius_meters, voter).map(|e| e.is_eligible())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nairobi() -> Coordinates {
        Coordinates::new(-1.2921, 36.8219)
    }

    #[test]
    fn same_point_is_zero_distance() {
        assert_eq!(distance_meters(&nairobi(), &nairobi()).unwrap(), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(1.0, 0.0);
        let d = distance_meters(&a, &b).unwrap();
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn london_to_paris() {
        let london = Coordinates::new(51.5074, -0.1278);
        let paris = Coordinates::new(48.8566, 2.3522);
        let d = distance_meters(&london, &paris).unwrap();
        assert!((d - 343_500.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn boundary_is_inclusive() {
        let origin = Coordinates::new(0.0, 0.0);
        let voter = Coordinates::new(0.001, 0.0);
        let d = distance_meters(&origin, &voter).unwrap();
        assert!(is_eligible(&origin, d, &voter).unwrap());
        assert!(!is_eligible(&origin, d - 0.01, &voter).unwrap());
    }

    #[test]
    fn antipodes_do_not_produce_nan() {
        let d = distance_meters(&Coordinates::new(0.0, 0.0), &Coordinates::new(0.0, 180.0)).unwrap();
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn malformed_voter_location_rejected() {
        let bad = Coordinates::new(91.0, 0.0);
        assert_eq!(
            is_eligible(&nairobi(), 1000.0, &bad),
            Err(GeofenceError::InvalidLocation(bad))
        );
        let bad_lon = Coordinates::new(0.0, 181.0);
        assert!(is_eligible(&nairobi(), 1000.0, &bad_lon).is_err());
    }
}
