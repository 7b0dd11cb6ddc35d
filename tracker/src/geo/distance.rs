use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in [-90, 90], longitude in [-180, 180], both finite.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Great-circle distance between two coordinates in kilometers (haversine).
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).abs().to_radians();
    let d_lon = (b.longitude - a.longitude).abs().to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn distance_m(a: Coordinate, b: Coordinate) -> f64 {
    distance_km(a, b) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NYC: Coordinate = Coordinate {
        latitude: 40.7128,
        longitude: -74.0060,
    };
    const TIMES_SQUARE: Coordinate = Coordinate {
        latitude: 40.7589,
        longitude: -73.9851,
    };

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_km(NYC, NYC), 0.0);
    }

    #[test]
    fn lower_manhattan_to_times_square_is_about_five_and_a_half_km() {
        let d = distance_km(NYC, TIMES_SQUARE);
        assert!((5.0..6.5).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn quarter_meridian_matches_earth_geometry() {
        let d = distance_km(Coordinate::new(0.0, 0.0), Coordinate::new(90.0, 0.0));
        let expected = std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_KM;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn validity_checks_ranges() {
        assert!(NYC.is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    fn coordinate() -> impl Strategy<Value = Coordinate> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Coordinate::new(lat, lon))
    }

    proptest! {
        #[test]
        fn distance_is_symmetric(a in coordinate(), b in coordinate()) {
            prop_assert_eq!(distance_km(a, b), distance_km(b, a));
        }

        #[test]
        fn distance_to_self_is_zero(a in coordinate()) {
            prop_assert_eq!(distance_km(a, a), 0.0);
        }

        #[test]
        fn distance_is_bounded_by_half_circumference(a in coordinate(), b in coordinate()) {
            let d = distance_km(a, b);
            prop_assert!(d >= 0.0);
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }
    }
}
