use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::distance::Coordinate;
use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    #[default]
    Device,
    /// Coordinates typed in by the worker through the explicit override.
    Manual,
}

/// One position fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    pub address: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: LocationSource,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, accuracy: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy: accuracy.max(0.0),
            address: None,
            timestamp,
            source: LocationSource::Device,
        }
    }

    pub fn manual(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: LocationSource::Manual,
            ..Self::new(coordinate, 0.0, timestamp)
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Acquisition settings, mirroring the platform geolocation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// How old a cached fix may be and still satisfy a one-shot request.
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(30),
        }
    }
}

impl LocationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enable_high_accuracy: config.location_high_accuracy,
            timeout: config.location_timeout,
            maximum_age: config.location_max_age,
        }
    }

    /// Same settings, but a cached fix is never acceptable.
    pub fn fresh(self) -> Self {
        Self {
            maximum_age: Duration::ZERO,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
    #[error("geolocation is not supported on this platform")]
    Unsupported,
    #[error("location error: {0}")]
    Unknown(String),
}

impl LocationError {
    /// Text shown to the worker.
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::PermissionDenied => {
                "Location access denied. Please enable location services."
            }
            LocationError::PositionUnavailable => "Location information unavailable.",
            LocationError::Timeout => "Location request timed out.",
            LocationError::Unsupported => "Geolocation is not supported on this device.",
            LocationError::Unknown(_) => "An unknown error occurred while getting location.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_match_platform_request() {
        let opts = LocationOptions::default();
        assert!(opts.enable_high_accuracy);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.maximum_age, Duration::from_secs(30));
        assert_eq!(opts.fresh().maximum_age, Duration::ZERO);
    }

    #[test]
    fn negative_accuracy_is_clamped() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let sample = LocationSample::new(Coordinate::new(1.0, 2.0), -3.0, at);
        assert_eq!(sample.accuracy, 0.0);
        assert_eq!(sample.source, LocationSource::Device);
        assert_eq!(LocationSample::manual(Coordinate::new(1.0, 2.0), at).source, LocationSource::Manual);
    }

    #[test]
    fn age_never_goes_negative() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let sample = LocationSample::new(Coordinate::new(1.0, 2.0), 5.0, at);
        assert_eq!(sample.age(at - chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(sample.age(at + chrono::Duration::seconds(5)), Duration::from_secs(5));
    }

    #[test]
    fn every_error_has_a_displayable_message() {
        for err in [
            LocationError::PermissionDenied,
            LocationError::PositionUnavailable,
            LocationError::Timeout,
            LocationError::Unsupported,
            LocationError::Unknown("boom".into()),
        ] {
            assert!(!err.user_message().is_empty());
        }
    }
}
