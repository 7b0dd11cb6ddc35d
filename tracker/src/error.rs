use thiserror::Error;

use crate::api::ApiError;
use crate::geo::LocationError;

/// Failure of a clock-in or clock-out transition. Every variant is recovered
/// by the state machine: the prior phase is restored and the worker is told.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttendanceError {
    #[error("location permission denied")]
    LocationPermissionDenied,
    #[error("location unavailable: {0}")]
    LocationUnavailable(LocationError),
    #[error("location request timed out")]
    LocationTimeout,
    #[error("not inside any eligible geofence")]
    NoGeofenceMatch { nearest_distance_m: Option<f64> },
    #[error("no active session")]
    NoActiveSession,
    #[error("already clocked in")]
    AlreadyActive,
    #[error("another clock transition is in progress")]
    TransitionInProgress,
    #[error("manual location entry is disabled")]
    ManualLocationDisabled,
    #[error("coordinates out of range")]
    InvalidCoordinates,
    #[error("backend reports an active session: {0}")]
    BackendConflict(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend rejected the request: {0}")]
    BackendRejected(String),
}

impl From<LocationError> for AttendanceError {
    fn from(err: LocationError) -> Self {
        match err {
            LocationError::PermissionDenied => AttendanceError::LocationPermissionDenied,
            LocationError::Timeout => AttendanceError::LocationTimeout,
            other => AttendanceError::LocationUnavailable(other),
        }
    }
}

impl From<ApiError> for AttendanceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict(msg) => AttendanceError::BackendConflict(msg),
            ApiError::Unavailable(msg) => AttendanceError::BackendUnavailable(msg),
            ApiError::Decode(msg) => {
                AttendanceError::BackendUnavailable(format!("Unexpected response: {}", msg))
            }
            ApiError::Unauthorized => {
                AttendanceError::BackendRejected("Session expired. Please sign in again.".into())
            }
            ApiError::Rejected { message, .. } => AttendanceError::BackendRejected(message),
        }
    }
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            AttendanceError::LocationUnavailable(_) => "LOCATION_UNAVAILABLE",
            AttendanceError::LocationTimeout => "LOCATION_TIMEOUT",
            AttendanceError::NoGeofenceMatch { .. } => "NO_GEOFENCE_MATCH",
            AttendanceError::NoActiveSession => "NO_ACTIVE_SESSION",
            AttendanceError::AlreadyActive => "ALREADY_ACTIVE",
            AttendanceError::TransitionInProgress => "TRANSITION_IN_PROGRESS",
            AttendanceError::ManualLocationDisabled => "MANUAL_LOCATION_DISABLED",
            AttendanceError::InvalidCoordinates => "INVALID_COORDINATES",
            AttendanceError::BackendConflict(_) => "BACKEND_CONFLICT",
            AttendanceError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            AttendanceError::BackendRejected(_) => "BACKEND_REJECTED",
        }
    }

    /// Notification text for the worker.
    pub fn user_message(&self) -> String {
        match self {
            AttendanceError::LocationPermissionDenied => {
                LocationError::PermissionDenied.user_message().to_string()
            }
            AttendanceError::LocationUnavailable(err) => err.user_message().to_string(),
            AttendanceError::LocationTimeout => LocationError::Timeout.user_message().to_string(),
            AttendanceError::NoGeofenceMatch {
                nearest_distance_m: Some(distance),
            } => format!(
                "You must be within a client's geofence to clock in. Nearest geofence is {:.0} m away.",
                distance
            ),
            AttendanceError::NoGeofenceMatch { .. } => {
                "You must be within a client's geofence to clock in.".to_string()
            }
            AttendanceError::NoActiveSession => "You are not clocked in.".to_string(),
            AttendanceError::AlreadyActive => {
                "You are already clocked in. Please clock out first.".to_string()
            }
            AttendanceError::TransitionInProgress => {
                "Please wait for the current request to finish.".to_string()
            }
            AttendanceError::ManualLocationDisabled => {
                "Manual location entry is not allowed.".to_string()
            }
            AttendanceError::InvalidCoordinates => {
                "Latitude must be within [-90, 90] and longitude within [-180, 180].".to_string()
            }
            AttendanceError::BackendConflict(msg) | AttendanceError::BackendRejected(msg) => {
                msg.clone()
            }
            AttendanceError::BackendUnavailable(_) => {
                "Could not reach the server. Please try again.".to_string()
            }
        }
    }
}
