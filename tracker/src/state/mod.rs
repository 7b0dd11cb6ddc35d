pub mod attendance;
pub mod geofences;
pub mod store;

pub use attendance::{
    AttendanceMachine, AttendancePhase, AttendanceSession, AttendanceSettings,
    AttendanceSnapshot, SessionStatus,
};
pub use geofences::GeofenceBoard;
pub use store::{AppStore, GeofenceView, LocationState, Notification, NotificationLevel};
