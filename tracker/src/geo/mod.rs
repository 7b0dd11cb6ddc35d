pub mod distance;
pub mod geofence;
pub mod gpsd;
pub mod location;
pub mod provider;

pub use distance::{distance_km, distance_m, Coordinate};
pub use geofence::{
    eligible_geofence, evaluate, Eligibility, Geofence, GeofenceKind, GeofenceMatch,
    GeofenceStatus,
};
pub use gpsd::GpsdLocationProvider;
pub use location::{LocationError, LocationOptions, LocationSample, LocationSource};
#[cfg(test)]
pub use provider::MockLocationProvider;
pub use provider::{LocationProvider, LocationTracker, TrackingStream, WatchStream};
