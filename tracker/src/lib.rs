//! Geofence-gated attendance tracking for home-care visits.
//!
//! The crate acquires the worker's position, checks it against the client
//! geofences published by the backend, and drives clock-in/clock-out through
//! the timesheet API. Everything observable lives in [`state::AppStore`].

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use config::Config;
pub use error::AttendanceError;
