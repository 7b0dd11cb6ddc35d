mod backend;
mod client;
mod clients;
mod error;
mod geolocation;
mod timesheet;
pub mod types;

pub use backend::AttendanceApi;
#[cfg(test)]
pub use backend::MockAttendanceApi;
pub use client::ApiClient;
pub use error::ApiError;
pub use types::*;

#[cfg(test)]
mod tests;
