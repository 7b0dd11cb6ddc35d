//! The backend as seen by the attendance core.
//!
//! `AttendanceApi` is the seam the state machine and location tracker talk
//! through; `ApiClient` is the HTTP implementation and `MockAttendanceApi`
//! stands in for it in tests.

use async_trait::async_trait;

use super::{
    client::ApiClient,
    error::ApiError,
    types::{ClientResponse, CreateTimesheetRequest, GeofenceAlert, LocationPayload, TimesheetResponse},
};
use crate::geo::{Coordinate, Geofence, LocationSample};
use crate::types::SessionId;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    /// `GET /timesheet`
    async fn list_timesheets(&self) -> Result<Vec<TimesheetResponse>, ApiError>;

    /// `POST /timesheet`
    async fn create_timesheet(
        &self,
        request: CreateTimesheetRequest,
    ) -> Result<TimesheetResponse, ApiError>;

    /// `POST /timesheet/{id}/clock-in`
    async fn clock_in(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError>;

    /// `POST /timesheet/{id}/clock-out`
    async fn clock_out(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError>;

    /// `GET /geolocation/geofences`
    async fn list_geofences(&self) -> Result<Vec<Geofence>, ApiError>;

    /// `GET /client`
    async fn list_clients(&self) -> Result<Vec<ClientResponse>, ApiError>;

    async fn reverse_geocode(&self, at: Coordinate) -> Result<Option<String>, ApiError>;

    async fn report_location(&self, sample: LocationSample)
        -> Result<Vec<GeofenceAlert>, ApiError>;
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn list_timesheets(&self) -> Result<Vec<TimesheetResponse>, ApiError> {
        ApiClient::list_timesheets(self).await
    }

    async fn create_timesheet(
        &self,
        request: CreateTimesheetRequest,
    ) -> Result<TimesheetResponse, ApiError> {
        ApiClient::create_timesheet(self, &request).await
    }

    async fn clock_in(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError> {
        ApiClient::clock_in(self, id, location).await
    }

    async fn clock_out(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError> {
        ApiClient::clock_out(self, id, location).await
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>, ApiError> {
        Ok(ApiClient::list_geofences(self)
            .await?
            .into_iter()
            .map(Geofence::from)
            .collect())
    }

    async fn list_clients(&self) -> Result<Vec<ClientResponse>, ApiError> {
        ApiClient::list_clients(self).await
    }

    async fn reverse_geocode(&self, at: Coordinate) -> Result<Option<String>, ApiError> {
        ApiClient::reverse_geocode(self, at).await
    }

    async fn report_location(
        &self,
        sample: LocationSample,
    ) -> Result<Vec<GeofenceAlert>, ApiError> {
        ApiClient::report_location(self, &sample).await
    }
}
