use reqwest::Method;

use super::{
    client::ApiClient,
    error::ApiError,
    types::{
        ClockRequest, CreateTimesheetRequest, LocationPayload, TimesheetEnvelope,
        TimesheetListResponse, TimesheetResponse,
    },
};
use crate::types::SessionId;

impl ApiClient {
    pub async fn list_timesheets(&self) -> Result<Vec<TimesheetResponse>, ApiError> {
        let list: TimesheetListResponse = self.send(self.request(Method::GET, "/timesheet")).await?;
        Ok(list.timesheets)
    }

    pub async fn create_timesheet(
        &self,
        request: &CreateTimesheetRequest,
    ) -> Result<TimesheetResponse, ApiError> {
        let envelope: TimesheetEnvelope = self
            .send(self.request(Method::POST, "/timesheet").json(request))
            .await?;
        Ok(envelope.timesheet)
    }

    pub async fn clock_in(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError> {
        let envelope: TimesheetEnvelope = self
            .send(
                self.request(Method::POST, &format!("/timesheet/{}/clock-in", id))
                    .json(&ClockRequest { location }),
            )
            .await?;
        Ok(envelope.timesheet)
    }

    pub async fn clock_out(
        &self,
        id: SessionId,
        location: LocationPayload,
    ) -> Result<TimesheetResponse, ApiError> {
        let envelope: TimesheetEnvelope = self
            .send(
                self.request(Method::POST, &format!("/timesheet/{}/clock-out", id))
                    .json(&ClockRequest { location }),
            )
            .await?;
        Ok(envelope.timesheet)
    }
}
