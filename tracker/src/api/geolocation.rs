use reqwest::Method;

use super::{
    client::ApiClient,
    error::ApiError,
    types::{
        GeofenceAlert, GeofenceListResponse, GeofenceResponse, LocationReportRequest,
        LocationReportResponse, ReverseGeocodeRequest, ReverseGeocodeResponse,
    },
};
use crate::geo::{Coordinate, LocationSample};

impl ApiClient {
    pub async fn list_geofences(&self) -> Result<Vec<GeofenceResponse>, ApiError> {
        let list: GeofenceListResponse = self
            .send(self.request(Method::GET, "/geolocation/geofences"))
            .await?;
        Ok(list.geofences)
    }

    /// Records a tracked position; the backend answers with the geofences it
    /// considers entered.
    pub async fn report_location(
        &self,
        sample: &LocationSample,
    ) -> Result<Vec<GeofenceAlert>, ApiError> {
        let body = LocationReportRequest {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy: sample.accuracy,
            address: sample.address.clone(),
        };
        let response: LocationReportResponse = self
            .send(self.request(Method::POST, "/geolocation/location").json(&body))
            .await?;
        Ok(response.geofence_alerts)
    }

    /// Resolves a street address; `Ok(None)` when the geocoder found nothing.
    pub async fn reverse_geocode(&self, at: Coordinate) -> Result<Option<String>, ApiError> {
        let body = ReverseGeocodeRequest {
            latitude: at.latitude,
            longitude: at.longitude,
        };
        let result = self
            .send::<ReverseGeocodeResponse>(
                self.request(Method::POST, "/geolocation/geocode/coordinates")
                    .json(&body),
            )
            .await;
        match result {
            Ok(response) if response.success => {
                Ok(response.data.and_then(|data| data.formatted_address))
            }
            Ok(_) => Ok(None),
            // The geocoder answers 400 when no provider resolved the point.
            Err(ApiError::Rejected { status: 400, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
