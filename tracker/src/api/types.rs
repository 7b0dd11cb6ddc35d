use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::geo::{Coordinate, Geofence, GeofenceKind, LocationSample, LocationSource};
use crate::types::{ClientId, GeofenceId, SessionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Location as the timesheet endpoints store it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LocationSource>,
}

impl From<&LocationSample> for LocationPayload {
    fn from(sample: &LocationSample) -> Self {
        Self {
            latitude: sample.coordinate.latitude,
            longitude: sample.coordinate.longitude,
            accuracy: Some(sample.accuracy),
            address: sample.address.clone(),
            timestamp: Some(sample.timestamp),
            source: Some(sample.source),
        }
    }
}

/// Location read back from a stored timesheet. The backend keeps whatever
/// JSON the client posted, so older records may use `lat`/`lng` or carry
/// only an address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng", alias = "lon")]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<LocationSource>,
}

impl StoredLocation {
    /// `None` unless both coordinates are present.
    pub fn into_sample(self, fallback_time: DateTime<Utc>) -> Option<LocationSample> {
        let coordinate = Coordinate::new(self.latitude?, self.longitude?);
        Some(LocationSample {
            coordinate,
            accuracy: self.accuracy.unwrap_or(0.0).max(0.0),
            address: self.address,
            timestamp: self.timestamp.unwrap_or(fallback_time),
            source: self.source.unwrap_or_default(),
        })
    }
}

/// Unreadable locations become `None` instead of failing the whole record.
fn lenient_location<'de, D>(deserializer: D) -> Result<Option<StoredLocation>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match serde_json::from_value(value) {
        Ok(location) => Some(location),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unreadable stored location");
            None
        }
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTimesheetRequest {
    pub client_id: ClientId,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockRequest {
    pub location: LocationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimesheetResponse {
    pub id: SessionId,
    #[serde(default)]
    pub user_id: Option<String>,
    pub client_id: ClientId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// The backend writes naive UTC timestamps.
    #[serde(default)]
    pub clock_in_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub clock_out_time: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_location")]
    pub clock_in_location: Option<StoredLocation>,
    #[serde(default, deserialize_with = "lenient_location")]
    pub clock_out_location: Option<StoredLocation>,
    #[serde(default)]
    pub total_hours: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimesheetEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    pub timesheet: TimesheetResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimesheetListResponse {
    pub timesheets: Vec<TimesheetResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolygonPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceResponse {
    pub id: GeofenceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub client_id: ClientId,
    #[serde(default)]
    pub center_latitude: Option<f64>,
    #[serde(default)]
    pub center_longitude: Option<f64>,
    #[serde(default)]
    pub radius_meters: f64,
    #[serde(default)]
    pub geofence_type: GeofenceKind,
    #[serde(default)]
    pub polygon_coordinates: Option<Vec<PolygonPoint>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl From<GeofenceResponse> for Geofence {
    fn from(raw: GeofenceResponse) -> Self {
        let center = match (raw.center_latitude, raw.center_longitude) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => None,
        };
        Geofence {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            client_id: raw.client_id,
            center,
            radius_meters: raw.radius_meters,
            kind: raw.geofence_type,
            polygon: raw
                .polygon_coordinates
                .unwrap_or_default()
                .into_iter()
                .map(|p| Coordinate::new(p.lat, p.lng))
                .collect(),
            is_active: raw.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceListResponse {
    pub geofences: Vec<GeofenceResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub id: ClientId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub address: Option<String>,
}

impl ClientResponse {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientListResponse {
    pub clients: Vec<ClientResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReportRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceAlert {
    pub geofence_id: GeofenceId,
    pub geofence_name: String,
    pub client_id: ClientId,
    pub alert_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReportResponse {
    #[serde(default)]
    pub geofence_alerts: Vec<GeofenceAlert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseGeocodeRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<ReverseGeocodeData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseGeocodeData {
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub raw: Option<Value>,
}
