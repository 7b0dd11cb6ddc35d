use super::*;
use crate::geo::{Coordinate, Geofence, LocationSample};
use crate::types::{ClientId, SessionId};
use chrono::{NaiveDate, TimeZone, Utc};
use httpmock::prelude::*;
use serde_json::json;

const SESSION: &str = "4a3f0f6e-2d8b-4f7e-9c1a-0b2c3d4e5f60";
const CLIENT: &str = "0b8a1c52-3c1e-4a8f-9d0e-5f6a7b8c9d0e";
const GEOFENCE: &str = "6f1c0e4e-4b0a-4c44-9d7e-1d2f3a4b5c6d";

fn timesheet_json(status: &str) -> serde_json::Value {
    json!({
        "id": SESSION,
        "user_id": "u1",
        "client_id": CLIENT,
        "date": "2025-01-02",
        "clock_in_time": "2025-01-02T09:00:00",
        "clock_out_time": null,
        "clock_in_location": { "latitude": 40.7128, "longitude": -74.006, "address": null },
        "clock_out_location": null,
        "total_hours": 0.0,
        "overtime_hours": 0.0,
        "status": status,
        "notes": null,
        "break_times": []
    })
}

fn geofence_json() -> serde_json::Value {
    json!({
        "id": GEOFENCE,
        "name": "Client A Residence",
        "description": "123 Main St",
        "client_id": CLIENT,
        "center_latitude": 40.7128,
        "center_longitude": -74.006,
        "radius_meters": 100.0,
        "geofence_type": "circle",
        "polygon_coordinates": null,
        "is_active": true,
        "created_by": "u2",
        "created_at": "2025-01-01T00:00:00",
        "updated_at": "2025-01-01T00:00:00"
    })
}

fn sample() -> LocationSample {
    LocationSample::new(
        Coordinate::new(40.7128, -74.006),
        8.0,
        Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap(),
    )
}

fn api_client(server: &MockServer) -> ApiClient {
    ApiClient::new_with_base_url(server.url("/api")).with_token("token-1")
}

#[tokio::test]
async fn list_timesheets_sends_bearer_token_and_unwraps_envelope() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/timesheet")
                .header("authorization", "Bearer token-1");
            then.status(200)
                .json_body(json!({ "timesheets": [timesheet_json("active")] }));
        })
        .await;

    let sessions = api_client(&server).list_timesheets().await.expect("timesheets");

    mock.assert_async().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, "active");
    assert_eq!(sessions[0].id, SESSION.parse::<SessionId>().unwrap());
    assert_eq!(
        sessions[0].clock_in_location.as_ref().and_then(|l| l.latitude),
        Some(40.7128)
    );
}

#[tokio::test]
async fn list_timesheets_tolerates_other_stored_location_shapes() {
    let server = MockServer::start_async().await;
    let mut short_form = timesheet_json("completed");
    short_form["id"] = json!("5b4f1f7e-3d9c-4a8f-8d2b-1c3d4e5f6071");
    short_form["clock_in_location"] =
        json!({ "lat": 40.7128, "lng": -74.006, "address": "123 Main St" });
    let mut address_only = timesheet_json("completed");
    address_only["id"] = json!("6c5a2a8f-4eaa-4b9a-9e3c-2d4e5f607182");
    address_only["clock_out_location"] = json!({ "address": "123 Main St" });
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timesheet");
            then.status(200).json_body(json!({
                "timesheets": [timesheet_json("active"), short_form, address_only]
            }));
        })
        .await;

    let sessions = api_client(&server).list_timesheets().await.expect("timesheets");

    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[0].status, "active");
    assert_eq!(
        sessions[1].clock_in_location.as_ref().and_then(|l| l.longitude),
        Some(-74.006)
    );
    let fallback = Utc::now();
    assert_eq!(
        sessions[2]
            .clock_out_location
            .clone()
            .and_then(|l| l.into_sample(fallback)),
        None
    );
}

#[tokio::test]
async fn create_and_clock_in_and_out_hit_timesheet_endpoints() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/timesheet").json_body(json!({
                "client_id": CLIENT,
                "date": "2025-01-02"
            }));
            then.status(201).json_body(json!({
                "message": "Timesheet created successfully",
                "timesheet": timesheet_json("pending")
            }));
        })
        .await;
    let clock_in = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/api/timesheet/{}/clock-in", SESSION))
                .body_contains("\"latitude\":40.7128");
            then.status(200).json_body(json!({
                "message": "Clocked in successfully",
                "timesheet": timesheet_json("active")
            }));
        })
        .await;
    let clock_out = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/api/timesheet/{}/clock-out", SESSION));
            then.status(200).json_body(json!({
                "message": "Clocked out successfully",
                "timesheet": timesheet_json("completed")
            }));
        })
        .await;

    let api = api_client(&server);
    let created = api
        .create_timesheet(&CreateTimesheetRequest {
            client_id: CLIENT.parse::<ClientId>().unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            notes: None,
        })
        .await
        .expect("create");
    assert_eq!(created.status, "pending");

    let payload = LocationPayload::from(&sample());
    let active = api.clock_in(created.id, payload.clone()).await.expect("clock in");
    assert_eq!(active.status, "active");
    let done = api.clock_out(created.id, payload).await.expect("clock out");
    assert_eq!(done.status, "completed");

    create.assert_async().await;
    clock_in.assert_async().await;
    clock_out.assert_async().await;
}

#[tokio::test]
async fn already_clocked_in_answer_is_a_conflict() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/timesheet");
            then.status(400).json_body(json!({
                "error": "You are already clocked in for this client. Please clock out first."
            }));
        })
        .await;

    let err = api_client(&server)
        .create_timesheet(&CreateTimesheetRequest {
            client_id: CLIENT.parse().unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            notes: Some("visit".into()),
        })
        .await
        .unwrap_err();

    assert!(err.is_conflict(), "unexpected error {err:?}");
}

#[tokio::test]
async fn server_failure_is_unavailable_and_plain_rejection_keeps_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/timesheet");
            then.status(503).body("maintenance");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(format!("/api/timesheet/{}/clock-out", SESSION));
            then.status(400).json_body(json!({ "error": "Not clocked in" }));
        })
        .await;

    let api = api_client(&server);
    assert!(matches!(
        api.list_timesheets().await,
        Err(ApiError::Unavailable(_))
    ));
    assert_eq!(
        api.clock_out(SESSION.parse().unwrap(), LocationPayload::from(&sample()))
            .await
            .unwrap_err(),
        ApiError::Rejected {
            status: 400,
            message: "Not clocked in".into()
        }
    );
}

#[tokio::test]
async fn unreachable_backend_is_unavailable() {
    let api = ApiClient::new_with_base_url("http://127.0.0.1:9/api");
    assert!(matches!(
        api.list_timesheets().await,
        Err(ApiError::Unavailable(_))
    ));
}

#[tokio::test]
async fn geofences_and_clients_are_listed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/geolocation/geofences");
            then.status(200)
                .json_body(json!({ "geofences": [geofence_json()] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/client");
            then.status(200).json_body(json!({
                "clients": [{
                    "id": CLIENT,
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "address": "123 Main St"
                }]
            }));
        })
        .await;

    let api = api_client(&server);
    let fences = AttendanceApi::list_geofences(&api).await.expect("geofences");
    let clients = api.list_clients().await.expect("clients");

    let fence: &Geofence = &fences[0];
    assert_eq!(fence.center, Some(Coordinate::new(40.7128, -74.006)));
    assert_eq!(fence.radius_meters, 100.0);
    assert_eq!(clients[0].display_name(), "Ada Lovelace");
}

#[tokio::test]
async fn reverse_geocode_returns_address_or_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/geolocation/geocode/coordinates")
                .body_contains("40.7128");
            then.status(200).json_body(json!({
                "success": true,
                "data": { "formatted_address": "City Hall, New York", "provider": "provider_1" }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/geolocation/geocode/coordinates")
                .body_contains("0.5");
            then.status(400).json_body(json!({
                "success": false,
                "error": "Could not reverse geocode the provided coordinates"
            }));
        })
        .await;

    let api = api_client(&server);
    assert_eq!(
        api.reverse_geocode(Coordinate::new(40.7128, -74.006))
            .await
            .expect("geocode"),
        Some("City Hall, New York".to_string())
    );
    assert_eq!(
        api.reverse_geocode(Coordinate::new(0.5, 0.5))
            .await
            .expect("geocode"),
        None
    );
}

#[tokio::test]
async fn report_location_returns_geofence_alerts() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/geolocation/location")
                .body_contains("\"accuracy\":8.0");
            then.status(200).json_body(json!({
                "message": "Location updated successfully",
                "location": {},
                "geofence_alerts": [{
                    "geofence_id": GEOFENCE,
                    "geofence_name": "Client A Residence",
                    "client_id": CLIENT,
                    "alert_type": "entered"
                }]
            }));
        })
        .await;

    let alerts = api_client(&server)
        .report_location(&sample())
        .await
        .expect("report");

    mock.assert_async().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "entered");
}
