//! Clock-in/clock-out state machine.
//!
//! ```text
//! Idle --clock_in--> ClockingIn --ok--> Active --clock_out--> ClockingOut --ok--> Idle
//!                         \--err--> Idle            \--err--> Active
//! ```
//!
//! The backend is authoritative: a phase only advances after it confirms,
//! and `reconcile` adopts whatever session it reports as active.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::geofences::GeofenceBoard;
use super::store::{AppStore, Notification};
use crate::api::{AttendanceApi, CreateTimesheetRequest, LocationPayload, TimesheetResponse};
use crate::config::Config;
use crate::error::AttendanceError;
use crate::geo::{eligible_geofence, Coordinate, Eligibility, LocationSample, LocationTracker};
use crate::types::{ClientId, GeofenceId, SessionId};
use crate::utils::time::{elapsed_hours, naive_utc_to_utc, today_local};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendancePhase {
    #[default]
    Idle,
    ClockingIn,
    Active,
    ClockingOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    /// `None` for timesheets that are neither open nor closed, such as
    /// `pending` or `approved`.
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSession {
    pub id: SessionId,
    pub client_id: ClientId,
    /// Geofence matched at clock-in; unknown for sessions adopted from the server.
    pub geofence_id: Option<GeofenceId>,
    pub clock_in_time: DateTime<Utc>,
    pub clock_in_location: Option<LocationSample>,
    pub clock_out_time: Option<DateTime<Utc>>,
    pub clock_out_location: Option<LocationSample>,
    pub status: SessionStatus,
    pub total_hours: Option<f64>,
}

impl AttendanceSession {
    fn from_response(
        response: TimesheetResponse,
        fallback_clock_in: DateTime<Utc>,
        fallback_location: Option<LocationSample>,
    ) -> Option<Self> {
        let status = SessionStatus::from_wire(&response.status)?;
        let clock_in_time = response
            .clock_in_time
            .map(naive_utc_to_utc)
            .unwrap_or(fallback_clock_in);
        let clock_in_location = fallback_location.or_else(|| {
            response
                .clock_in_location
                .and_then(|stored| stored.into_sample(clock_in_time))
        });
        let clock_out_time = response.clock_out_time.map(naive_utc_to_utc);
        let clock_out_location = response.clock_out_location.and_then(|stored| {
            stored.into_sample(clock_out_time.unwrap_or(clock_in_time))
        });
        Some(Self {
            id: response.id,
            client_id: response.client_id,
            geofence_id: None,
            clock_in_time,
            clock_in_location,
            clock_out_time,
            clock_out_location,
            status,
            total_hours: response.total_hours,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceSnapshot {
    pub phase: AttendancePhase,
    /// The session currently open on the server, while `Active` or `ClockingOut`.
    pub session: Option<AttendanceSession>,
    pub last_completed: Option<AttendanceSession>,
}

/// The parts of `Config` the state machine reads.
#[derive(Debug, Clone)]
pub struct AttendanceSettings {
    pub allow_manual_location: bool,
    pub resolve_addresses: bool,
    pub time_zone: chrono_tz::Tz,
}

impl AttendanceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_manual_location: config.allow_manual_location,
            resolve_addresses: config.resolve_addresses,
            time_zone: config.time_zone,
        }
    }
}

/// Sole writer of the store's attendance snapshot.
pub struct AttendanceMachine {
    api: Arc<dyn AttendanceApi>,
    tracker: Arc<LocationTracker>,
    board: Arc<GeofenceBoard>,
    store: AppStore,
    settings: AttendanceSettings,
}

impl AttendanceMachine {
    pub fn new(
        api: Arc<dyn AttendanceApi>,
        tracker: Arc<LocationTracker>,
        board: Arc<GeofenceBoard>,
        store: AppStore,
        settings: AttendanceSettings,
    ) -> Self {
        Self {
            api,
            tracker,
            board,
            store,
            settings,
        }
    }

    pub fn snapshot(&self) -> AttendanceSnapshot {
        self.store.attendance()
    }

    /// Clocks in at the device position. With `client` set, only that
    /// client's geofences are eligible.
    pub async fn clock_in(
        &self,
        client: Option<ClientId>,
    ) -> Result<AttendanceSession, AttendanceError> {
        let result = self.clock_in_from(client, None).await;
        self.announce(result)
    }

    /// Clocks in at coordinates the worker entered by hand.
    pub async fn clock_in_at(
        &self,
        client: Option<ClientId>,
        at: Coordinate,
    ) -> Result<AttendanceSession, AttendanceError> {
        let result = match self.manual_sample(at) {
            Ok(sample) => self.clock_in_from(client, Some(sample)).await,
            Err(err) => Err(err),
        };
        self.announce(result)
    }

    pub async fn clock_out(&self) -> Result<AttendanceSession, AttendanceError> {
        let result = self.clock_out_from(None).await;
        self.announce(result)
    }

    /// Clocks out at coordinates the worker entered by hand.
    pub async fn clock_out_at(&self, at: Coordinate) -> Result<AttendanceSession, AttendanceError> {
        let result = match self.manual_sample(at) {
            Ok(sample) => self.clock_out_from(Some(sample)).await,
            Err(err) => Err(err),
        };
        self.announce(result)
    }

    /// Adopts the server's view: an active session there means `Active` here.
    pub async fn reconcile(&self) -> Result<AttendancePhase, AttendanceError> {
        let result = self.adopt_server_state().await;
        if let Err(err) = &result {
            self.store.notify(Notification::error(err.user_message()));
        }
        result
    }

    async fn adopt_server_state(&self) -> Result<AttendancePhase, AttendanceError> {
        let timesheets = self.api.list_timesheets().await.map_err(|err| {
            tracing::warn!(error = %err, "failed to load timesheets");
            AttendanceError::from(err)
        })?;

        let active = timesheets
            .into_iter()
            .filter_map(|timesheet| AttendanceSession::from_response(timesheet, Utc::now(), None))
            .find(|session| session.status == SessionStatus::Active);
        let found = active.is_some();

        let applied = self.store.update_attendance_if(|snapshot| {
            if !matches!(snapshot.phase, AttendancePhase::Idle | AttendancePhase::Active) {
                return false;
            }
            let phase = if found {
                AttendancePhase::Active
            } else {
                AttendancePhase::Idle
            };
            if snapshot.phase == phase && snapshot.session == active {
                return false;
            }
            snapshot.phase = phase;
            snapshot.session = active;
            true
        });

        if applied {
            if found {
                tracing::info!("active session found on server");
                if let Err(err) = self.tracker.ensure_tracking().await {
                    tracing::warn!(error = %err, "tracking did not start for active session");
                }
            } else {
                tracing::info!("no active session on server");
                self.tracker.stop_tracking();
            }
        }
        Ok(self.store.attendance().phase)
    }

    async fn clock_in_from(
        &self,
        client: Option<ClientId>,
        manual: Option<LocationSample>,
    ) -> Result<AttendanceSession, AttendanceError> {
        self.begin(AttendancePhase::Idle, AttendancePhase::ClockingIn)?;
        tracing::info!(client_id = ?client, "clocking in");

        let mut started_tracking = false;
        match self.try_clock_in(client, manual, &mut started_tracking).await {
            Ok(session) => {
                self.store.update_attendance_if(|snapshot| {
                    snapshot.phase = AttendancePhase::Active;
                    snapshot.session = Some(session.clone());
                    true
                });
                tracing::info!(session_id = %session.id, "clocked in");
                Ok(session)
            }
            Err(err) => {
                self.finish(AttendancePhase::Idle);
                if matches!(err, AttendanceError::BackendConflict(_)) {
                    // The conflict itself is what the worker gets told about.
                    if let Err(sync) = self.adopt_server_state().await {
                        tracing::warn!(error = %sync, "could not adopt server session");
                    }
                }
                if started_tracking && self.store.attendance().phase == AttendancePhase::Idle {
                    self.tracker.stop_tracking();
                }
                Err(err)
            }
        }
    }

    async fn try_clock_in(
        &self,
        client: Option<ClientId>,
        manual: Option<LocationSample>,
        started_tracking: &mut bool,
    ) -> Result<AttendanceSession, AttendanceError> {
        let sample = match manual {
            Some(sample) => {
                self.tracker.record_manual(&sample);
                sample
            }
            None => self.tracker.get_current_location().await?,
        };

        match self.tracker.ensure_tracking().await {
            Ok(started) => *started_tracking = started,
            Err(err) => tracing::warn!(error = %err, "continuous tracking unavailable"),
        }

        let geofences = self.board.records().await?;
        self.board.reevaluate(Some(sample.coordinate));
        let matched = match eligible_geofence(sample.coordinate, &geofences, client) {
            Eligibility::Inside(matched) => matched,
            Eligibility::Outside { nearest_distance_m } => {
                return Err(AttendanceError::NoGeofenceMatch { nearest_distance_m })
            }
        };
        tracing::debug!(
            geofence = %matched.geofence.name,
            distance_m = matched.distance_m,
            "inside geofence"
        );

        let sample = self.with_address(sample).await;
        let created = self
            .api
            .create_timesheet(CreateTimesheetRequest {
                client_id: matched.geofence.client_id,
                date: today_local(&self.settings.time_zone),
                notes: None,
            })
            .await?;
        let confirmed = self
            .api
            .clock_in(created.id, LocationPayload::from(&sample))
            .await?;

        let mut session =
            AttendanceSession::from_response(confirmed, sample.timestamp, Some(sample))
                .filter(|session| session.status == SessionStatus::Active)
                .ok_or_else(|| {
                    AttendanceError::BackendRejected("The server did not open the session.".into())
                })?;
        session.geofence_id = Some(matched.geofence.id);
        Ok(session)
    }

    async fn clock_out_from(
        &self,
        manual: Option<LocationSample>,
    ) -> Result<AttendanceSession, AttendanceError> {
        self.begin(AttendancePhase::Active, AttendancePhase::ClockingOut)?;

        let Some(session) = self.store.attendance().session else {
            self.finish(AttendancePhase::Idle);
            return Err(AttendanceError::NoActiveSession);
        };
        tracing::info!(session_id = %session.id, "clocking out");

        match self.try_clock_out(&session, manual).await {
            Ok(completed) => {
                self.tracker.stop_tracking();
                self.store.update_attendance_if(|snapshot| {
                    snapshot.phase = AttendancePhase::Idle;
                    snapshot.session = None;
                    snapshot.last_completed = Some(completed.clone());
                    true
                });
                tracing::info!(
                    session_id = %completed.id,
                    total_hours = completed.total_hours,
                    "clocked out"
                );
                Ok(completed)
            }
            Err(err) => {
                self.finish(AttendancePhase::Active);
                Err(err)
            }
        }
    }

    async fn try_clock_out(
        &self,
        session: &AttendanceSession,
        manual: Option<LocationSample>,
    ) -> Result<AttendanceSession, AttendanceError> {
        let sample = match manual {
            Some(sample) => {
                self.tracker.record_manual(&sample);
                sample
            }
            None => self.tracker.get_fresh_location().await?,
        };
        self.board.reevaluate(Some(sample.coordinate));
        let sample = self.with_address(sample).await;

        let confirmed = self
            .api
            .clock_out(session.id, LocationPayload::from(&sample))
            .await?;

        let clock_out_time = confirmed
            .clock_out_time
            .map(naive_utc_to_utc)
            .unwrap_or(sample.timestamp);
        let clock_in_time = confirmed
            .clock_in_time
            .map(naive_utc_to_utc)
            .unwrap_or(session.clock_in_time);
        let total_hours = confirmed
            .total_hours
            .filter(|hours| hours.is_finite() && *hours > 0.0)
            .unwrap_or_else(|| elapsed_hours(clock_in_time, clock_out_time));

        Ok(AttendanceSession {
            clock_in_time,
            clock_out_time: Some(clock_out_time),
            clock_out_location: Some(sample),
            status: SessionStatus::Completed,
            total_hours: Some(total_hours),
            ..session.clone()
        })
    }

    fn manual_sample(&self, at: Coordinate) -> Result<LocationSample, AttendanceError> {
        if !self.settings.allow_manual_location {
            return Err(AttendanceError::ManualLocationDisabled);
        }
        if !at.is_valid() {
            return Err(AttendanceError::InvalidCoordinates);
        }
        Ok(LocationSample::manual(at, Utc::now()))
    }

    async fn with_address(&self, mut sample: LocationSample) -> LocationSample {
        if !self.settings.resolve_addresses || sample.address.is_some() {
            return sample;
        }
        match self.api.reverse_geocode(sample.coordinate).await {
            Ok(address) => sample.address = address,
            Err(err) => tracing::warn!(error = %err, "reverse geocoding failed"),
        }
        sample
    }

    /// Moves `from -> to`, or explains why the transition cannot start.
    fn begin(&self, from: AttendancePhase, to: AttendancePhase) -> Result<(), AttendanceError> {
        let mut refusal = None;
        self.store.update_attendance_if(|snapshot| {
            if snapshot.phase == from {
                snapshot.phase = to;
                return true;
            }
            refusal = Some(match (snapshot.phase, to) {
                (AttendancePhase::Active, AttendancePhase::ClockingIn) => {
                    AttendanceError::AlreadyActive
                }
                (AttendancePhase::Idle, AttendancePhase::ClockingOut) => {
                    AttendanceError::NoActiveSession
                }
                _ => AttendanceError::TransitionInProgress,
            });
            false
        });
        refusal.map_or(Ok(()), Err)
    }

    fn finish(&self, phase: AttendancePhase) {
        self.store.update_attendance_if(|snapshot| {
            snapshot.phase = phase;
            if phase == AttendancePhase::Idle {
                snapshot.session = None;
            }
            true
        });
    }

    fn announce(
        &self,
        result: Result<AttendanceSession, AttendanceError>,
    ) -> Result<AttendanceSession, AttendanceError> {
        match &result {
            Ok(session) if session.status == SessionStatus::Completed => {
                self.store.notify(Notification::success(format!(
                    "Clocked out successfully. Total hours: {:.2}",
                    session.total_hours.unwrap_or_default()
                )));
            }
            Ok(_) => self
                .store
                .notify(Notification::success("Clocked in successfully")),
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "attendance transition failed");
                self.store.notify(Notification::error(err.user_message()));
            }
        }
        result
    }
}
