//! Application state shared between the tracking core and whatever renders it.
//!
//! Every field has exactly one writer inside the crate:
//! - location: `LocationTracker`
//! - geofences: `GeofenceBoard`
//! - attendance: `AttendanceMachine`
//!
//! Readers get snapshots or subscribe through `tokio::sync::watch`, which only
//! ever holds the latest value; writes replace the whole value.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use super::attendance::AttendanceSnapshot;
use crate::geo::{Geofence, GeofenceStatus, LocationSample};
use crate::types::ClientId;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationState {
    pub current: Option<LocationSample>,
    /// Displayable message from the last failed acquisition.
    pub error: Option<String>,
    pub tracking: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeofenceView {
    /// Records as fetched from the backend.
    pub records: Vec<Geofence>,
    pub client_names: HashMap<ClientId, String>,
    /// `records` annotated for the current location, same order.
    pub statuses: Vec<GeofenceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }
}

const NOTIFICATION_CAPACITY: usize = 32;

struct StoreInner {
    location: watch::Sender<LocationState>,
    geofences: watch::Sender<GeofenceView>,
    attendance: watch::Sender<AttendanceSnapshot>,
    notifications: broadcast::Sender<Notification>,
}

#[derive(Clone)]
pub struct AppStore {
    inner: Arc<StoreInner>,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    pub fn new() -> Self {
        let (location, _) = watch::channel(LocationState::default());
        let (geofences, _) = watch::channel(GeofenceView::default());
        let (attendance, _) = watch::channel(AttendanceSnapshot::default());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                location,
                geofences,
                attendance,
                notifications,
            }),
        }
    }

    pub fn location(&self) -> LocationState {
        self.inner.location.borrow().clone()
    }

    pub fn subscribe_location(&self) -> watch::Receiver<LocationState> {
        self.inner.location.subscribe()
    }

    pub(crate) fn update_location(&self, f: impl FnOnce(&mut LocationState)) {
        self.inner.location.send_modify(f);
    }

    pub fn geofences(&self) -> GeofenceView {
        self.inner.geofences.borrow().clone()
    }

    pub fn subscribe_geofences(&self) -> watch::Receiver<GeofenceView> {
        self.inner.geofences.subscribe()
    }

    pub(crate) fn update_geofences(&self, f: impl FnOnce(&mut GeofenceView)) {
        self.inner.geofences.send_modify(f);
    }

    pub fn attendance(&self) -> AttendanceSnapshot {
        self.inner.attendance.borrow().clone()
    }

    pub fn subscribe_attendance(&self) -> watch::Receiver<AttendanceSnapshot> {
        self.inner.attendance.subscribe()
    }

    /// Applies `f` atomically; the new value is published only when `f`
    /// returns true.
    pub(crate) fn update_attendance_if(
        &self,
        f: impl FnOnce(&mut AttendanceSnapshot) -> bool,
    ) -> bool {
        self.inner.attendance.send_if_modified(f)
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub(crate) fn notify(&self, notification: Notification) {
        // No subscriber is fine; nobody is looking at the screen.
        let _ = self.inner.notifications.send(notification);
    }
}
