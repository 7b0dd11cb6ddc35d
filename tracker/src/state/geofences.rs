//! Keeps the geofence view in the store current.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::{AppStore, GeofenceView};
use crate::api::{AttendanceApi, ApiError};
use crate::geo::{evaluate, Coordinate, Geofence, GeofenceStatus};

/// Sole writer of the store's geofence view.
pub struct GeofenceBoard {
    api: Arc<dyn AttendanceApi>,
    store: AppStore,
}

impl GeofenceBoard {
    pub fn new(api: Arc<dyn AttendanceApi>, store: AppStore) -> Self {
        Self { api, store }
    }

    /// Refetches geofences and client names, then re-annotates for the
    /// current position. A failed client lookup keeps the names already known.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let records = self.api.list_geofences().await?;
        let client_names = match self.api.list_clients().await {
            Ok(clients) => Some(
                clients
                    .into_iter()
                    .map(|client| (client.id, client.display_name()))
                    .collect::<HashMap<_, _>>(),
            ),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load client names");
                None
            }
        };
        tracing::debug!(count = records.len(), "geofences loaded");

        let current = self.current_coordinate();
        self.store.update_geofences(|view| {
            view.records = records;
            if let Some(names) = client_names {
                view.client_names = names;
            }
            annotate(view, current);
        });
        Ok(())
    }

    /// Freshly fetched geofence records. Falls back to the loaded list when
    /// the backend cannot be reached, and fails only if nothing is loaded.
    pub async fn records(&self) -> Result<Vec<Geofence>, ApiError> {
        match self.refresh().await {
            Ok(()) => Ok(self.store.geofences().records),
            Err(err) => {
                let cached = self.store.geofences().records;
                if cached.is_empty() {
                    return Err(err);
                }
                tracing::warn!(error = %err, "using previously loaded geofences");
                Ok(cached)
            }
        }
    }

    pub fn reevaluate(&self, current: Option<Coordinate>) {
        self.store.update_geofences(|view| annotate(view, current));
    }

    /// Re-annotates on every location change until `cancel` fires.
    pub fn follow_location(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.store.subscribe_location();
        tokio::spawn(async move {
            let mut last = None;
            loop {
                let current = rx.borrow_and_update().current.as_ref().map(|s| s.coordinate);
                if current != last {
                    self.reevaluate(current);
                    last = current;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn current_coordinate(&self) -> Option<Coordinate> {
        self.store.location().current.map(|sample| sample.coordinate)
    }
}

fn annotate(view: &mut GeofenceView, current: Option<Coordinate>) {
    let mut statuses = match current {
        Some(at) => evaluate(at, &view.records),
        None => view
            .records
            .iter()
            .cloned()
            .map(GeofenceStatus::unknown)
            .collect(),
    };
    for status in &mut statuses {
        status.client_name = view.client_names.get(&status.geofence.client_id).cloned();
    }
    view.statuses = statuses;
}
