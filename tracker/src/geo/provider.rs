//! Position acquisition: the platform seam plus the process-wide tracker.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::location::{LocationError, LocationOptions, LocationSample};
use crate::api::AttendanceApi;
use crate::state::store::AppStore;

/// Samples (or per-sample failures) from a platform watch.
pub type WatchStream = BoxStream<'static, Result<LocationSample, LocationError>>;

/// The platform geolocation capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// One fix. A cached fix no older than `options.maximum_age` may be returned.
    async fn current_position(
        &self,
        options: LocationOptions,
    ) -> Result<LocationSample, LocationError>;

    /// Opens a continuous watch. Dropping the stream cancels the watch.
    async fn watch_position(&self, options: LocationOptions)
        -> Result<WatchStream, LocationError>;
}

/// Live samples from the current tracking run. Ends when tracking stops.
pub struct TrackingStream {
    rx: mpsc::UnboundedReceiver<LocationSample>,
}

impl Stream for TrackingStream {
    type Item = LocationSample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Owns the single watch subscription and writes every sample into the store.
pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    store: AppStore,
    options: LocationOptions,
    reporter: Option<Arc<dyn AttendanceApi>>,
    watch: Mutex<Option<WatchHandle>>,
}

impl LocationTracker {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        store: AppStore,
        options: LocationOptions,
    ) -> Self {
        Self {
            provider,
            store,
            options,
            reporter: None,
            watch: Mutex::new(None),
        }
    }

    /// Posts every tracked sample to the backend as well.
    pub fn with_reporter(mut self, api: Arc<dyn AttendanceApi>) -> Self {
        self.reporter = Some(api);
        self
    }

    pub fn options(&self) -> LocationOptions {
        self.options
    }

    /// One-shot acquisition with the configured options.
    pub async fn get_current_location(&self) -> Result<LocationSample, LocationError> {
        self.acquire(self.options).await
    }

    /// One-shot acquisition that refuses cached fixes.
    pub async fn get_fresh_location(&self) -> Result<LocationSample, LocationError> {
        self.acquire(self.options.fresh()).await
    }

    /// Publishes coordinates the worker typed in through the manual override.
    pub fn record_manual(&self, sample: &LocationSample) {
        tracing::info!(
            latitude = sample.coordinate.latitude,
            longitude = sample.coordinate.longitude,
            "manual location entered"
        );
        let stored = sample.clone();
        self.store.update_location(|state| {
            state.current = Some(stored);
            state.error = None;
        });
    }

    async fn acquire(&self, options: LocationOptions) -> Result<LocationSample, LocationError> {
        match self.provider.current_position(options).await {
            Ok(sample) => {
                tracing::debug!(
                    latitude = sample.coordinate.latitude,
                    longitude = sample.coordinate.longitude,
                    accuracy = sample.accuracy,
                    "acquired location"
                );
                let stored = sample.clone();
                self.store.update_location(|state| {
                    state.current = Some(stored);
                    state.error = None;
                });
                Ok(sample)
            }
            Err(err) => {
                tracing::warn!(error = %err, "location acquisition failed");
                self.store
                    .update_location(|state| state.error = Some(err.user_message().to_string()));
                Err(err)
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.lock_watch()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Starts a fresh watch, stopping any running one first.
    pub async fn start_tracking(&self) -> Result<TrackingStream, LocationError> {
        self.stop_tracking();

        let stream = match self.provider.watch_position(self.options).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = %err, "failed to start location tracking");
                self.store
                    .update_location(|state| state.error = Some(err.user_message().to_string()));
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_watch(
            stream,
            self.store.clone(),
            self.reporter.clone(),
            cancel.clone(),
            tx,
        ));

        let previous = self.lock_watch().replace(WatchHandle { cancel, task });
        if let Some(previous) = previous {
            previous.stop();
        }
        self.store.update_location(|state| state.tracking = true);
        tracing::info!("location tracking started");
        Ok(TrackingStream { rx })
    }

    /// Starts tracking unless a watch is already running. Returns whether a
    /// new watch was started.
    pub async fn ensure_tracking(&self) -> Result<bool, LocationError> {
        if self.is_tracking() {
            return Ok(false);
        }
        self.start_tracking().await.map(|_| true)
    }

    /// Cancels the running watch. Returns false when nothing was running.
    pub fn stop_tracking(&self) -> bool {
        let handle = self.lock_watch().take();
        match handle {
            Some(handle) => {
                handle.stop();
                self.store.update_location(|state| state.tracking = false);
                tracing::info!("location tracking stopped");
                true
            }
            None => false,
        }
    }

    fn lock_watch(&self) -> std::sync::MutexGuard<'_, Option<WatchHandle>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_watch().take() {
            handle.stop();
        }
    }
}

async fn run_watch(
    mut stream: WatchStream,
    store: AppStore,
    reporter: Option<Arc<dyn AttendanceApi>>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<LocationSample>,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(sample)) => {
                tracing::debug!(
                    latitude = sample.coordinate.latitude,
                    longitude = sample.coordinate.longitude,
                    "tracked location"
                );
                let stored = sample.clone();
                store.update_location(|state| {
                    state.current = Some(stored);
                    state.error = None;
                });
                if let Some(api) = &reporter {
                    match api.report_location(sample.clone()).await {
                        Ok(alerts) => {
                            for alert in alerts {
                                tracing::info!(
                                    geofence = %alert.geofence_name,
                                    client_id = %alert.client_id,
                                    alert_type = %alert.alert_type,
                                    "geofence alert"
                                );
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to report location"),
                    }
                }
                let _ = tx.send(sample);
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "location watch error");
                store.update_location(|state| state.error = Some(err.user_message().to_string()));
            }
            None => {
                tracing::debug!("location watch ended");
                store.update_location(|state| state.tracking = false);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAttendanceApi;
    use crate::geo::Coordinate;
    use chrono::Utc;
    use futures::stream;
    use std::time::Duration;

    fn sample(lat: f64) -> LocationSample {
        LocationSample::new(Coordinate::new(lat, -74.006), 5.0, Utc::now())
    }

    fn tracker(provider: MockLocationProvider) -> (LocationTracker, AppStore) {
        let store = AppStore::new();
        let tracker = LocationTracker::new(
            Arc::new(provider),
            store.clone(),
            LocationOptions::default(),
        );
        (tracker, store)
    }

    /// A watch that yields the given samples and then stays open.
    fn open_watch(samples: Vec<LocationSample>) -> WatchStream {
        stream::iter(samples.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed()
    }

    #[tokio::test]
    async fn one_shot_updates_current_location() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_current_position()
            .withf(|opts| opts.maximum_age == Duration::from_secs(30))
            .returning(|_| Ok(sample(40.7128)));
        let (tracker, store) = tracker(provider);

        let got = tracker.get_current_location().await.expect("location");

        assert_eq!(store.location().current, Some(got));
        assert_eq!(store.location().error, None);
    }

    #[tokio::test]
    async fn fresh_location_disallows_cache() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_current_position()
            .withf(|opts| opts.maximum_age == Duration::ZERO)
            .returning(|_| Ok(sample(40.7128)));
        let (tracker, _) = tracker(provider);
        tracker.get_fresh_location().await.expect("location");
    }

    #[tokio::test]
    async fn one_shot_failure_is_surfaced_and_nothing_is_invented() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_current_position()
            .returning(|_| Err(LocationError::PermissionDenied));
        let (tracker, store) = tracker(provider);

        let err = tracker.get_current_location().await.unwrap_err();

        assert_eq!(err, LocationError::PermissionDenied);
        let state = store.location();
        assert_eq!(state.current, None);
        assert_eq!(
            state.error.as_deref(),
            Some(LocationError::PermissionDenied.user_message())
        );
    }

    #[tokio::test]
    async fn tracking_streams_samples_into_store() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_watch_position()
            .times(1)
            .returning(|_| Ok(open_watch(vec![sample(1.0), sample(2.0)])));
        let (tracker, store) = tracker(provider);

        let mut samples = tracker.start_tracking().await.expect("tracking");
        assert!(tracker.is_tracking());
        assert_eq!(samples.next().await.map(|s| s.coordinate.latitude), Some(1.0));
        assert_eq!(samples.next().await.map(|s| s.coordinate.latitude), Some(2.0));
        assert_eq!(
            store.location().current.map(|s| s.coordinate.latitude),
            Some(2.0)
        );

        assert!(tracker.stop_tracking());
        assert!(!tracker.is_tracking());
        assert_eq!(samples.next().await, None);
        assert!(!store.location().tracking);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (tracker, _) = tracker(MockLocationProvider::new());
        assert!(!tracker.stop_tracking());
        assert!(!tracker.stop_tracking());
    }

    #[tokio::test]
    async fn restarting_replaces_previous_watch() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_watch_position()
            .times(2)
            .returning(|_| Ok(open_watch(Vec::new())));
        let (tracker, _) = tracker(provider);

        let mut first = tracker.start_tracking().await.expect("first");
        let _second = tracker.start_tracking().await.expect("second");

        assert_eq!(first.next().await, None);
        assert!(tracker.is_tracking());
    }

    #[tokio::test]
    async fn ensure_tracking_does_not_restart() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_watch_position()
            .times(1)
            .returning(|_| Ok(open_watch(Vec::new())));
        let (tracker, _) = tracker(provider);

        assert!(tracker.ensure_tracking().await.expect("start"));
        assert!(!tracker.ensure_tracking().await.expect("already running"));
    }

    #[tokio::test]
    async fn watch_errors_are_recorded_without_ending_tracking() {
        let mut provider = MockLocationProvider::new();
        provider.expect_watch_position().returning(|_| {
            Ok(stream::iter(vec![Err(LocationError::Timeout), Ok(sample(3.0))])
                .chain(stream::pending())
                .boxed())
        });
        let (tracker, store) = tracker(provider);

        let mut samples = tracker.start_tracking().await.expect("tracking");
        assert_eq!(samples.next().await.map(|s| s.coordinate.latitude), Some(3.0));
        assert!(tracker.is_tracking());
        assert_eq!(store.location().error, None);
    }

    #[tokio::test]
    async fn failing_to_start_reports_error() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_watch_position()
            .returning(|_| Err(LocationError::Unsupported));
        let (tracker, store) = tracker(provider);

        assert!(matches!(
            tracker.start_tracking().await,
            Err(LocationError::Unsupported)
        ));
        assert!(!tracker.is_tracking());
        assert_eq!(
            store.location().error.as_deref(),
            Some(LocationError::Unsupported.user_message())
        );
    }

    #[tokio::test]
    async fn tracked_samples_are_reported_when_enabled() {
        let mut provider = MockLocationProvider::new();
        provider
            .expect_watch_position()
            .returning(|_| Ok(open_watch(vec![sample(4.0)])));
        let mut api = MockAttendanceApi::new();
        api.expect_report_location()
            .times(1)
            .returning(|_| Ok(Vec::new()));
        let store = AppStore::new();
        let tracker = LocationTracker::new(Arc::new(provider), store, LocationOptions::default())
            .with_reporter(Arc::new(api));

        let mut samples = tracker.start_tracking().await.expect("tracking");
        assert!(samples.next().await.is_some());
        tracker.stop_tracking();
    }
}
