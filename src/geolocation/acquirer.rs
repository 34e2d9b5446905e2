//! Progressive location acquisition
//!
//! `Idle → QuickFix → Refining → {Settled | Failed}`. A quick, low accuracy
//! fix is published immediately, then a high accuracy watch refines it until
//! the target accuracy is reached or the refinement window closes. Without a
//! usable device fix the server-side IP lookup is tried before giving up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

use super::ip::IpLocator;
use super::platform::{Position, PositionError, PositionOptions, PositionResult, PositionSource};
use super::refinement::{Refinement, RefinementTracker};
use crate::config::GeolocationConfig;
use crate::error::GeolocationFailure;
use crate::models::{LocationSource, UserLocation};
use crate::DirectionsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Idle,
    QuickFix,
    Refining,
    Settled,
    Failed,
}

/// What subscribers see after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquisitionSnapshot {
    pub state: AcquisitionState,
    pub location: Option<UserLocation>,
    pub failure: Option<GeolocationFailure>,
    /// Inline message for the visitor
    pub message: Option<String>,
}

impl AcquisitionSnapshot {
    fn idle() -> Self {
        Self {
            state: AcquisitionState::Idle,
            location: None,
            failure: None,
            message: None,
        }
    }
}

/// How the refinement watch ended
#[derive(Debug, PartialEq)]
enum WatchEnd {
    Settled,
    WindowElapsed,
    Closed,
    Failed(PositionError),
}

struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct GeolocationAcquirer {
    source: Option<Arc<dyn PositionSource>>,
    ip_locator: Arc<dyn IpLocator>,
    settings: GeolocationConfig,
    loading: AtomicBool,
    state: watch::Sender<AcquisitionSnapshot>,
}

impl GeolocationAcquirer {
    /// `source` is `None` on platforms without positioning hardware
    pub fn new(
        source: Option<Arc<dyn PositionSource>>,
        ip_locator: Arc<dyn IpLocator>,
        settings: GeolocationConfig,
    ) -> Self {
        let (state, _) = watch::channel(AcquisitionSnapshot::idle());
        Self {
            source,
            ip_locator,
            settings,
            loading: AtomicBool::new(false),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AcquisitionSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> AcquisitionSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Forget the current location. Ignored while an acquisition runs.
    pub fn clear(&self) {
        if self.is_loading() {
            return;
        }
        self.state.send_replace(AcquisitionSnapshot::idle());
    }

    /// Replace the location with one chosen by the visitor (search, manual entry)
    pub fn set_location(&self, location: UserLocation) {
        if self.is_loading() {
            debug!("Ignoring manual location while acquisition is running");
            return;
        }
        self.state.send_replace(AcquisitionSnapshot {
            state: AcquisitionState::Settled,
            location: Some(location),
            failure: None,
            message: None,
        });
    }

    /// Run one acquisition. Returns `None` when another acquisition is already running.
    pub async fn acquire(&self) -> Option<AcquisitionSnapshot> {
        if self
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Location acquisition already in progress");
            return None;
        }
        let _guard = LoadingGuard(&self.loading);

        let source = match &self.source {
            Some(source) if source.is_available() => source.clone(),
            _ => {
                info!("No device positioning, using IP fallback");
                return Some(self.fall_back(None).await);
            }
        };

        self.state.send_modify(|snapshot| {
            snapshot.state = AcquisitionState::QuickFix;
            snapshot.failure = None;
            snapshot.message = None;
        });

        let mut tracker = RefinementTracker::new(
            self.settings.accuracy_margin_meters,
            self.settings.target_accuracy_meters,
        );
        let mut have_fix = false;
        let mut last_error = None;

        match self.quick_fix(source.as_ref()).await {
            Ok(position) => match position.to_user_location(LocationSource::QuickFix) {
                Ok(location) => {
                    debug!(accuracy = position.accuracy, "Quick fix acquired");
                    tracker.record_initial(position.accuracy);
                    self.publish(location);
                    have_fix = true;
                }
                Err(err) => last_error = Some(err),
            },
            Err(err) => {
                debug!(error = %err, "Quick fix failed");
                last_error = Some(err);
            }
        }

        if !tracker.is_settled() {
            self.state
                .send_modify(|snapshot| snapshot.state = AcquisitionState::Refining);
            match self.refine(source.as_ref(), &mut tracker).await {
                WatchEnd::Failed(err) => {
                    debug!(error = %err, "Refinement watch failed");
                    last_error = Some(err);
                }
                end => debug!(?end, accuracy = ?tracker.best_accuracy(), "Refinement finished"),
            }
            have_fix |= tracker.best_accuracy().is_some();
        }

        if have_fix {
            self.state
                .send_modify(|snapshot| snapshot.state = AcquisitionState::Settled);
            return Some(self.snapshot());
        }

        Some(self.fall_back(last_error).await)
    }

    async fn quick_fix(&self, source: &dyn PositionSource) -> PositionResult<Position> {
        let options = PositionOptions {
            enable_high_accuracy: false,
            timeout: Some(self.settings.quick_timeout()),
            maximum_age: self.settings.quick_max_age(),
        };
        timeout(self.settings.quick_timeout(), source.current_position(options))
            .await
            .unwrap_or_else(|_| Err(PositionError::timeout()))
    }

    /// Drive the high accuracy watch. The watch is cleared on every exit path.
    async fn refine(&self, source: &dyn PositionSource, tracker: &mut RefinementTracker) -> WatchEnd {
        let options = PositionOptions {
            enable_high_accuracy: true,
            timeout: Some(self.settings.refine_window()),
            maximum_age: std::time::Duration::ZERO,
        };
        let started = Instant::now();
        let window_end = started + self.settings.refine_window();
        let hard_deadline = started + self.settings.refine_hard_timeout();

        let mut subscription = match timeout_at(hard_deadline, source.watch_position(options)).await {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(err)) => return WatchEnd::Failed(err),
            Err(_) => {
                warn!("Watch subscription hit the hard timeout");
                return WatchEnd::WindowElapsed;
            }
        };

        let end = match timeout_at(
            hard_deadline,
            self.drain_watch(&mut subscription.updates, tracker, window_end),
        )
        .await
        {
            Ok(end) => end,
            Err(_) => {
                warn!("Refinement hit the hard timeout");
                WatchEnd::WindowElapsed
            }
        };

        source.clear_watch(subscription.id);
        drop(subscription);
        end
    }

    async fn drain_watch(
        &self,
        updates: &mut mpsc::Receiver<PositionResult<Position>>,
        tracker: &mut RefinementTracker,
        window_end: Instant,
    ) -> WatchEnd {
        loop {
            let update = match timeout_at(window_end, updates.recv()).await {
                Err(_) => return WatchEnd::WindowElapsed,
                Ok(None) => return WatchEnd::Closed,
                Ok(Some(update)) => update,
            };

            let position = match update {
                Ok(position) => position,
                Err(err) => return WatchEnd::Failed(err),
            };

            let location = match position.to_user_location(LocationSource::Refined) {
                Ok(location) => location,
                Err(err) => {
                    debug!(error = %err, "Skipping unusable watch update");
                    continue;
                }
            };

            match tracker.offer(position.accuracy) {
                Refinement::Accepted { settled } => {
                    debug!(accuracy = position.accuracy, settled, "Refined location accepted");
                    self.publish(location);
                    if settled {
                        return WatchEnd::Settled;
                    }
                }
                Refinement::Rejected => {
                    debug!(accuracy = position.accuracy, "Watch update not accurate enough")
                }
                Refinement::Ignored => return WatchEnd::Settled,
            }
        }
    }

    async fn fall_back(&self, device_error: Option<PositionError>) -> AcquisitionSnapshot {
        match self.ip_locator.locate().await {
            Ok(location) => {
                info!(lat = location.point.lat, lon = location.point.lon, "Using IP based location");
                self.state.send_replace(AcquisitionSnapshot {
                    state: AcquisitionState::Settled,
                    location: Some(location),
                    failure: None,
                    message: None,
                });
            }
            Err(err) => {
                let kind = match &device_error {
                    Some(device) if device.is_permission_denied() => {
                        GeolocationFailure::PermissionDenied
                    }
                    _ => GeolocationFailure::Unavailable,
                };
                warn!(error = %err, ?kind, "Could not determine location");
                let message = DirectionsError::geolocation(kind).user_message();
                self.state.send_modify(|snapshot| {
                    snapshot.state = AcquisitionState::Failed;
                    snapshot.failure = Some(kind);
                    snapshot.message = Some(message);
                });
            }
        }
        self.snapshot()
    }

    fn publish(&self, location: UserLocation) {
        self.state.send_modify(|snapshot| snapshot.location = Some(location));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geolocation::platform::{PositionErrorCode, PositionWatch, WatchId};
    use crate::models::GeoPoint;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    type Script = Vec<(Duration, PositionResult<Position>)>;

    /// Scripted device: one quick fix answer and a timed sequence of watch updates
    struct FakeDevice {
        available: bool,
        quick: Mutex<Option<(Duration, PositionResult<Position>)>>,
        watch_script: Mutex<Script>,
        watch_error: Option<PositionError>,
        watch_delay: Duration,
        cleared: Mutex<Vec<WatchId>>,
        watch_sender: Mutex<Option<mpsc::Sender<PositionResult<Position>>>>,
    }

    impl FakeDevice {
        fn new(quick: PositionResult<Position>, watch_script: Script) -> Self {
            Self {
                available: true,
                quick: Mutex::new(Some((Duration::from_millis(100), quick))),
                watch_script: Mutex::new(watch_script),
                watch_error: None,
                watch_delay: Duration::ZERO,
                cleared: Mutex::new(Vec::new()),
                watch_sender: Mutex::new(None),
            }
        }

        fn cleared(&self) -> Vec<WatchId> {
            self.cleared.lock().unwrap().clone()
        }

        /// Push an update after the acquisition finished
        fn late_update(&self, position: Position) -> bool {
            let sender = self.watch_sender.lock().unwrap().clone();
            match sender {
                Some(sender) => sender.try_send(Ok(position)).is_ok(),
                None => false,
            }
        }
    }

    #[async_trait]
    impl PositionSource for FakeDevice {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn current_position(&self, options: PositionOptions) -> PositionResult<Position> {
            assert!(!options.enable_high_accuracy);
            assert_eq!(options.maximum_age, Duration::from_secs(30));
            let (delay, answer) = self
                .quick
                .lock()
                .unwrap()
                .take()
                .unwrap_or((Duration::ZERO, Err(PositionError::timeout())));
            tokio::time::sleep(delay).await;
            answer
        }

        async fn watch_position(&self, options: PositionOptions) -> PositionResult<PositionWatch> {
            assert!(options.enable_high_accuracy);
            tokio::time::sleep(self.watch_delay).await;
            if let Some(err) = &self.watch_error {
                return Err(err.clone());
            }
            let (tx, rx) = mpsc::channel(16);
            *self.watch_sender.lock().unwrap() = Some(tx.clone());
            let script = std::mem::take(&mut *self.watch_script.lock().unwrap());
            tokio::spawn(async move {
                for (delay, update) in script {
                    tokio::time::sleep(delay).await;
                    if tx.send(update).await.is_err() {
                        return;
                    }
                }
                // keep the channel open like a real platform watch
                std::future::pending::<()>().await;
            });
            Ok(PositionWatch {
                id: WatchId(7),
                updates: rx,
            })
        }

        fn clear_watch(&self, id: WatchId) {
            self.cleared.lock().unwrap().push(id);
        }
    }

    struct FakeIp {
        answer: Option<GeoPoint>,
        calls: Mutex<u32>,
    }

    impl FakeIp {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                answer: Some(GeoPoint::new_unchecked(27.33, 88.61)),
                calls: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl IpLocator for FakeIp {
        async fn locate(&self) -> crate::Result<UserLocation> {
            *self.calls.lock().unwrap() += 1;
            match self.answer {
                Some(point) => Ok(UserLocation::new(point, LocationSource::IpFallback)),
                None => Err(DirectionsError::api("geolocate returned 503")),
            }
        }
    }

    fn at(accuracy: f64) -> Position {
        Position::new(27.3389, 88.5583, accuracy)
    }

    fn step(ms: u64, accuracy: f64) -> (Duration, PositionResult<Position>) {
        (Duration::from_millis(ms), Ok(at(accuracy)))
    }

    fn acquirer(device: Option<Arc<FakeDevice>>, ip: Arc<FakeIp>) -> GeolocationAcquirer {
        GeolocationAcquirer::new(
            device.map(|d| d as Arc<dyn PositionSource>),
            ip,
            GeolocationConfig::default(),
        )
    }

    fn accuracy_of(snapshot: &AcquisitionSnapshot) -> Option<f64> {
        snapshot.location.as_ref().and_then(|l| l.accuracy_meters)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hysteresis_keeps_quick_fix_until_real_improvement() {
        let device = Arc::new(FakeDevice::new(
            Ok(at(200.0)),
            vec![step(500, 196.0), step(500, 150.0), step(500, 148.0)],
        ));
        let ip = FakeIp::ok();
        let acquirer = acquirer(Some(device.clone()), ip.clone());
        let mut updates = acquirer.subscribe();

        let running = acquirer.acquire();
        tokio::pin!(running);

        // quick fix published before refinement ends
        let quick = loop {
            tokio::select! {
                _ = &mut running => panic!("acquisition finished before quick fix was observed"),
                changed = updates.changed() => {
                    changed.unwrap();
                    let snapshot = updates.borrow_and_update().clone();
                    if snapshot.location.is_some() {
                        break snapshot;
                    }
                }
            }
        };
        assert_eq!(accuracy_of(&quick), Some(200.0));
        assert_eq!(quick.location.as_ref().unwrap().source, LocationSource::QuickFix);

        let done = running.await.unwrap();
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(accuracy_of(&done), Some(150.0));
        assert_eq!(done.location.unwrap().source, LocationSource::Refined);
        assert_eq!(device.cleared(), vec![WatchId(7)]);
        assert_eq!(ip.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_cleared_once_target_accuracy_reached() {
        let device = Arc::new(FakeDevice::new(
            Ok(at(120.0)),
            vec![step(200, 60.0), step(200, 20.0), step(200, 5.0)],
        ));
        let acquirer = acquirer(Some(device.clone()), FakeIp::ok());

        let started = Instant::now();
        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(accuracy_of(&done), Some(20.0));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(device.cleared(), vec![WatchId(7)]);

        // the subscription is gone, later readings cannot reach the state
        assert!(!device.late_update(at(3.0)));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(acquirer.snapshot(), done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refinement_window_bounds_the_watch() {
        let device = Arc::new(FakeDevice::new(Ok(at(300.0)), vec![step(1_000, 90.0), step(20_000, 10.0)]));
        let acquirer = acquirer(Some(device.clone()), FakeIp::ok());

        let started = Instant::now();
        let done = acquirer.acquire().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(accuracy_of(&done), Some(90.0));
        assert!(elapsed >= Duration::from_secs(8), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(9), "{elapsed:?}");
        assert_eq!(device.cleared(), vec![WatchId(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_watch_subscription_is_bounded() {
        let mut device = FakeDevice::new(Ok(at(300.0)), vec![step(100, 10.0)]);
        device.watch_delay = Duration::from_secs(60);
        let device = Arc::new(device);
        let ip = FakeIp::ok();
        let acquirer = acquirer(Some(device.clone()), ip.clone());

        let started = Instant::now();
        let done = acquirer.acquire().await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed <= Duration::from_secs(10), "{elapsed:?}");
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(accuracy_of(&done), Some(300.0));
        assert!(device.cleared().is_empty());
        assert_eq!(ip.calls(), 0);
        assert!(!acquirer.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accurate_quick_fix_skips_watch() {
        let device = Arc::new(FakeDevice::new(Ok(at(15.0)), vec![step(100, 5.0)]));
        let acquirer = acquirer(Some(device.clone()), FakeIp::ok());

        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(accuracy_of(&done), Some(15.0));
        assert!(device.cleared().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_fix_timeout_then_watch_fix() {
        let device = FakeDevice::new(Ok(at(50.0)), vec![step(100, 400.0)]);
        *device.quick.lock().unwrap() = Some((Duration::from_secs(10), Ok(at(50.0))));
        let device = Arc::new(device);
        let ip = FakeIp::ok();
        let acquirer = acquirer(Some(device.clone()), ip.clone());

        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(accuracy_of(&done), Some(400.0));
        assert_eq!(ip.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_falls_back_to_ip() {
        let denied = PositionError::new(PositionErrorCode::PermissionDenied, "denied");
        let mut device = FakeDevice::new(Err(denied.clone()), Vec::new());
        device.watch_error = Some(denied);
        let device = Arc::new(device);
        let ip = FakeIp::ok();
        let acquirer = acquirer(Some(device), ip.clone());

        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.state, AcquisitionState::Settled);
        assert_eq!(done.location.unwrap().source, LocationSource::IpFallback);
        assert_eq!(ip.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_surfaces_when_fallback_fails() {
        let denied = PositionError::new(PositionErrorCode::PermissionDenied, "denied");
        let device = Arc::new(FakeDevice::new(
            Err(denied.clone()),
            vec![(Duration::from_millis(10), Err(denied))],
        ));
        let acquirer = acquirer(Some(device.clone()), FakeIp::failing());

        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.state, AcquisitionState::Failed);
        assert_eq!(done.failure, Some(GeolocationFailure::PermissionDenied));
        assert!(done.message.unwrap().contains("permission denied"));
        assert!(done.location.is_none());
        assert_eq!(device.cleared(), vec![WatchId(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_snapshot_serializes() {
        let denied = PositionError::new(PositionErrorCode::PermissionDenied, "denied");
        let mut device = FakeDevice::new(Err(denied.clone()), Vec::new());
        device.watch_error = Some(denied);
        let acquirer = acquirer(Some(Arc::new(device)), FakeIp::failing());

        let done = acquirer.acquire().await.unwrap();
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["failure"], "permission_denied");
        assert_eq!(json["location"], serde_json::Value::Null);
        assert!(json["message"].as_str().unwrap().contains("permission denied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_when_unavailable() {
        let unavailable = PositionError::new(PositionErrorCode::PositionUnavailable, "no signal");
        let mut device = FakeDevice::new(Err(unavailable.clone()), Vec::new());
        device.watch_error = Some(unavailable);
        let acquirer = acquirer(Some(Arc::new(device)), FakeIp::failing());

        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.failure, Some(GeolocationFailure::Unavailable));
        assert_eq!(done.message.as_deref(), Some("Could not determine your location."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_positioning_goes_straight_to_ip() {
        let ip = FakeIp::ok();
        let acquirer = acquirer(None, ip.clone());
        let done = acquirer.acquire().await.unwrap();
        assert_eq!(done.location.unwrap().source, LocationSource::IpFallback);
        assert_eq!(ip.calls(), 1);

        let mut device = FakeDevice::new(Ok(at(10.0)), Vec::new());
        device.available = false;
        let ip = FakeIp::ok();
        let acquirer = self::acquirer(Some(Arc::new(device)), ip.clone());
        acquirer.acquire().await.unwrap();
        assert_eq!(ip.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_acquire_is_a_no_op() {
        let device = Arc::new(FakeDevice::new(Ok(at(200.0)), vec![step(1_000, 20.0)]));
        let acquirer = acquirer(Some(device), FakeIp::ok());

        let (first, second) = tokio::join!(acquirer.acquire(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            acquirer.acquire().await
        });

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(!acquirer.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_to_idle() {
        let acquirer = acquirer(None, FakeIp::ok());
        acquirer.acquire().await.unwrap();
        acquirer.clear();
        assert_eq!(acquirer.snapshot(), AcquisitionSnapshot::idle());
    }
}
