//! Adaptive modes: the strategies that compute target brightness/contrast.
//!
//! Each mode is a pure function of (display limits, current external signal,
//! stored per-display offsets) → (brightness, contrast).  The external
//! signal arrives in an [`AdaptEnv`] snapshot the engine assembles per
//! adaptation pass, so the modes themselves never reach into the display
//! map or the clock.
//!
//! Availability is dynamic and probed, never assumed: a sensor can be
//! unplugged, the source display can disconnect, coordinates can be missing.
//! The mode watchdog re-resolves on that signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lux_core::{
    compute_from_percent, domain::solar, DaylightCurve, DisplayRecord, ModeKey,
};
use tracing::debug;

use crate::infrastructure::location::LocationProvider;
use crate::infrastructure::sensor::{lux_to_percent, AmbientSensor};

/// Brightness/contrast levels of the Sync source display, as percent
/// positions within the source's own ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceLevels {
    pub brightness_percent: f64,
    pub contrast_percent: f64,
}

/// Snapshot of the external signals a mode may consume.
#[derive(Debug, Clone)]
pub struct AdaptEnv {
    pub now: DateTime<Utc>,
    /// Levels of the designated source display, when one is active.
    pub source: Option<SourceLevels>,
    /// Last-write-wins offset from the focused application exception.
    pub app_brightness_offset: i64,
    pub app_contrast_offset: i64,
}

impl Default for AdaptEnv {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            source: None,
            app_brightness_offset: 0,
            app_contrast_offset: 0,
        }
    }
}

/// A computed target for one display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub brightness: i64,
    pub contrast: i64,
}

/// One brightness-computation strategy.
#[async_trait]
pub trait AdaptiveMode: Send + Sync {
    fn key(&self) -> ModeKey;

    /// Whether the mode's external signal is currently reachable.
    async fn available(&self, env: &AdaptEnv) -> bool;

    /// Target values for `display`, or `None` when the mode has nothing to
    /// apply (Manual) or its signal is momentarily missing.
    async fn compute(&self, display: &DisplayRecord, env: &AdaptEnv) -> Option<Adjustment>;

    /// The mode's raw input signal rounded to an integer, recorded as the
    /// source half of user learning data points.
    async fn signal_value(&self, env: &AdaptEnv) -> Option<i64> {
        let _ = env;
        None
    }

    /// Subscription hook run when the mode becomes active.
    async fn start_watching(&self) {}

    /// Subscription hook run when the mode is deactivated.
    async fn stop_watching(&self) {}
}

fn scaled(display: &DisplayRecord, percent: f64, env: &AdaptEnv) -> Adjustment {
    Adjustment {
        brightness: compute_from_percent(
            percent,
            display.min_brightness,
            display.max_brightness,
            display.brightness_offset + env.app_brightness_offset,
        ),
        contrast: compute_from_percent(
            percent,
            display.min_contrast,
            display.max_contrast,
            display.contrast_offset + env.app_contrast_offset,
        ),
    }
}

// ── Manual ────────────────────────────────────────────────────────────────────

/// Direct user-driven values.  Always available; adaptation is a no-op.
pub struct ManualMode;

#[async_trait]
impl AdaptiveMode for ManualMode {
    fn key(&self) -> ModeKey {
        ModeKey::Manual
    }

    async fn available(&self, _env: &AdaptEnv) -> bool {
        true
    }

    async fn compute(&self, _display: &DisplayRecord, _env: &AdaptEnv) -> Option<Adjustment> {
        None
    }
}

// ── Sync ──────────────────────────────────────────────────────────────────────

/// Mirrors the designated source display: its percent position within its
/// own range, rescaled into each target's range, brightness and contrast
/// independently.
pub struct SyncMode;

#[async_trait]
impl AdaptiveMode for SyncMode {
    fn key(&self) -> ModeKey {
        ModeKey::Sync
    }

    async fn available(&self, env: &AdaptEnv) -> bool {
        env.source.is_some()
    }

    async fn compute(&self, display: &DisplayRecord, env: &AdaptEnv) -> Option<Adjustment> {
        let source = env.source.as_ref()?;
        Some(Adjustment {
            brightness: compute_from_percent(
                source.brightness_percent,
                display.min_brightness,
                display.max_brightness,
                display.brightness_offset + env.app_brightness_offset,
            ),
            contrast: compute_from_percent(
                source.contrast_percent,
                display.min_contrast,
                display.max_contrast,
                display.contrast_offset + env.app_contrast_offset,
            ),
        })
    }

    async fn signal_value(&self, env: &AdaptEnv) -> Option<i64> {
        env.source
            .as_ref()
            .map(|s| s.brightness_percent.round() as i64)
    }
}

// ── Location ──────────────────────────────────────────────────────────────────

/// Solar-position curve at the user's coordinates.
pub struct LocationMode {
    provider: Arc<dyn LocationProvider>,
    curve: DaylightCurve,
}

impl LocationMode {
    pub fn new(provider: Arc<dyn LocationProvider>, curve: DaylightCurve) -> Self {
        Self { provider, curve }
    }

    fn percent(&self, env: &AdaptEnv) -> Option<f64> {
        let coords = self.provider.coordinates()?;
        Some(solar::daylight_percent(coords, &self.curve, env.now))
    }

    /// The 24-point hourly curve for the given date, for preview surfaces.
    pub fn hourly_preview(&self, date: chrono::NaiveDate) -> Option<[f64; 24]> {
        let coords = self.provider.coordinates()?;
        Some(solar::hourly_samples(coords, &self.curve, date))
    }
}

#[async_trait]
impl AdaptiveMode for LocationMode {
    fn key(&self) -> ModeKey {
        ModeKey::Location
    }

    async fn available(&self, _env: &AdaptEnv) -> bool {
        self.provider.coordinates().is_some()
    }

    async fn compute(&self, display: &DisplayRecord, env: &AdaptEnv) -> Option<Adjustment> {
        Some(scaled(display, self.percent(env)?, env))
    }

    async fn signal_value(&self, env: &AdaptEnv) -> Option<i64> {
        self.percent(env).map(|p| p.round() as i64)
    }
}

// ── Sensor ────────────────────────────────────────────────────────────────────

/// Ambient light sensor over a serial/USB link.
pub struct SensorMode {
    sensor: Arc<dyn AmbientSensor>,
    max_lux: f64,
    watching: AtomicBool,
}

impl SensorMode {
    pub fn new(sensor: Arc<dyn AmbientSensor>, max_lux: f64) -> Self {
        Self {
            sensor,
            max_lux,
            watching: AtomicBool::new(false),
        }
    }

    async fn percent(&self) -> Option<f64> {
        let reading = self.sensor.current_value().await.ok()?;
        Some(lux_to_percent(reading.lux, self.max_lux))
    }
}

#[async_trait]
impl AdaptiveMode for SensorMode {
    fn key(&self) -> ModeKey {
        ModeKey::Sensor
    }

    async fn available(&self, _env: &AdaptEnv) -> bool {
        self.sensor.is_available().await
    }

    async fn compute(&self, display: &DisplayRecord, env: &AdaptEnv) -> Option<Adjustment> {
        Some(scaled(display, self.percent().await?, env))
    }

    async fn signal_value(&self, env: &AdaptEnv) -> Option<i64> {
        let _ = env;
        self.percent().await.map(|p| p.round() as i64)
    }

    async fn start_watching(&self) {
        self.watching.store(true, Ordering::SeqCst);
        debug!("sensor polling subscription active");
    }

    async fn stop_watching(&self) {
        self.watching.store(false, Ordering::SeqCst);
        debug!("sensor polling subscription released");
    }
}

// ── Mode set ──────────────────────────────────────────────────────────────────

/// All four modes, constructed once with their collaborators.
pub struct ModeSet {
    manual: ManualMode,
    sync: SyncMode,
    location: LocationMode,
    sensor: SensorMode,
}

impl ModeSet {
    pub fn new(
        sensor: Arc<dyn AmbientSensor>,
        location: Arc<dyn LocationProvider>,
        curve: DaylightCurve,
        max_lux: f64,
    ) -> Self {
        Self {
            manual: ManualMode,
            sync: SyncMode,
            location: LocationMode::new(location, curve),
            sensor: SensorMode::new(sensor, max_lux),
        }
    }

    pub fn get(&self, key: ModeKey) -> &dyn AdaptiveMode {
        match key {
            ModeKey::Manual => &self.manual,
            ModeKey::Sync => &self.sync,
            ModeKey::Location => &self.location,
            ModeKey::Sensor => &self.sensor,
        }
    }

    /// Automatic resolution: first available of Sensor, Sync, Location;
    /// Manual is the guaranteed fallback.
    pub async fn auto_resolve(&self, env: &AdaptEnv) -> ModeKey {
        for key in ModeKey::AUTO_RESOLUTION_ORDER {
            if self.get(key).available(env).await {
                return key;
            }
        }
        ModeKey::Manual
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::location::StaticLocation;
    use crate::infrastructure::sensor::MockSensor;
    use lux_core::Coordinates;

    fn display(min_b: i64, max_b: i64) -> DisplayRecord {
        let mut record = DisplayRecord::new(1, "s", "d");
        record.min_brightness = min_b;
        record.max_brightness = max_b;
        record
    }

    fn env_with_source(brightness_percent: f64) -> AdaptEnv {
        AdaptEnv {
            source: Some(SourceLevels {
                brightness_percent,
                contrast_percent: brightness_percent,
            }),
            ..AdaptEnv::default()
        }
    }

    fn mode_set(sensor: Arc<MockSensor>, coords: Option<Coordinates>) -> ModeSet {
        ModeSet::new(
            sensor,
            Arc::new(StaticLocation::new(coords)),
            DaylightCurve::default(),
            2000.0,
        )
    }

    #[tokio::test]
    async fn test_sync_midpoint_maps_to_midpoint_of_target_range() {
        // Source at 50% of its [0,100] range, target range [10,90].
        let record = display(10, 90);
        let adjustment = SyncMode
            .compute(&record, &env_with_source(50.0))
            .await
            .expect("source present");
        assert_eq!(adjustment.brightness, 50);
    }

    #[tokio::test]
    async fn test_sync_applies_stored_and_app_offsets() {
        let mut record = display(0, 100);
        record.brightness_offset = 10;
        let mut env = env_with_source(50.0);
        env.app_brightness_offset = -5;
        let adjustment = SyncMode.compute(&record, &env).await.unwrap();
        assert_eq!(adjustment.brightness, 55);
    }

    #[tokio::test]
    async fn test_sync_unavailable_without_source() {
        assert!(!SyncMode.available(&AdaptEnv::default()).await);
        assert!(SyncMode
            .compute(&display(0, 100), &AdaptEnv::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_manual_compute_is_a_no_op() {
        assert!(ManualMode
            .compute(&display(0, 100), &env_with_source(50.0))
            .await
            .is_none());
        assert!(ManualMode.available(&AdaptEnv::default()).await);
    }

    #[tokio::test]
    async fn test_sensor_mode_maps_lux_through_display_range() {
        let sensor = Arc::new(MockSensor::new());
        sensor.set_lux(Some(1000.0)); // 50% of max_lux 2000
        let mode = SensorMode::new(sensor, 2000.0);
        let adjustment = mode
            .compute(&display(20, 80), &AdaptEnv::default())
            .await
            .unwrap();
        assert_eq!(adjustment.brightness, 50);
    }

    #[tokio::test]
    async fn test_sensor_mode_unplugged_is_unavailable_and_computes_nothing() {
        let sensor = Arc::new(MockSensor::new());
        let mode = SensorMode::new(sensor, 2000.0);
        assert!(!mode.available(&AdaptEnv::default()).await);
        assert!(mode
            .compute(&display(0, 100), &AdaptEnv::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_auto_resolve_prefers_sensor_then_sync_then_location() {
        let sensor = Arc::new(MockSensor::new());
        let coords = Some(Coordinates {
            latitude: 44.0,
            longitude: 26.0,
        });
        let set = mode_set(Arc::clone(&sensor), coords);

        // Sensor unavailable, Sync available, Location available → Sync.
        let env = env_with_source(50.0);
        assert_eq!(set.auto_resolve(&env).await, ModeKey::Sync);

        // Sensor plugged in → Sensor wins.
        sensor.set_lux(Some(100.0));
        assert_eq!(set.auto_resolve(&env).await, ModeKey::Sensor);
    }

    #[tokio::test]
    async fn test_auto_resolve_falls_back_to_location_then_manual() {
        let sensor = Arc::new(MockSensor::new());
        let coords = Some(Coordinates {
            latitude: 44.0,
            longitude: 26.0,
        });
        let set = mode_set(Arc::clone(&sensor), coords);

        // No sensor, no source → Location.
        assert_eq!(set.auto_resolve(&AdaptEnv::default()).await, ModeKey::Location);

        // No coordinates either → Manual.
        let bare = mode_set(Arc::new(MockSensor::new()), None);
        assert_eq!(bare.auto_resolve(&AdaptEnv::default()).await, ModeKey::Manual);
    }
}
