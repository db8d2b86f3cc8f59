//! The adaptive engine: the single context object that owns the active
//! display set, the mode state machine, and every public operation the
//! UI/CLI/hotkey callers invoke.
//!
//! # Ownership
//!
//! [`EngineContext`] replaces process-level globals with one explicitly
//! initialised object handed to watchdog tasks by `Arc`.  Shared state rules:
//!
//! - the active-display map is mutated only through the registry and the
//!   engine's own operations, behind one `RwLock`;
//! - each per-display field has one logical writer at a time (the engine for
//!   values, the capability-toggle path for flags);
//! - mode transitions serialize through the `mode_state` mutex.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use lux_core::{
    cap, compute_from_percent, filled_chiclet_value, levenshtein, AppException, Capability,
    DaylightCurve, DisplayId, DisplayRecord, ModeKey,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::application::modes::{AdaptEnv, Adjustment, ModeSet, SourceLevels};
use crate::application::watchdog::WatchdogTasks;
use crate::infrastructure::control::{BackendSet, Command};
use crate::infrastructure::enumeration::DisplayEnumerator;
use crate::infrastructure::location::LocationProvider;
use crate::infrastructure::prompt::Prompter;
use crate::infrastructure::sensor::AmbientSensor;
use crate::infrastructure::storage::config::AppConfig;
use crate::infrastructure::storage::datastore::Datastore;

pub const MIN_VOLUME: i64 = 0;
pub const MAX_VOLUME: i64 = 100;

/// Error type for capability toggling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    /// The last enabled channel cannot be disabled; gamma was re-enabled.
    #[error("at least one control channel must stay enabled; gamma fallback re-enabled")]
    LastControl,
    #[error("unknown display {0}")]
    UnknownDisplay(DisplayId),
}

/// Engine behaviour settings, extracted from the persisted [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub override_adaptive_mode: bool,
    pub adaptive_mode: ModeKey,
    pub include_virtual_displays: bool,
    pub clamshell_detection: bool,
    pub curve: DaylightCurve,
    pub max_lux: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            override_adaptive_mode: false,
            adaptive_mode: ModeKey::Manual,
            include_virtual_displays: false,
            clamshell_detection: true,
            curve: DaylightCurve::default(),
            max_lux: 2000.0,
        }
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            override_adaptive_mode: config.engine.override_adaptive_mode,
            adaptive_mode: config.engine.adaptive_mode,
            include_virtual_displays: config.engine.include_virtual_displays,
            clamshell_detection: config.engine.clamshell_detection,
            curve: DaylightCurve {
                noon_duration_minutes: config.location.noon_duration_minutes,
                daylight_extension_minutes: config.location.daylight_extension_minutes,
                curve_factor: config.location.curve_factor,
            },
            max_lux: config.sensor.max_lux,
        }
    }
}

/// Pointer/main-display lookup seam.
pub trait ScreenTopology: Send + Sync {
    fn display_under_pointer(&self) -> Option<DisplayId> {
        None
    }
    fn main_display(&self) -> Option<DisplayId> {
        None
    }
}

/// Topology for headless deployments: no pointer, no main display.
pub struct NullTopology;

impl ScreenTopology for NullTopology {}

/// Fixed-answer topology for tests.
#[derive(Default)]
pub struct StaticTopology {
    pub pointer: Option<DisplayId>,
    pub main: Option<DisplayId>,
}

impl ScreenTopology for StaticTopology {
    fn display_under_pointer(&self) -> Option<DisplayId> {
        self.pointer
    }
    fn main_display(&self) -> Option<DisplayId> {
        self.main
    }
}

/// Default audio output device lookup seam.
pub trait AudioDeviceProvider: Send + Sync {
    fn default_output_name(&self) -> Option<String>;
}

/// No audio device resolution.
pub struct NoAudio;

impl AudioDeviceProvider for NoAudio {
    fn default_output_name(&self) -> Option<String> {
        None
    }
}

/// Fixed audio device name for tests.
pub struct StaticAudio(pub Option<String>);

impl AudioDeviceProvider for StaticAudio {
    fn default_output_name(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Every injected collaborator the engine talks to.
pub struct Collaborators {
    pub datastore: Arc<dyn Datastore>,
    pub enumerator: Arc<dyn DisplayEnumerator>,
    pub backends: Arc<BackendSet>,
    pub sensor: Arc<dyn AmbientSensor>,
    pub location: Arc<dyn LocationProvider>,
    pub prompter: Arc<dyn Prompter>,
    pub topology: Arc<dyn ScreenTopology>,
    pub audio: Arc<dyn AudioDeviceProvider>,
}

/// Mode state machine bookkeeping.
#[derive(Debug)]
pub struct ModeState {
    pub current: ModeKey,
    /// Remembered for resume-after-disable.
    pub last_non_manual: ModeKey,
    /// Whether the last disable interrupted automatic resolution.
    pub last_mode_was_auto: bool,
    /// `true` while the user has pinned a mode.
    pub override_mode: bool,
}

/// The engine context.
pub struct EngineContext {
    pub config: EngineConfig,
    pub collaborators: Collaborators,
    pub modes: ModeSet,
    pub displays: RwLock<HashMap<DisplayId, DisplayRecord>>,
    pub mode_state: Mutex<ModeState>,
    pub running_app_exceptions: Mutex<Vec<AppException>>,
    /// Last fallback prompt per display id, for the 20-minute cooldown.
    pub fallback_prompt_times: Mutex<HashMap<DisplayId, Instant>>,
    /// Displays with a fallback prompt currently awaiting an answer.
    pub prompts_in_flight: Mutex<HashSet<DisplayId>>,
    pub screens_sleeping: AtomicBool,
    pub clamshell_mode: AtomicBool,
    pub watchdogs: std::sync::Mutex<WatchdogTasks>,
}

impl EngineContext {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Arc<Self> {
        let modes = ModeSet::new(
            Arc::clone(&collaborators.sensor),
            Arc::clone(&collaborators.location),
            config.curve,
            config.max_lux,
        );
        let mode_state = ModeState {
            current: ModeKey::Manual,
            last_non_manual: if config.adaptive_mode.is_automatic() {
                config.adaptive_mode
            } else {
                ModeKey::Sync
            },
            last_mode_was_auto: !config.override_adaptive_mode,
            override_mode: config.override_adaptive_mode,
        };
        Arc::new(Self {
            config,
            collaborators,
            modes,
            displays: RwLock::new(HashMap::new()),
            mode_state: Mutex::new(mode_state),
            running_app_exceptions: Mutex::new(Vec::new()),
            fallback_prompt_times: Mutex::new(HashMap::new()),
            prompts_in_flight: Mutex::new(HashSet::new()),
            screens_sleeping: AtomicBool::new(false),
            clamshell_mode: AtomicBool::new(false),
            watchdogs: std::sync::Mutex::new(WatchdogTasks::default()),
        })
    }

    /// Enumerates displays, resolves the startup mode, and runs the first
    /// forced adaptation pass.
    pub async fn initialize(self: &Arc<Self>) {
        let count = crate::application::registry::refresh(self).await;
        info!(count, "display enumeration complete");

        let env = self.adapt_env().await;
        let initial = {
            let state = self.mode_state.lock().await;
            if state.override_mode {
                state.current_or(self.config.adaptive_mode)
            } else {
                self.modes.auto_resolve(&env).await
            }
        };
        self.transition_to(initial, true).await;
        self.adapt_all(true).await;
    }

    // ── Mode state machine ────────────────────────────────────────────────────

    /// Currently active mode key.
    pub async fn current_mode(&self) -> ModeKey {
        self.mode_state.lock().await.current
    }

    /// Transitions to `key`, running the outgoing mode's stop hook and the
    /// incoming mode's start hook.  `initial` forces the start hook even when
    /// the key does not change.
    pub(crate) async fn transition_to(&self, key: ModeKey, initial: bool) {
        {
            let mut state = self.mode_state.lock().await;
            if state.current == key && !initial {
                return;
            }
            if state.current != key {
                self.modes.get(state.current).stop_watching().await;
                if state.current.is_automatic() {
                    state.last_non_manual = state.current;
                }
            }
            state.current = key;
        }
        self.modes.get(key).start_watching().await;
        info!(mode = %key, "adaptive mode active");
    }

    /// Forces Manual and remembers whether automatic resolution was running.
    pub async fn disable(&self) {
        let was = self.current_mode().await;
        if was != ModeKey::Manual {
            self.transition_to(ModeKey::Manual, false).await;
        }
        {
            let mut state = self.mode_state.lock().await;
            if !state.override_mode {
                state.last_mode_was_auto = true;
                state.override_mode = true;
            }
        }
        self.adapt_all(true).await;
    }

    /// Restores an explicit mode, the last automatic resolution, or the last
    /// non-Manual mode if still available, else resolves automatically.
    pub async fn enable(&self, mode: Option<ModeKey>) {
        let env = self.adapt_env().await;
        let key = if let Some(key) = mode {
            key
        } else {
            let (last_was_auto, last_non_manual) = {
                let state = self.mode_state.lock().await;
                (state.last_mode_was_auto, state.last_non_manual)
            };
            if last_was_auto {
                self.mode_state.lock().await.override_mode = false;
                self.modes.auto_resolve(&env).await
            } else if self.modes.get(last_non_manual).available(&env).await {
                last_non_manual
            } else {
                self.modes.auto_resolve(&env).await
            }
        };
        self.transition_to(key, false).await;
        self.adapt_all(true).await;
    }

    /// Disables when automatic, enables when Manual.
    pub async fn toggle(&self) {
        if self.current_mode().await == ModeKey::Manual {
            self.enable(None).await;
        } else {
            self.disable().await;
        }
    }

    /// Mode watchdog tick: re-resolves the mode unless the user pinned one.
    pub async fn auto_adapt_mode(&self) {
        if self.mode_state.lock().await.override_mode {
            return;
        }
        let env = self.adapt_env().await;
        let resolved = self.modes.auto_resolve(&env).await;
        let current = self.current_mode().await;
        if resolved != current {
            info!(from = %current, to = %resolved, "automatic mode re-resolution");
            self.transition_to(resolved, false).await;
            self.adapt_all(false).await;
        }
    }

    // ── Adaptation ────────────────────────────────────────────────────────────

    /// Snapshot of the external signals for one adaptation pass.
    pub async fn adapt_env(&self) -> AdaptEnv {
        let source = {
            let displays = self.displays.read().await;
            displays
                .values()
                .find(|d| d.active && d.is_source)
                .map(|d| SourceLevels {
                    brightness_percent: d.brightness_percent(),
                    contrast_percent: d.contrast_percent(),
                })
        };
        let (app_brightness_offset, app_contrast_offset) = {
            let exceptions = self.running_app_exceptions.lock().await;
            exceptions
                .last()
                .map(|e| (e.brightness, e.contrast))
                .unwrap_or((0, 0))
        };
        AdaptEnv {
            now: Utc::now(),
            source,
            app_brightness_offset,
            app_contrast_offset,
        }
    }

    /// Adapts every eligible active display.  `force` bypasses the
    /// skip-if-unchanged optimization and always issues hardware writes.
    pub async fn adapt_all(&self, force: bool) {
        let key = self.current_mode().await;
        if key == ModeKey::Manual {
            return;
        }
        let env = self.adapt_env().await;
        let mode = self.modes.get(key);
        let mut displays = self.displays.write().await;
        for record in displays.values_mut() {
            if !record.active || !record.adaptive || record.adaptive_paused || record.is_source {
                continue;
            }
            if let Some(adjustment) = mode.compute(record, &env).await {
                self.apply_adjustment(record, &adjustment, force).await;
            }
        }
    }

    /// Adapts a single display.
    pub async fn adapt_display(&self, id: DisplayId, force: bool) {
        let key = self.current_mode().await;
        if key == ModeKey::Manual {
            return;
        }
        let env = self.adapt_env().await;
        let mode = self.modes.get(key);
        let mut displays = self.displays.write().await;
        if let Some(record) = displays.get_mut(&id) {
            if record.active && record.adaptive && !record.adaptive_paused && !record.is_source {
                if let Some(adjustment) = mode.compute(record, &env).await {
                    self.apply_adjustment(record, &adjustment, force).await;
                }
            }
        }
    }

    async fn apply_adjustment(&self, record: &mut DisplayRecord, adjustment: &Adjustment, force: bool) {
        let backend = self.collaborators.backends.select(record).await;
        if force || adjustment.brightness != record.brightness {
            match backend
                .write(record, Command::Brightness, adjustment.brightness)
                .await
            {
                Ok(()) => record.brightness = adjustment.brightness,
                Err(e) => warn!(display = record.id, error = %e, "brightness write failed"),
            }
        }
        if force || adjustment.contrast != record.contrast {
            match backend
                .write(record, Command::Contrast, adjustment.contrast)
                .await
            {
                Ok(()) => record.contrast = adjustment.contrast,
                Err(e) => warn!(display = record.id, error = %e, "contrast write failed"),
            }
        }
    }

    // ── Target resolution ─────────────────────────────────────────────────────

    /// Resolution order when no explicit list is given: audio-matched
    /// display, display under the pointer, OS main display, all active.
    pub async fn resolve_targets(&self, explicit: Option<&[DisplayId]>) -> Vec<DisplayId> {
        let displays = self.displays.read().await;
        let is_active = |id: &DisplayId| displays.get(id).is_some_and(|d| d.active);

        if let Some(ids) = explicit {
            return ids.iter().copied().filter(is_active).collect();
        }
        if let Some(device_name) = self.collaborators.audio.default_output_name() {
            let best = displays
                .values()
                .filter(|d| d.active)
                .min_by_key(|d| levenshtein(&d.name, &device_name));
            if let Some(display) = best {
                return vec![display.id];
            }
        }
        if let Some(id) = self.collaborators.topology.display_under_pointer() {
            if is_active(&id) {
                return vec![id];
            }
        }
        if let Some(id) = self.collaborators.topology.main_display() {
            if is_active(&id) {
                return vec![id];
            }
        }
        displays
            .values()
            .filter(|d| d.active)
            .map(|d| d.id)
            .collect()
    }

    // ── Value operations ──────────────────────────────────────────────────────

    async fn write_value(&self, record: &mut DisplayRecord, command: Command, value: i64) {
        let backend = self.collaborators.backends.select(record).await;
        match backend.write(record, command, value).await {
            Ok(()) => match command {
                Command::Brightness => record.brightness = value,
                Command::Contrast => record.contrast = value,
                Command::Volume => record.volume = value,
                Command::Input => record.input = value as u16,
                Command::Mute => {}
            },
            Err(e) => {
                warn!(display = record.id, ?command, error = %e, "control write failed")
            }
        }
    }

    /// Sets brightness from a percent position within each target's range.
    pub async fn set_brightness_percent(&self, percent: f64, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let value =
                    compute_from_percent(percent, record.min_brightness, record.max_brightness, 0);
                self.write_value(record, Command::Brightness, value).await;
            }
        }
    }

    /// Sets contrast from a percent position within each target's range.
    pub async fn set_contrast_percent(&self, percent: f64, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let value =
                    compute_from_percent(percent, record.min_contrast, record.max_contrast, 0);
                self.write_value(record, Command::Contrast, value).await;
            }
        }
    }

    /// Sets a raw brightness value, clamped to each target's range.
    pub async fn set_brightness(&self, value: i64, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let value = cap(value, record.min_brightness, record.max_brightness);
                self.write_value(record, Command::Brightness, value).await;
            }
        }
    }

    /// Sets a raw contrast value, clamped to each target's range.
    pub async fn set_contrast(&self, value: i64, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let value = cap(value, record.min_contrast, record.max_contrast);
                self.write_value(record, Command::Contrast, value).await;
            }
        }
    }

    /// Steps brightness by a signed offset with filled-chiclet snapping.
    ///
    /// While a non-Manual mode is active, the chosen value is recorded as a
    /// learning data point against the mode's current input signal.
    pub async fn adjust_brightness(&self, offset: i64, targets: Option<&[DisplayId]>) {
        let env = self.adapt_env().await;
        let key = self.current_mode().await;
        let signal = self.modes.get(key).signal_value(&env).await;

        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let stepped = filled_chiclet_value(record.brightness, offset);
                let value = cap(stepped, record.min_brightness, record.max_brightness);
                self.write_value(record, Command::Brightness, value).await;
                if key.is_automatic() {
                    if let Some(signal) = signal {
                        record.insert_brightness_data_point(signal, value);
                    }
                }
            }
        }
    }

    /// Steps contrast by a signed offset with filled-chiclet snapping.
    pub async fn adjust_contrast(&self, offset: i64, targets: Option<&[DisplayId]>) {
        let env = self.adapt_env().await;
        let key = self.current_mode().await;
        let signal = self.modes.get(key).signal_value(&env).await;

        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let stepped = filled_chiclet_value(record.contrast, offset);
                let value = cap(stepped, record.min_contrast, record.max_contrast);
                self.write_value(record, Command::Contrast, value).await;
                if key.is_automatic() {
                    if let Some(signal) = signal {
                        record.insert_contrast_data_point(signal, value);
                    }
                }
            }
        }
    }

    /// Steps volume by a signed offset with filled-chiclet snapping.
    pub async fn adjust_volume(&self, offset: i64, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let stepped = filled_chiclet_value(record.volume, offset);
                let value = cap(stepped, MIN_VOLUME, MAX_VOLUME);
                self.write_value(record, Command::Volume, value).await;
            }
        }
    }

    /// Toggles audio mute on the resolved targets.
    pub async fn toggle_mute(&self, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                let muted = !record.audio_muted;
                let backend = self.collaborators.backends.select(record).await;
                let wire = if muted { 1 } else { 2 };
                match backend.write(record, Command::Mute, wire).await {
                    Ok(()) => record.audio_muted = muted,
                    Err(e) => warn!(display = record.id, error = %e, "mute write failed"),
                }
            }
        }
    }

    /// Re-reads brightness, contrast, volume, and input from each active
    /// display's selected backend.
    pub async fn refresh_all(&self) {
        let mut displays = self.displays.write().await;
        for record in displays.values_mut().filter(|d| d.active) {
            let backend = self.collaborators.backends.select(record).await;
            if let Ok(value) = backend.read(record, Command::Brightness).await {
                record.brightness = value;
            }
            if let Ok(value) = backend.read(record, Command::Contrast).await {
                record.contrast = value;
            }
            if let Ok(value) = backend.read(record, Command::Volume).await {
                record.volume = value;
            }
            if let Ok(value) = backend.read(record, Command::Input).await {
                record.input = value as u16;
            }
        }
    }

    /// Switches the selected input source on the resolved targets.
    pub async fn set_input(&self, input: u16, targets: Option<&[DisplayId]>) {
        let ids = self.resolve_targets(targets).await;
        let mut displays = self.displays.write().await;
        for id in ids {
            if let Some(record) = displays.get_mut(&id) {
                self.write_value(record, Command::Input, i64::from(input)).await;
            }
        }
    }

    // ── Capability toggling ───────────────────────────────────────────────────

    /// Enables/disables one control channel on a display.
    ///
    /// Disabling the last enabled channel is rejected: the gamma fallback is
    /// force-re-enabled instead, so no display is ever left without a
    /// control path.
    pub async fn set_capability(
        &self,
        id: DisplayId,
        capability: Capability,
        enabled: bool,
    ) -> Result<(), CapabilityError> {
        {
            let mut displays = self.displays.write().await;
            let record = displays
                .get_mut(&id)
                .ok_or(CapabilityError::UnknownDisplay(id))?;
            if !enabled
                && record.enabled_controls.enabled_count() == 1
                && record.enabled_controls.get(capability)
            {
                record.enabled_controls.set(Capability::Gamma, true);
                return Err(CapabilityError::LastControl);
            }
            record.enabled_controls.set(capability, enabled);
        }
        self.persist_displays().await;
        Ok(())
    }

    // ── Sync source & per-display flags ───────────────────────────────────────

    /// Designates `id` as the Sync source, clearing the flag everywhere else.
    pub async fn set_sync_source(&self, id: DisplayId) {
        {
            let mut displays = self.displays.write().await;
            for record in displays.values_mut() {
                record.is_source = record.id == id;
            }
        }
        self.persist_displays().await;
        self.adapt_all(false).await;
    }

    /// Enables/disables automatic adjustment for one display.  Re-enabling
    /// clears a per-display pause.
    pub async fn set_adaptive(&self, id: DisplayId, adaptive: bool) {
        {
            let mut displays = self.displays.write().await;
            if let Some(record) = displays.get_mut(&id) {
                if adaptive {
                    record.adaptive_paused = false;
                }
                record.adaptive = adaptive;
            }
        }
        self.persist_displays().await;
        self.adapt_all(false).await;
    }

    /// Pauses/resumes automatic adjustment for one display without touching
    /// the global mode.
    pub async fn set_adaptive_paused(&self, id: DisplayId, paused: bool) {
        {
            let mut displays = self.displays.write().await;
            if let Some(record) = displays.get_mut(&id) {
                record.adaptive_paused = paused;
            }
        }
        self.adapt_all(false).await;
    }

    // ── App exceptions ────────────────────────────────────────────────────────

    /// Replaces the running-app exception list from the full set of running
    /// application identifiers.
    pub async fn update_running_apps(&self, identifiers: &[String]) {
        let exceptions = self
            .collaborators
            .datastore
            .app_exceptions(identifiers)
            .unwrap_or_default();
        *self.running_app_exceptions.lock().await = exceptions;
        self.adapt_all(false).await;
    }

    /// Applies incremental foreground-application changes.  Launched
    /// exceptions move to the end of the list (last-write-wins); terminated
    /// ones are dropped.  Displays on the gamma channel get a forced rewrite
    /// so an external gamma-touching app cannot leave a stale ramp.
    pub async fn handle_app_event(&self, launched: &[String], terminated: &[String]) {
        {
            let mut running = self.running_app_exceptions.lock().await;
            if !launched.is_empty() {
                if let Some(new) = self.collaborators.datastore.app_exceptions(launched) {
                    for exception in new {
                        running.retain(|e| e.identifier != exception.identifier);
                        running.push(exception);
                    }
                }
            }
            if !terminated.is_empty() {
                if let Some(gone) = self.collaborators.datastore.app_exceptions(terminated) {
                    for exception in gone {
                        running.retain(|e| e.identifier != exception.identifier);
                    }
                }
            }
        }

        let gamma_displays: Vec<DisplayRecord> = {
            let displays = self.displays.read().await;
            let mut on_gamma = Vec::new();
            for record in displays.values().filter(|d| d.active) {
                let backend = self.collaborators.backends.select(record).await;
                if backend.kind() == Capability::Gamma {
                    on_gamma.push(record.clone());
                }
            }
            on_gamma
        };
        for record in gamma_displays {
            let gamma = self.collaborators.backends.gamma();
            if let Err(e) = gamma
                .write(&record, Command::Brightness, record.brightness)
                .await
            {
                debug!(display = record.id, error = %e, "gamma rewrite after app event failed");
            }
        }

        self.adapt_all(false).await;
    }

    /// Brightness offset of the most recently focused exception app.
    pub async fn app_brightness_offset(&self) -> i64 {
        self.running_app_exceptions
            .lock()
            .await
            .last()
            .map(|e| e.brightness)
            .unwrap_or(0)
    }

    /// Contrast offset of the most recently focused exception app.
    pub async fn app_contrast_offset(&self) -> i64 {
        self.running_app_exceptions
            .lock()
            .await
            .last()
            .map(|e| e.contrast)
            .unwrap_or(0)
    }

    // ── Clamshell (lid) handling ──────────────────────────────────────────────

    /// Lid-state change.  Closing the lid while Sync mode is active forces
    /// Manual; opening it restores the previous mode.
    pub async fn set_lid_closed(&self, closed: bool) {
        if !self.config.clamshell_detection {
            return;
        }
        info!(closed, "lid state changed");
        if closed {
            if self.current_mode().await == ModeKey::Sync {
                self.clamshell_mode.store(true, Ordering::SeqCst);
                self.disable().await;
            }
        } else if self.clamshell_mode.load(Ordering::SeqCst)
            && self.current_mode().await == ModeKey::Manual
        {
            self.clamshell_mode.store(false, Ordering::SeqCst);
            self.enable(None).await;
        }
    }

    // ── Persistence ───────────────────────────────────────────────────────────

    /// Stores the current record set through the datastore collaborator.
    pub async fn persist_displays(&self) {
        let records: Vec<DisplayRecord> =
            self.displays.read().await.values().cloned().collect();
        self.collaborators.datastore.store_displays(records);
    }
}

impl ModeState {
    fn current_or(&self, fallback: ModeKey) -> ModeKey {
        if self.current == ModeKey::Manual && fallback != ModeKey::Manual {
            fallback
        } else {
            self.current
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::control::gamma::{GammaControl, LoggingGammaSink};
    use crate::infrastructure::enumeration::MockEnumerator;
    use crate::infrastructure::location::StaticLocation;
    use crate::infrastructure::prompt::AutoPrompter;
    use crate::infrastructure::sensor::MockSensor;

    mockall::mock! {
        pub Store {}
        impl Datastore for Store {
            fn displays(&self, serials: &[String]) -> Option<Vec<DisplayRecord>>;
            fn store_displays(&self, displays: Vec<DisplayRecord>) -> Vec<DisplayRecord>;
            fn app_exceptions(&self, identifiers: &[String]) -> Option<Vec<AppException>>;
            fn store_app_exceptions(&self, exceptions: Vec<AppException>);
        }
    }

    fn ctx_with_store(store: MockStore) -> Arc<EngineContext> {
        let collaborators = Collaborators {
            datastore: Arc::new(store),
            enumerator: Arc::new(MockEnumerator::new()),
            backends: Arc::new(BackendSet::new(Arc::new(GammaControl::new(Box::new(
                LoggingGammaSink,
            ))))),
            sensor: Arc::new(MockSensor::new()),
            location: Arc::new(StaticLocation::new(None)),
            prompter: Arc::new(AutoPrompter),
            topology: Arc::new(NullTopology),
            audio: Arc::new(NoAudio),
        };
        EngineContext::new(EngineConfig::default(), collaborators)
    }

    #[tokio::test]
    async fn test_update_running_apps_queries_datastore_with_identifiers() {
        let mut store = MockStore::new();
        store
            .expect_app_exceptions()
            .withf(|identifiers: &[String]| identifiers == ["org.videolan.vlc".to_string()])
            .times(1)
            .returning(|_| {
                Some(vec![AppException {
                    identifier: "org.videolan.vlc".to_string(),
                    name: "VLC".to_string(),
                    brightness: -10,
                    contrast: 0,
                }])
            });
        let ctx = ctx_with_store(store);

        ctx.update_running_apps(&["org.videolan.vlc".to_string()])
            .await;

        assert_eq!(ctx.app_brightness_offset().await, -10);
    }

    #[tokio::test]
    async fn test_missing_app_exceptions_mean_zero_offset() {
        let mut store = MockStore::new();
        store.expect_app_exceptions().returning(|_| None);
        let ctx = ctx_with_store(store);

        ctx.update_running_apps(&["anything".to_string()]).await;

        assert_eq!(ctx.app_brightness_offset().await, 0);
        assert_eq!(ctx.app_contrast_offset().await, 0);
    }

    #[tokio::test]
    async fn test_set_capability_unknown_display_is_rejected() {
        let ctx = ctx_with_store(MockStore::new());
        let result = ctx.set_capability(42, Capability::Ddc, false).await;
        assert_eq!(result, Err(CapabilityError::UnknownDisplay(42)));
    }
}
