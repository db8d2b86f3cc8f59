//! Software gamma fallback channel.
//!
//! When every hardware channel is unavailable or unresponsive, brightness
//! and contrast are approximated by scaling the compositor's gamma ramp:
//! brightness scales pixel output linearly, contrast bends the transfer
//! curve.  Lower fidelity than a backlight, but it always exists — which is
//! why this channel is the guaranteed fallback and can never itself be
//! unresponsive.
//!
//! The compositor hook is behind [`GammaSink`]; the daemon wires in a real
//! sink where one is available and a logging sink otherwise.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use lux_core::{percent_of, Capability, DisplayId, DisplayRecord};
use tracing::debug;

use super::{Command, ControlBackend, ControlError};

/// Number of entries in a generated ramp.
pub const RAMP_SIZE: usize = 256;

/// A gamma ramp for one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaRamp {
    /// Identity ramp (no scaling).
    pub fn identity(size: usize) -> Self {
        Self::build(size, 100.0, 50.0)
    }

    /// Builds a ramp for the given brightness/contrast percentages.
    ///
    /// Brightness scales the output linearly; contrast maps 0–100% onto a
    /// transfer-curve exponent in `[1.5, 0.5]` (50% = identity).
    pub fn build(size: usize, brightness_percent: f64, contrast_percent: f64) -> Self {
        let scale = (brightness_percent / 100.0).clamp(0.0, 1.0);
        let exponent = (1.5 - contrast_percent / 100.0).clamp(0.5, 1.5);
        let channel: Vec<u16> = (0..size)
            .map(|i| {
                let input = i as f64 / (size.saturating_sub(1).max(1)) as f64;
                let output = input.powf(exponent) * scale;
                (output * f64::from(u16::MAX)).round() as u16
            })
            .collect();
        Self {
            red: channel.clone(),
            green: channel.clone(),
            blue: channel,
        }
    }
}

/// Compositor seam that applies a ramp to a display.
pub trait GammaSink: Send + Sync {
    fn apply_ramp(&self, display: DisplayId, ramp: &GammaRamp) -> Result<(), ControlError>;
}

/// Sink for headless deployments: logs and succeeds.
pub struct LoggingGammaSink;

impl GammaSink for LoggingGammaSink {
    fn apply_ramp(&self, display_id: DisplayId, _ramp: &GammaRamp) -> Result<(), ControlError> {
        debug!(display = display_id, "gamma ramp applied (logging sink)");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct GammaState {
    brightness: i64,
    contrast: i64,
}

/// The software gamma control backend.
pub struct GammaControl {
    sink: Box<dyn GammaSink>,
    state: Mutex<HashMap<DisplayId, GammaState>>,
}

impl GammaControl {
    pub fn new(sink: Box<dyn GammaSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn state_for(&self, display: &DisplayRecord) -> GammaState {
        self.state
            .lock()
            .expect("lock poisoned")
            .get(&display.id)
            .copied()
            .unwrap_or(GammaState {
                brightness: display.brightness,
                contrast: display.contrast,
            })
    }

    fn apply(&self, display: &DisplayRecord, state: GammaState) -> Result<(), ControlError> {
        let brightness_percent =
            percent_of(state.brightness, display.min_brightness, display.max_brightness);
        let contrast_percent =
            percent_of(state.contrast, display.min_contrast, display.max_contrast);
        let ramp = GammaRamp::build(RAMP_SIZE, brightness_percent, contrast_percent);
        self.sink.apply_ramp(display.id, &ramp)?;
        self.state
            .lock()
            .expect("lock poisoned")
            .insert(display.id, state);
        Ok(())
    }

}

#[async_trait]
impl ControlBackend for GammaControl {
    fn kind(&self) -> Capability {
        Capability::Gamma
    }

    async fn exists(&self, _display: &DisplayRecord) -> bool {
        true
    }

    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError> {
        let state = self.state_for(display);
        match command {
            Command::Brightness => Ok(state.brightness),
            Command::Contrast => Ok(state.contrast),
            other => Err(ControlError::Unsupported(other)),
        }
    }

    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError> {
        let mut state = self.state_for(display);
        match command {
            Command::Brightness => state.brightness = value,
            Command::Contrast => state.contrast = value,
            other => return Err(ControlError::Unsupported(other)),
        }
        self.apply(display, state)
    }

    async fn is_responsive(&self, _display: &DisplayRecord) -> bool {
        true
    }

    async fn reset_state(&self, display: &DisplayRecord) -> Result<(), ControlError> {
        self.sink.apply_ramp(display.id, &GammaRamp::identity(RAMP_SIZE))?;
        self.state.lock().expect("lock poisoned").remove(&display.id);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Records every ramp applied.
    #[derive(Default)]
    struct RecordingSink {
        ramps: Arc<Mutex<Vec<(DisplayId, GammaRamp)>>>,
    }

    impl GammaSink for RecordingSink {
        fn apply_ramp(&self, display: DisplayId, ramp: &GammaRamp) -> Result<(), ControlError> {
            self.ramps
                .lock()
                .unwrap()
                .push((display, ramp.clone()));
            Ok(())
        }
    }

    #[test]
    fn test_ramp_full_brightness_identity_contrast_is_linear() {
        let ramp = GammaRamp::build(RAMP_SIZE, 100.0, 50.0);
        assert_eq!(ramp.red[0], 0);
        assert_eq!(ramp.red[RAMP_SIZE - 1], u16::MAX);
        // Monotonic.
        assert!(ramp.red.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_ramp_half_brightness_halves_peak_output() {
        let ramp = GammaRamp::build(RAMP_SIZE, 50.0, 50.0);
        let peak = ramp.red[RAMP_SIZE - 1];
        assert!((i64::from(peak) - i64::from(u16::MAX) / 2).abs() <= 1);
    }

    #[tokio::test]
    async fn test_gamma_is_always_responsive_and_existing() {
        let control = GammaControl::new(Box::new(LoggingGammaSink));
        let record = DisplayRecord::new(1, "s", "d");
        assert!(control.exists(&record).await);
        assert!(control.is_responsive(&record).await);
    }

    #[tokio::test]
    async fn test_gamma_write_applies_ramp_and_read_returns_value() {
        let sink = RecordingSink::default();
        let ramps = Arc::clone(&sink.ramps);
        let control = GammaControl::new(Box::new(sink));
        let record = DisplayRecord::new(1, "s", "d");

        control.write(&record, Command::Brightness, 30).await.unwrap();

        assert_eq!(ramps.lock().unwrap().len(), 1);
        assert_eq!(
            control.read(&record, Command::Brightness).await.unwrap(),
            30
        );
    }

    #[tokio::test]
    async fn test_gamma_reset_applies_identity_ramp() {
        let sink = RecordingSink::default();
        let ramps = Arc::clone(&sink.ramps);
        let control = GammaControl::new(Box::new(sink));
        let record = DisplayRecord::new(1, "s", "d");

        control.write(&record, Command::Brightness, 30).await.unwrap();
        control.reset_state(&record).await.unwrap();

        let applied = ramps.lock().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].1, GammaRamp::identity(RAMP_SIZE));
    }

    #[tokio::test]
    async fn test_gamma_rejects_volume_commands() {
        let control = GammaControl::new(Box::new(LoggingGammaSink));
        let record = DisplayRecord::new(1, "s", "d");
        assert!(matches!(
            control.write(&record, Command::Volume, 10).await,
            Err(ControlError::Unsupported(Command::Volume))
        ));
    }
}
