//! Control backends: the channels that apply values to a display.
//!
//! One [`ControlBackend`] exists per hardware/software channel: DDC/CI over
//! an i2c-style bus, a network relay, the vendor panel service for
//! directly-attached displays, and the software gamma fallback.  Exactly one
//! backend is *selected* per display at a time, but the selection is derived,
//! never stored: [`BackendSet::select`] recomputes it from the display's
//! enabled-capability set (minus session downgrades) in fixed priority
//! order, with gamma as the guaranteed last resort.

use std::sync::Arc;

use async_trait::async_trait;
use lux_core::{Capability, DisplayId, DisplayRecord};
use thiserror::Error;

pub mod ddc;
pub mod gamma;
pub mod mock;
pub mod native;
pub mod network;

/// A controllable property of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Brightness,
    Contrast,
    Volume,
    /// 1 = muted, 2 = unmuted (DDC VCP 0x8D convention).
    Mute,
    /// Input source code (DDC VCP 0x60 value space).
    Input,
}

impl Command {
    /// Wire name used by the network relay protocol.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Brightness => "brightness",
            Command::Contrast => "contrast",
            Command::Volume => "volume",
            Command::Mute => "mute",
            Command::Input => "input",
        }
    }
}

/// Error type for control channel operations.
///
/// None of these are fatal: an unresponsive channel is downgraded by the
/// watchdog, never retried in a tight loop.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("display {0} is not responding on this channel")]
    Unresponsive(DisplayId),
    #[error("command {0:?} is not supported by this channel")]
    Unsupported(Command),
    #[error("bus error: {0}")]
    Bus(String),
    #[error("relay error: {0}")]
    Relay(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One concrete control channel.
#[async_trait]
pub trait ControlBackend: Send + Sync {
    /// Which capability this channel implements.
    fn kind(&self) -> Capability;

    /// Whether this channel exists for the given display at all
    /// (bus registered, relay configured, sysfs device present).
    async fn exists(&self, display: &DisplayRecord) -> bool;

    /// Reads the current value of `command`.
    async fn read(&self, display: &DisplayRecord, command: Command) -> Result<i64, ControlError>;

    /// Writes a new value for `command`.
    async fn write(
        &self,
        display: &DisplayRecord,
        command: Command,
        value: i64,
    ) -> Result<(), ControlError>;

    /// Responsiveness probe.  Must be cheap and must never panic; a `false`
    /// result feeds the fallback watchdog, nothing else.
    async fn is_responsive(&self, display: &DisplayRecord) -> bool;

    /// Writes a known calibration sequence.  The engine follows up with
    /// repeated forced re-adaptation to overcome eventual-consistency
    /// firmware; this call only performs the calibration itself.
    async fn reset_state(&self, display: &DisplayRecord) -> Result<(), ControlError>;
}

/// The full set of channels the engine can choose from.
///
/// Gamma is mandatory; the other channels are optional per deployment.
pub struct BackendSet {
    native_api: Option<Arc<dyn ControlBackend>>,
    ddc: Option<Arc<dyn ControlBackend>>,
    network: Option<Arc<dyn ControlBackend>>,
    gamma: Arc<dyn ControlBackend>,
}

impl BackendSet {
    pub fn new(gamma: Arc<dyn ControlBackend>) -> Self {
        Self {
            native_api: None,
            ddc: None,
            network: None,
            gamma,
        }
    }

    pub fn with_native_api(mut self, backend: Arc<dyn ControlBackend>) -> Self {
        self.native_api = Some(backend);
        self
    }

    pub fn with_ddc(mut self, backend: Arc<dyn ControlBackend>) -> Self {
        self.ddc = Some(backend);
        self
    }

    pub fn with_network(mut self, backend: Arc<dyn ControlBackend>) -> Self {
        self.network = Some(backend);
        self
    }

    /// Returns the channel for a capability, if one is installed.
    pub fn get(&self, capability: Capability) -> Option<Arc<dyn ControlBackend>> {
        match capability {
            Capability::NativeApi => self.native_api.clone(),
            Capability::Ddc => self.ddc.clone(),
            Capability::Network => self.network.clone(),
            Capability::Gamma => Some(Arc::clone(&self.gamma)),
        }
    }

    /// The guaranteed-available gamma fallback.
    pub fn gamma(&self) -> Arc<dyn ControlBackend> {
        Arc::clone(&self.gamma)
    }

    /// Selects the highest-priority backend among those enabled on the
    /// record, not downgraded this session, and existing for this display.
    pub async fn select(&self, display: &DisplayRecord) -> Arc<dyn ControlBackend> {
        for capability in Capability::PRIORITY_ORDER {
            if !display.enabled_controls.get(capability) || display.is_downgraded(capability) {
                continue;
            }
            if let Some(backend) = self.get(capability) {
                if capability == Capability::Gamma || backend.exists(display).await {
                    return backend;
                }
            }
        }
        // Gamma may have been disabled together with everything else by a
        // stale record; it is still the only channel that always exists.
        Arc::clone(&self.gamma)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::mock::MockControl;
    use super::*;

    fn set_with(kinds: &[Capability]) -> BackendSet {
        let mut set = BackendSet::new(Arc::new(MockControl::new(Capability::Gamma)));
        for kind in kinds {
            let backend = Arc::new(MockControl::new(*kind));
            set = match kind {
                Capability::NativeApi => set.with_native_api(backend),
                Capability::Ddc => set.with_ddc(backend),
                Capability::Network => set.with_network(backend),
                Capability::Gamma => set,
            };
        }
        set
    }

    #[tokio::test]
    async fn test_select_prefers_native_api_over_everything() {
        let set = set_with(&[Capability::NativeApi, Capability::Ddc, Capability::Network]);
        let record = DisplayRecord::new(1, "s", "d");
        assert_eq!(set.select(&record).await.kind(), Capability::NativeApi);
    }

    #[tokio::test]
    async fn test_select_respects_enabled_flags() {
        let set = set_with(&[Capability::NativeApi, Capability::Ddc, Capability::Network]);
        let mut record = DisplayRecord::new(1, "s", "d");
        record.enabled_controls.set(Capability::NativeApi, false);
        assert_eq!(set.select(&record).await.kind(), Capability::Ddc);
        record.enabled_controls.set(Capability::Ddc, false);
        assert_eq!(set.select(&record).await.kind(), Capability::Network);
        record.enabled_controls.set(Capability::Network, false);
        assert_eq!(set.select(&record).await.kind(), Capability::Gamma);
    }

    #[tokio::test]
    async fn test_select_skips_downgraded_channels() {
        let set = set_with(&[Capability::Ddc]);
        let mut record = DisplayRecord::new(1, "s", "d");
        record.downgrade(Capability::Ddc);
        assert_eq!(set.select(&record).await.kind(), Capability::Gamma);
    }

    #[tokio::test]
    async fn test_select_skips_channels_that_do_not_exist() {
        let ddc = Arc::new(MockControl::new(Capability::Ddc));
        ddc.set_exists(false);
        let set = BackendSet::new(Arc::new(MockControl::new(Capability::Gamma))).with_ddc(ddc);
        let record = DisplayRecord::new(1, "s", "d");
        assert_eq!(set.select(&record).await.kind(), Capability::Gamma);
    }

    #[tokio::test]
    async fn test_select_falls_back_to_gamma_when_all_flags_disabled() {
        let set = set_with(&[Capability::NativeApi, Capability::Ddc, Capability::Network]);
        let mut record = DisplayRecord::new(1, "s", "d");
        for capability in Capability::PRIORITY_ORDER {
            record.enabled_controls.set(capability, false);
        }
        assert_eq!(set.select(&record).await.kind(), Capability::Gamma);
    }
}
