//! The persisted and in-memory state of one physical display.
//!
//! A [`DisplayRecord`] is created when the registry enumerates a display,
//! matched against stored records by its derived serial, mutated on every
//! successful control read/write and capability toggle, and dropped from the
//! active set when the hardware disconnects.
//!
//! Two identities live side by side:
//!
//! - `id` is the numeric handle the OS assigned at enumeration time.  It is a
//!   lookup key only and must never be treated as durable — it changes across
//!   reboots and sometimes across replugs.
//! - `serial` is derived from EDID attributes and is the durable
//!   cross-session identity the datastore keys on.

use serde::{Deserialize, Serialize};

/// Numeric display handle assigned by the OS at enumeration time.
///
/// Not stable across reboots; valid only within one enumeration generation.
pub type DisplayId = u32;

/// Upper bound on stored learning data points per channel.
const DATA_POINT_LIMIT: usize = 64;

/// One hardware/software channel capable of controlling a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Vendor brightness service for directly-attached panels.
    NativeApi,
    /// DDC/CI over the display's data connection.
    Ddc,
    /// Network relay channel.
    Network,
    /// Software gamma-table scaling.  Always available as the fallback.
    Gamma,
}

impl Capability {
    /// All capabilities, in backend-selection priority order.
    pub const PRIORITY_ORDER: [Capability; 4] = [
        Capability::NativeApi,
        Capability::Ddc,
        Capability::Network,
        Capability::Gamma,
    ];
}

/// Per-capability enabled flags for one display.
///
/// The engine — not this type — enforces that at least one capability stays
/// enabled; see the capability-toggle path in the engine crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledControls {
    #[serde(default = "default_true")]
    pub native_api: bool,
    #[serde(default = "default_true")]
    pub ddc: bool,
    #[serde(default = "default_true")]
    pub network: bool,
    #[serde(default = "default_true")]
    pub gamma: bool,
}

impl Default for EnabledControls {
    fn default() -> Self {
        Self {
            native_api: true,
            ddc: true,
            network: true,
            gamma: true,
        }
    }
}

impl EnabledControls {
    /// Returns whether the given capability is enabled.
    pub fn get(&self, capability: Capability) -> bool {
        match capability {
            Capability::NativeApi => self.native_api,
            Capability::Ddc => self.ddc,
            Capability::Network => self.network,
            Capability::Gamma => self.gamma,
        }
    }

    /// Sets the enabled flag for the given capability.
    pub fn set(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::NativeApi => self.native_api = enabled,
            Capability::Ddc => self.ddc = enabled,
            Capability::Network => self.network = enabled,
            Capability::Gamma => self.gamma = enabled,
        }
    }

    /// Number of currently enabled capabilities.
    pub fn enabled_count(&self) -> usize {
        [self.native_api, self.ddc, self.network, self.gamma]
            .iter()
            .filter(|e| **e)
            .count()
    }
}

/// A single learning data point: what the mode's source value was when the
/// user chose a specific target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// The mode's input value at the time of the adjustment.
    pub source: i64,
    /// The value the user settled on.
    pub value: i64,
}

/// A user-configured application exception carrying brightness/contrast
/// offsets applied while that application is in the foreground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppException {
    /// Stable application identifier (bundle id / desktop file id).
    pub identifier: String,
    /// Human-readable application name.
    pub name: String,
    /// Signed brightness offset in raw value units.
    #[serde(default)]
    pub brightness: i64,
    /// Signed contrast offset in raw value units.
    #[serde(default)]
    pub contrast: i64,
}

/// Identity and state of one physical display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRecord {
    /// OS-assigned handle for the current enumeration generation.
    #[serde(skip)]
    pub id: DisplayId,
    /// Derived serial; the durable cross-session identity.
    pub serial: String,
    /// User-visible name (defaults to the EDID name, user-renamable).
    pub name: String,
    /// Name as read from the EDID, used for identity matching.
    pub edid_name: String,

    // EDID-like attributes used by the fuzzy matcher.
    #[serde(default)]
    pub manufacture_year: i64,
    #[serde(default)]
    pub serial_number: i64,
    #[serde(default)]
    pub product_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<i64>,

    /// Currently connected.
    #[serde(skip)]
    pub active: bool,
    /// Participates in automatic adjustment.
    #[serde(default = "default_true")]
    pub adaptive: bool,
    /// Automatic adjustment is paused for this display only.
    #[serde(default)]
    pub adaptive_paused: bool,
    /// Acts as the brightness reference for Sync mode.
    #[serde(default)]
    pub is_source: bool,
    /// Accept the gamma fallback without prompting.
    #[serde(default)]
    pub always_fallback: bool,
    /// Never prompt about the gamma fallback for this display.
    #[serde(default)]
    pub never_fallback: bool,
    #[serde(default)]
    pub enabled_controls: EnabledControls,
    /// Channels probed unresponsive this session; selection skips them.
    /// Runtime-only, cleared on re-enumeration and after a successful reset.
    #[serde(skip)]
    pub downgraded: Vec<Capability>,

    /// Stored per-display brightness offset applied by the adaptive modes.
    #[serde(default)]
    pub brightness_offset: i64,
    /// Stored per-display contrast offset applied by the adaptive modes.
    #[serde(default)]
    pub contrast_offset: i64,

    #[serde(default = "default_min_value")]
    pub min_brightness: i64,
    #[serde(default = "default_max_value")]
    pub max_brightness: i64,
    #[serde(default = "default_mid_value")]
    pub brightness: i64,
    #[serde(default = "default_min_value")]
    pub min_contrast: i64,
    #[serde(default = "default_max_value")]
    pub max_contrast: i64,
    #[serde(default = "default_mid_value")]
    pub contrast: i64,
    #[serde(default = "default_mid_value")]
    pub volume: i64,
    #[serde(default)]
    pub audio_muted: bool,
    /// Currently selected input source (DDC VCP 0x60 value; 0 = unknown).
    #[serde(default)]
    pub input: u16,

    // Caps the DDC backend applies on write, for monitors whose firmware
    // misbehaves above a vendor-specific level.
    #[serde(default = "default_max_value")]
    pub max_ddc_brightness: i64,
    #[serde(default = "default_max_value")]
    pub max_ddc_contrast: i64,
    #[serde(default = "default_max_value")]
    pub max_ddc_volume: i64,

    #[serde(default)]
    pub brightness_data_points: Vec<DataPoint>,
    #[serde(default)]
    pub contrast_data_points: Vec<DataPoint>,
}

fn default_true() -> bool {
    true
}
fn default_min_value() -> i64 {
    0
}
fn default_max_value() -> i64 {
    100
}
fn default_mid_value() -> i64 {
    50
}

impl DisplayRecord {
    /// Creates a fresh record for newly enumerated hardware.
    pub fn new(id: DisplayId, serial: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            serial: serial.into(),
            edid_name: name.clone(),
            name,
            manufacture_year: 0,
            serial_number: 0,
            product_id: 0,
            vendor_id: None,
            active: false,
            adaptive: true,
            adaptive_paused: false,
            is_source: false,
            always_fallback: false,
            never_fallback: false,
            enabled_controls: EnabledControls::default(),
            downgraded: Vec::new(),
            brightness_offset: 0,
            contrast_offset: 0,
            min_brightness: default_min_value(),
            max_brightness: default_max_value(),
            brightness: default_mid_value(),
            min_contrast: default_min_value(),
            max_contrast: default_max_value(),
            contrast: default_mid_value(),
            volume: default_mid_value(),
            audio_muted: false,
            input: 0,
            max_ddc_brightness: default_max_value(),
            max_ddc_contrast: default_max_value(),
            max_ddc_volume: default_max_value(),
            brightness_data_points: Vec::new(),
            contrast_data_points: Vec::new(),
        }
    }

    /// Current brightness as a percent position within `[min, max]`.
    pub fn brightness_percent(&self) -> f64 {
        super::values::percent_of(self.brightness, self.min_brightness, self.max_brightness)
    }

    /// Current contrast as a percent position within `[min, max]`.
    pub fn contrast_percent(&self) -> f64 {
        super::values::percent_of(self.contrast, self.min_contrast, self.max_contrast)
    }

    /// Records a brightness learning data point.
    ///
    /// At most one point is kept per source value (most recent wins) and the
    /// list is bounded, dropping the oldest entries.
    pub fn insert_brightness_data_point(&mut self, source: i64, value: i64) {
        insert_data_point(&mut self.brightness_data_points, source, value);
    }

    /// Records a contrast learning data point.
    pub fn insert_contrast_data_point(&mut self, source: i64, value: i64) {
        insert_data_point(&mut self.contrast_data_points, source, value);
    }

    /// Whether a channel was probed unresponsive this session.
    pub fn is_downgraded(&self, capability: Capability) -> bool {
        self.downgraded.contains(&capability)
    }

    /// Marks a channel unresponsive for the rest of the session.
    pub fn downgrade(&mut self, capability: Capability) {
        if !self.downgraded.contains(&capability) {
            self.downgraded.push(capability);
        }
    }

    /// Clears all runtime downgrades (after a reset or re-enumeration).
    pub fn clear_downgrades(&mut self) {
        self.downgraded.clear();
    }
}

fn insert_data_point(points: &mut Vec<DataPoint>, source: i64, value: i64) {
    points.retain(|p| p.source != source);
    points.push(DataPoint { source, value });
    if points.len() > DATA_POINT_LIMIT {
        let excess = points.len() - DATA_POINT_LIMIT;
        points.drain(..excess);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
