//! # lux-core
//!
//! Domain logic for `luxd`, the adaptive display control daemon.
//!
//! This crate contains the pure, OS-free half of the system:
//!
//! - **`domain::display`** – the [`DisplayRecord`]: identity and state of one
//!   physical display, including which control capabilities are enabled and
//!   the value ranges the engine is allowed to write into.
//!
//! - **`domain::identity`** – reconciling freshly enumerated hardware
//!   attributes with persisted records.  Hardware ids handed out at
//!   enumeration time are not stable across reboots, so cross-session
//!   identity is a derived serial plus exact/fuzzy attribute matching.
//!
//! - **`domain::values`** – the arithmetic every adjustment funnels through:
//!   percent→value mapping, clamping, and the filled-chiclet stepping used
//!   for keyboard-key increments.
//!
//! - **`domain::solar`** – solar elevation math and the daylight brightness
//!   curve used by the Location mode.
//!
//! - **`domain::mode`** – the adaptive mode variant type and its automatic
//!   resolution order.
//!
//! It has zero dependencies on OS APIs, the async runtime, or any hardware
//! bus; everything here is deterministic and unit-testable.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `lux_core::DisplayRecord` instead of `lux_core::domain::display::DisplayRecord`.
pub use domain::display::{
    AppException, Capability, DataPoint, DisplayId, DisplayRecord, EnabledControls,
};
pub use domain::identity::{derive_serial, ensure_unique_serials, resolve, HardwareAttributes};
pub use domain::mode::ModeKey;
pub use domain::solar::{Coordinates, DaylightCurve, SunPhase};
pub use domain::values::{
    cap, compute_from_percent, filled_chiclet_value, levenshtein, percent_of,
    FILLED_CHICLET_THRESHOLDS,
};
