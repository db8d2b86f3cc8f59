//! The adaptive mode variant type.
//!
//! The engine crate carries the mode *implementations* (they need live
//! collaborators); this module holds the closed set of keys and the
//! automatic resolution order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which strategy computes target brightness/contrast for a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKey {
    /// Direct user-driven values; always available.
    Manual,
    /// Mirror a designated source display, rescaled into each target's range.
    Sync,
    /// Solar-position curve at the user's coordinates.
    Location,
    /// Ambient-light sensor over a serial/USB link.
    Sensor,
}

impl ModeKey {
    /// Automatic resolution order; Manual is the implicit final fallback.
    pub const AUTO_RESOLUTION_ORDER: [ModeKey; 3] =
        [ModeKey::Sensor, ModeKey::Sync, ModeKey::Location];

    /// `true` for every key except [`ModeKey::Manual`].
    pub fn is_automatic(self) -> bool {
        self != ModeKey::Manual
    }
}

impl fmt::Display for ModeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModeKey::Manual => "manual",
            ModeKey::Sync => "sync",
            ModeKey::Location => "location",
            ModeKey::Sensor => "sensor",
        };
        f.write_str(name)
    }
}
