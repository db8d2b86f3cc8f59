//! Location collaborator for the Location mode.

use lux_core::Coordinates;

/// Source of the user's coordinates.
///
/// Returning `None` makes the Location mode ineligible; the mode watchdog
/// falls through to Manual.
pub trait LocationProvider: Send + Sync {
    fn coordinates(&self) -> Option<Coordinates>;
}

/// Config-backed provider with fixed coordinates.
pub struct StaticLocation {
    coordinates: Option<Coordinates>,
}

impl StaticLocation {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

impl LocationProvider for StaticLocation {
    fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }
}
