//! OS-facing infrastructure: control channels, enumeration, sensors,
//! location, prompts, and storage.
//!
//! Everything here sits behind a trait so the application layer and the
//! tests never touch real hardware.

pub mod control;
pub mod enumeration;
pub mod location;
pub mod prompt;
pub mod sensor;
pub mod storage;
