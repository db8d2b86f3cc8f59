//! # lux-engine
//!
//! The `luxd` daemon: orchestrates adaptive modes, control backends, and
//! background watchdogs on top of the pure domain logic in `lux-core`.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ EngineContext::new()    -- config, collaborators, mode set
//!  └─ registry::refresh()     -- enumerate + reconcile identities
//!  └─ watchdog::start()
//!       ├─ control watchdog (15 s)  -- probe backends, fallback prompts
//!       └─ mode watchdog (5 s)      -- automatic mode re-resolution
//! ```
//!
//! The `application` layer depends only on traits and domain types; every
//! OS-facing surface (i2c bus, HTTP relay, sysfs, prompt UI, datastore)
//! lives in `infrastructure` behind a trait with a mock implementation.

pub mod application;
pub mod infrastructure;

pub use application::engine::{CapabilityError, Collaborators, EngineConfig, EngineContext};
pub use application::modes::{AdaptEnv, AdaptiveMode, Adjustment, ModeSet, SourceLevels};
pub use infrastructure::control::{BackendSet, Command, ControlBackend, ControlError};
