//! Application layer: the adaptive engine, its modes, the display registry,
//! and the background watchdogs.
//!
//! This layer depends only on collaborator traits and domain types; all
//! infrastructure implementations are injected at construction time.

pub mod engine;
pub mod modes;
pub mod registry;
pub mod watchdog;
