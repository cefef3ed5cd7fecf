//! # Domination Core
//!
//! Deterministic match engine for two-team tank Domination games.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No network
//! - No system randomness (seeded ChaCha only)
//! - File IO limited to settings and replay helpers
//!
//! This separation enables:
//! - Headless tournament runners
//! - Exact replays
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`field`] / [`field_generator`] - Tile fields and their procedural generation
//! - [`objects`] - Tagged game objects and their storage
//! - [`physics`] - Sweep-and-prune broadphase and positional correction
//! - [`simulation`] - The step loop
//! - [`agent`] / [`observation`] - Agent contract
//! - [`replay`] - Recorded matches
//! - [`math`] / [`navigation`] - Geometry and path search

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agent;
pub mod capture;
pub mod error;
pub mod field;
pub mod field_generator;
pub mod math;
pub mod navigation;
pub mod objects;
pub mod observation;
pub mod physics;
pub mod replay;
pub mod settings;
pub mod simulation;
pub mod stats;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{Action, Agent, AgentContext, AgentFactory, NamedFactory, NoOpAgent};
    pub use crate::error::{AgentError, GameError, Result};
    pub use crate::field::Field;
    pub use crate::field_generator::{generate, FieldGeneratorConfig};
    pub use crate::math::{Rect, Vec2};
    pub use crate::objects::{PickupKind, Team};
    pub use crate::observation::Observation;
    pub use crate::replay::ReplayData;
    pub use crate::settings::{CaptureMode, EndCondition, Settings};
    pub use crate::simulation::{EndReason, Game, GameState, StepEvents};
    pub use crate::stats::GameStats;
}
