//! Agent contract.
//!
//! Each tank is driven by one [`Agent`], built per match by an
//! [`AgentFactory`] from an explicit [`AgentContext`]. The engine calls
//! [`Agent::observe`] then [`Agent::act`] once per step under a wall-clock
//! budget, and [`Agent::finalize`] once when the match ends.
//!
//! Faults are values: an agent that cannot decide returns an
//! [`AgentError`]. The engine flags the agent's side, logs the fault and
//! substitutes [`Action::NOOP`]; the match continues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AgentError;
use crate::field::Field;
use crate::objects::Team;
use crate::observation::Observation;
use crate::settings::Settings;

/// Name used when an agent does not provide one.
pub const DEFAULT_AGENT_NAME: &str = "noname";
/// Longest agent name kept after sanitizing.
pub const MAX_AGENT_NAME_LEN: usize = 16;

/// A tank's decision for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    /// Requested turn in radians; clamped to `±max_turn`.
    pub turn: f64,
    /// Requested forward distance; capped at `max_speed`.
    pub speed: f64,
    /// Fire this step (needs ammo).
    pub shoot: bool,
}

impl Action {
    /// Do nothing.
    pub const NOOP: Self = Self {
        turn: 0.0,
        speed: 0.0,
        shoot: false,
    };

    /// Create an action.
    #[must_use]
    pub const fn new(turn: f64, speed: f64, shoot: bool) -> Self {
        Self { turn, speed, shoot }
    }

    /// Whether turn and speed are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.turn.is_finite() && self.speed.is_finite()
    }
}

/// Everything an agent receives at construction.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Index of the tank within its team.
    pub index: usize,
    /// The tank's team.
    pub team: Team,
    /// Copy of the match settings.
    pub settings: Settings,
    /// Field geometry, present when `settings.field_known` is set.
    pub field: Option<Arc<Field>>,
}

/// Decision logic for one tank.
pub trait Agent: Send {
    /// Receive this step's observation.
    fn observe(&mut self, observation: &Observation) -> Result<(), AgentError>;

    /// Decide this step's action.
    fn act(&mut self) -> Result<Action, AgentError>;

    /// Match is over. `interrupted` is set when it ended early from outside.
    fn finalize(&mut self, interrupted: bool) -> Result<(), AgentError> {
        let _ = interrupted;
        Ok(())
    }
}

/// Builds a team's agents for a match.
pub trait AgentFactory: Send + Sync {
    /// Display name of the team's agent, see [`sanitize_name`].
    fn name(&self) -> String {
        DEFAULT_AGENT_NAME.to_string()
    }

    /// Build the agent for one tank.
    fn create(&self, context: AgentContext) -> Result<Box<dyn Agent>, AgentError>;
}

impl<F> AgentFactory for F
where
    F: Fn(AgentContext) -> Box<dyn Agent> + Send + Sync,
{
    fn create(&self, context: AgentContext) -> Result<Box<dyn Agent>, AgentError> {
        Ok(self(context))
    }
}

/// An [`AgentFactory`] with an explicit name.
pub struct NamedFactory<F> {
    name: String,
    build: F,
}

impl<F> NamedFactory<F>
where
    F: Fn(AgentContext) -> Box<dyn Agent> + Send + Sync,
{
    /// Wrap `build` under `name`.
    pub fn new(name: impl Into<String>, build: F) -> Self {
        Self {
            name: name.into(),
            build,
        }
    }
}

impl<F> AgentFactory for NamedFactory<F>
where
    F: Fn(AgentContext) -> Box<dyn Agent> + Send + Sync,
{
    fn name(&self) -> String {
        sanitize_name(&self.name)
    }

    fn create(&self, context: AgentContext) -> Result<Box<dyn Agent>, AgentError> {
        Ok((self.build)(context))
    }
}

/// Lowercase, keep `[a-z0-9-]`, cap at [`MAX_AGENT_NAME_LEN`]; empty names
/// become [`DEFAULT_AGENT_NAME`].
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let name: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .take(MAX_AGENT_NAME_LEN)
        .collect();
    if name.is_empty() {
        DEFAULT_AGENT_NAME.to_string()
    } else {
        name
    }
}

/// Agent that never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAgent;

impl Agent for NoOpAgent {
    fn observe(&mut self, _observation: &Observation) -> Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self) -> Result<Action, AgentError> {
        Ok(Action::NOOP)
    }
}
