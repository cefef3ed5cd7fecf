//! Built-in demo agents.
//!
//! - `noop`: never moves.
//! - `random`: seeded random walk that fires at will.
//! - `capture`: drives to the nearest control point its team does not own,
//!   following the navigation mesh when the field is known, and shoots
//!   enemies in range.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use domination_core::agent::{Action, Agent, AgentContext, AgentFactory, NamedFactory, NoOpAgent};
use domination_core::error::AgentError;
use domination_core::field::Field;
use domination_core::math::{angle_fix, Vec2};
use domination_core::objects::Team;
use domination_core::observation::{Loc, Observation};

use crate::error::{MatchError, Result};

/// Names accepted by [`factory`].
pub const AGENT_NAMES: [&str; 3] = ["noop", "random", "capture"];

/// Probability that the random agent pulls the trigger.
const RANDOM_SHOOT_CHANCE: f64 = 0.1;

/// Distance under which a waypoint counts as reached.
const WAYPOINT_RADIUS: f64 = 4.0;

/// Factory for a built-in agent.
///
/// `seed` only matters for agents that draw random numbers; each tank gets
/// its own stream derived from the seed, its team and its index.
pub fn factory(name: &str, seed: u64) -> Result<Arc<dyn AgentFactory>> {
    let factory: Arc<dyn AgentFactory> = match name {
        "noop" => Arc::new(NamedFactory::new("noop", |_: AgentContext| -> Box<dyn Agent> {
            Box::new(NoOpAgent)
        })),
        "random" => Arc::new(NamedFactory::new(
            "random",
            move |ctx: AgentContext| -> Box<dyn Agent> { Box::new(RandomAgent::new(&ctx, seed)) },
        )),
        "capture" => Arc::new(NamedFactory::new(
            "capture",
            |ctx: AgentContext| -> Box<dyn Agent> { Box::new(CaptureAgent::new(&ctx)) },
        )),
        other => return Err(MatchError::UnknownAgent(other.to_string())),
    };
    Ok(factory)
}

/// Seeded random walk.
#[derive(Debug, Clone)]
pub struct RandomAgent {
    rng: ChaCha8Rng,
    max_turn: f64,
    max_speed: f64,
}

impl RandomAgent {
    /// Agent for the tank described by `ctx`.
    pub fn new(ctx: &AgentContext, seed: u64) -> Self {
        let stream = ((ctx.team.index() as u64) << 32) | ctx.index as u64;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self {
            rng,
            max_turn: ctx.settings.max_turn,
            max_speed: ctx.settings.max_speed,
        }
    }
}

impl Agent for RandomAgent {
    fn observe(&mut self, _observation: &Observation) -> std::result::Result<(), AgentError> {
        Ok(())
    }

    fn act(&mut self) -> std::result::Result<Action, AgentError> {
        let turn = if self.max_turn > 0.0 {
            self.rng.gen_range(-self.max_turn..=self.max_turn)
        } else {
            0.0
        };
        let speed = self.rng.gen_range(0.0..=self.max_speed);
        let shoot = self.rng.gen_bool(RANDOM_SHOOT_CHANCE);
        Ok(Action::new(turn, speed, shoot))
    }
}

/// Control point runner.
#[derive(Debug, Clone)]
pub struct CaptureAgent {
    team: Team,
    field: Option<Arc<Field>>,
    max_turn: f64,
    max_speed: f64,
    max_range: f64,
    goal: Option<Vec2>,
    route: Vec<Vec2>,
    next: Action,
}

impl CaptureAgent {
    /// Agent for the tank described by `ctx`.
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            team: ctx.team,
            field: ctx.field.clone(),
            max_turn: ctx.settings.max_turn,
            max_speed: ctx.settings.max_speed,
            max_range: ctx.settings.max_range,
            goal: None,
            route: Vec::new(),
            next: Action::NOOP,
        }
    }

    fn pick_goal(&self, obs: &Observation, here: Vec2) -> Option<Vec2> {
        let nearest = |owned_ok: bool| {
            obs.control_points
                .iter()
                .filter(|cp| owned_ok || cp.team != self.team)
                .map(|cp| loc_to_vec(cp.loc))
                .min_by(|a, b| here.distance(*a).total_cmp(&here.distance(*b)))
        };
        nearest(false).or_else(|| nearest(true))
    }

    /// Next point to drive towards on the way to `goal`.
    fn waypoint(&mut self, here: Vec2, goal: Vec2) -> Vec2 {
        if self.goal != Some(goal) {
            self.goal = Some(goal);
            self.route = match &self.field {
                Some(field) => field.nav_mesh.find_path(here, goal).unwrap_or_default(),
                None => Vec::new(),
            };
        }
        while self.route.len() > 1 && here.distance(self.route[0]) < WAYPOINT_RADIUS {
            self.route.remove(0);
        }
        self.route.first().copied().unwrap_or(goal)
    }

    fn steer(&self, obs: &Observation, here: Vec2, target: Vec2) -> Action {
        let offset = target - here;
        let distance = offset.length();
        if distance < f64::EPSILON {
            return Action::NOOP;
        }
        let turn = angle_fix(offset.angle() - obs.angle);
        let speed = if turn.abs() > self.max_turn {
            0.0
        } else {
            distance.min(self.max_speed)
        };
        Action::new(turn, speed, false)
    }

    fn aim(&self, obs: &Observation, here: Vec2) -> Option<Action> {
        if obs.ammo == 0 {
            return None;
        }
        let target = obs
            .foes
            .iter()
            .map(|foe| loc_to_vec(foe.loc))
            .filter(|&p| here.distance(p) <= self.max_range)
            .min_by(|a, b| here.distance(*a).total_cmp(&here.distance(*b)))?;
        let turn = angle_fix((target - here).angle() - obs.angle);
        if turn.abs() > self.max_turn {
            return None;
        }
        Some(Action::new(turn, 0.0, true))
    }
}

impl Agent for CaptureAgent {
    fn observe(&mut self, obs: &Observation) -> std::result::Result<(), AgentError> {
        if obs.respawn_in > 0 {
            self.goal = None;
            self.next = Action::NOOP;
            return Ok(());
        }
        let here = loc_to_vec(obs.loc);
        if let Some(shot) = self.aim(obs, here) {
            self.next = shot;
            return Ok(());
        }
        self.next = match self.pick_goal(obs, here) {
            Some(goal) => {
                let target = self.waypoint(here, goal);
                self.steer(obs, here, target)
            }
            None => Action::NOOP,
        };
        Ok(())
    }

    fn act(&mut self) -> std::result::Result<Action, AgentError> {
        Ok(self.next)
    }
}

fn loc_to_vec(loc: Loc) -> Vec2 {
    Vec2::new(f64::from(loc.0), f64::from(loc.1))
}
