//! Core match loop.
//!
//! A [`Game`] owns every object of one match and advances it one step at a
//! time. Each step runs the same phases in the same order:
//!
//! 1. update: respawn countdowns, control point scoring, fountain refills
//! 2. sense: one [`Observation`] per tank
//! 3. think: one [`Action`] per tank, under the think-time budget
//! 4. shoot: raycasts for tanks that fired
//! 5. end conditions (the step stops here when one triggers)
//! 6. movement deltas, respawns, [`SIMULATION_SUBSTEPS`] physics substeps
//! 7. positions committed, angles normalized
//!
//! # Determinism
//!
//! Objects are processed in id order, the only randomness comes from a
//! ChaCha RNG seeded by [`Settings::seed`], and replayed tanks consume
//! recorded actions. Given the same field, settings and actions a match
//! produces the same sequence of states; see [`Game::state_hash`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use domination_core::prelude::*;
//!
//! let field: Field = "w w w w w\nR _ C _ B\nw w w w w\n".parse().unwrap();
//! let settings = Settings { max_steps: 5, max_score: 2, think_time: 1.0, ..Settings::default() };
//! let noop = |_: AgentContext| -> Box<dyn Agent> { Box::new(NoOpAgent) };
//! let mut game = Game::new(settings, Arc::new(field), Arc::new(noop), Arc::new(noop)).unwrap();
//! let stats = game.run().unwrap();
//! assert_eq!(stats.steps, 5);
//! ```

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{sanitize_name, Action, Agent, AgentContext, AgentFactory, NoOpAgent};
use crate::error::{GameError, Result};
use crate::field::Field;
use crate::math::{angle_fix, Rect, Vec2};
use crate::objects::{
    GameObject, ObjectId, ObjectKind, ObjectStorage, PickupKind, Spread, Team, AMMO_SIZE,
    CRUMB_SIZE, TANK_SPAWN_OFFSET, TANK_SPAWN_SIZE,
};
use crate::observation::{
    local_wall_grid, ControlPointInfo, Loc, Observation, PickupInfo, SeenTank,
};
use crate::physics::{Broadphase, SIMULATION_SUBSTEPS};
use crate::replay::{ReplayData, REPLAY_VERSION};
use crate::settings::{EndCondition, Settings};
use crate::stats::GameStats;

/// Attempts to find a free tile for a fountain child before giving up.
pub const FOUNTAIN_SPAWN_TRIES: u32 = 10;

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// Constructed, objects not yet created.
    New,
    /// Set up and waiting for the first step.
    Ready,
    /// Stepping.
    Running,
    /// Stopped early from outside.
    Interrupt,
    /// Finished normally.
    Ended,
}

impl GameState {
    /// Whether the match is over.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Interrupt | Self::Ended)
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndReason {
    /// Interrupt requested.
    Interrupted,
    /// A side's score reached zero.
    Score,
    /// No crumbs left.
    Crumbs,
    /// `max_steps` played.
    StepLimit,
}

/// A resolved shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    /// Shooting tank.
    pub tank: ObjectId,
    /// Its team.
    pub team: Team,
    /// Muzzle position.
    pub from: Vec2,
    /// Impact point, or the end of the range.
    pub to: Vec2,
    /// Object hit, if any.
    pub hit: Option<ObjectId>,
}

/// A pickup taken by a tank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupEvent {
    /// Collecting tank.
    pub tank: ObjectId,
    /// Its team.
    pub team: Team,
    /// What was collected.
    pub kind: PickupKind,
}

/// What happened during one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEvents {
    /// Step number (1-based).
    pub step: u32,
    /// Shots fired this step, in tank order.
    pub shots: Vec<Shot>,
    /// Pickups taken this step.
    pub pickups: Vec<PickupEvent>,
    /// Tanks sent back to their spawn this step.
    pub respawns: Vec<ObjectId>,
    /// Set on the step that ended the match.
    pub end: Option<EndReason>,
}

/// Cloneable handle that stops a running match between steps.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    /// Request the match to stop.
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of one tank, for comparing runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TankSnapshot {
    /// Object id.
    pub id: ObjectId,
    /// Team.
    pub team: Team,
    /// Index within the team.
    pub slot: usize,
    /// Committed top-left position.
    pub position: Vec2,
    /// Orientation.
    pub angle: f64,
    /// Ammo.
    pub ammo: u32,
    /// Respawn countdown.
    pub respawn_in: i32,
}

enum Source {
    Agents {
        red: Arc<dyn AgentFactory>,
        blue: Arc<dyn AgentFactory>,
    },
    Replay {
        red: Vec<Vec<Action>>,
        blue: Vec<Vec<Action>>,
    },
}

enum Control {
    Agent(Box<dyn Agent>),
    Replay(VecDeque<Action>),
}

struct TankController {
    tank: ObjectId,
    team: Team,
    slot: usize,
    control: Control,
    recorded: Vec<Action>,
}

enum Outcome {
    Ok,
    Timeout(f64),
    Fault(String),
}

#[derive(Debug, Default)]
struct UiInput {
    clicked: Option<Vec2>,
    keys: Vec<String>,
}

/// One match.
pub struct Game {
    settings: Settings,
    field: Arc<Field>,
    state: GameState,
    source: Source,
    record: bool,
    names: [String; 2],
    storage: ObjectStorage,
    broadphase: Broadphase,
    tanks: Vec<TankController>,
    control_points: Vec<ObjectId>,
    fountains: Vec<ObjectId>,
    step: u32,
    score_red: i64,
    score_blue: i64,
    stats: GameStats,
    rng: ChaCha8Rng,
    log: Vec<String>,
    interrupt: InterruptHandle,
    ui: UiInput,
    replay: Option<ReplayData>,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("state", &self.state)
            .field("step", &self.step)
            .field("score_red", &self.score_red)
            .field("score_blue", &self.score_blue)
            .field("objects", &self.storage.len())
            .finish_non_exhaustive()
    }
}

impl Game {
    /// Match between two agent factories.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidSettings`] if `settings` do not validate.
    pub fn new(
        settings: Settings,
        field: Arc<Field>,
        red: Arc<dyn AgentFactory>,
        blue: Arc<dyn AgentFactory>,
    ) -> Result<Self> {
        let names = [sanitize_name(&red.name()), sanitize_name(&blue.name())];
        Self::build(settings, field, Source::Agents { red, blue }, names)
    }

    /// Re-run a recorded match.
    ///
    /// # Errors
    /// Returns an error if the recorded settings do not validate.
    pub fn from_replay(replay: ReplayData) -> Result<Self> {
        let names = [replay.name_red, replay.name_blue];
        Self::build(
            replay.settings,
            Arc::new(replay.field),
            Source::Replay {
                red: replay.actions_red,
                blue: replay.actions_blue,
            },
            names,
        )
    }

    fn build(settings: Settings, field: Arc<Field>, source: Source, names: [String; 2]) -> Result<Self> {
        settings.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(settings.seed);
        Ok(Self {
            settings,
            field,
            state: GameState::New,
            source,
            record: false,
            names,
            storage: ObjectStorage::new(),
            broadphase: Broadphase::new(),
            tanks: Vec::new(),
            control_points: Vec::new(),
            fountains: Vec::new(),
            step: 0,
            score_red: 0,
            score_blue: 0,
            stats: GameStats::default(),
            rng,
            log: Vec::new(),
            interrupt: InterruptHandle::default(),
            ui: UiInput::default(),
            replay: None,
        })
    }

    /// Record actions so [`Game::replay`] is available after the match.
    #[must_use]
    pub fn with_recording(mut self) -> Self {
        self.record = true;
        self
    }

    /// Create every object from the field and build the tanks' controllers.
    ///
    /// Calling it again restarts the match from step zero on the same field.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] if the field lacks spawn points
    /// for either team.
    pub fn setup(&mut self) -> Result<()> {
        if self.field.red_spawns.is_empty() || self.field.blue_spawns.is_empty() {
            return Err(GameError::InvalidState(
                "field needs at least one spawn point per team".to_string(),
            ));
        }
        self.storage = ObjectStorage::new();
        self.broadphase = Broadphase::new();
        self.tanks.clear();
        self.control_points.clear();
        self.fountains.clear();
        self.step = 0;
        self.score_red = self.settings.max_score / 2;
        self.score_blue = self.settings.max_score / 2;
        self.stats = GameStats::default();
        self.rng = ChaCha8Rng::seed_from_u64(self.settings.seed);
        self.log.clear();
        self.ui = UiInput::default();
        self.replay = None;

        let objects = self.field.objects(self.settings.ammo_rate);
        for wall in objects.walls {
            self.add_object(wall);
        }
        for cp in objects.control_points {
            let id = self.add_object(cp);
            self.control_points.push(id);
        }
        for spawn in objects.spawns {
            self.add_object(spawn);
        }
        for fountain in objects.fountains {
            let id = self.add_object(fountain);
            self.fountains.push(id);
        }
        for id in self.fountains.clone() {
            self.fill_fountain(id);
        }

        let red = self.add_tanks(Team::Red);
        let blue = self.add_tanks(Team::Blue);
        let per_team = red.min(blue);
        self.stats.tanks_per_team = per_team;

        self.state = GameState::Ready;
        info!(
            red = %self.names[0],
            blue = %self.names[1],
            tanks = self.tanks.len(),
            objects = self.storage.len(),
            "Match set up"
        );
        self.push_log(format!(
            "Match {} vs {}: {} tanks per team",
            self.names[0], self.names[1], per_team
        ));
        Ok(())
    }

    fn add_object(&mut self, object: GameObject) -> ObjectId {
        let id = self.storage.insert(object);
        self.broadphase.insert(&self.storage, id);
        id
    }

    fn remove_object(&mut self, id: ObjectId) {
        self.broadphase.remove(id);
        self.storage.remove(id);
    }

    fn add_tanks(&mut self, team: Team) -> usize {
        let spawns = match team {
            Team::Red => self.field.red_spawns.clone(),
            _ => self.field.blue_spawns.clone(),
        };
        let count = self.settings.num_agents.min(spawns.len());
        if count < self.settings.num_agents {
            warn!(
                team = %team,
                requested = self.settings.num_agents,
                spawns = spawns.len(),
                "Not enough spawn points, fielding fewer tanks"
            );
        }

        for (slot, spawn) in spawns.iter().take(count).enumerate() {
            let offset = Vec2::new(TANK_SPAWN_OFFSET, TANK_SPAWN_OFFSET);
            let position = self.field.centered_on_tile(spawn.x, spawn.y, TANK_SPAWN_SIZE) + offset;
            let tank = self.add_object(GameObject::tank(position, spawn.angle, team, slot));
            let control = self.make_control(team, slot);
            self.tanks.push(TankController {
                tank,
                team,
                slot,
                control,
                recorded: Vec::new(),
            });
        }
        count
    }

    fn make_control(&mut self, team: Team, slot: usize) -> Control {
        let factory = match &self.source {
            Source::Agents { red, blue } => Arc::clone(if team == Team::Red { red } else { blue }),
            Source::Replay { red, blue } => {
                let lists = if team == Team::Red { red } else { blue };
                return Control::Replay(lists.get(slot).cloned().unwrap_or_default().into());
            }
        };
        let context = AgentContext {
            index: slot,
            team,
            settings: self.settings.clone(),
            field: self.settings.field_known.then(|| Arc::clone(&self.field)),
        };
        match factory.create(context) {
            Ok(agent) => Control::Agent(agent),
            Err(e) => {
                warn!(team = %team, slot, error = %e, "Agent construction failed");
                self.stats.flag_error(team);
                self.push_log(format!("{team} tank {slot}: construction failed: {e}"));
                Control::Agent(Box::new(NoOpAgent))
            }
        }
    }

    /// Advance the match by one step.
    ///
    /// Runs [`Game::setup`] first when the match is new. When the step ends
    /// the match, finalization runs before returning and the reason is in
    /// [`StepEvents::end`].
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] if the match is already over.
    pub fn step(&mut self) -> Result<StepEvents> {
        match self.state {
            GameState::New => {
                self.setup()?;
                self.state = GameState::Running;
            }
            GameState::Ready => self.state = GameState::Running,
            GameState::Running => {}
            GameState::Interrupt | GameState::Ended => {
                return Err(GameError::InvalidState("match is already over".to_string()));
            }
        }

        let mut events = StepEvents {
            step: self.step,
            ..StepEvents::default()
        };
        if self.interrupt.is_interrupted() {
            events.end = Some(EndReason::Interrupted);
            self.finish(EndReason::Interrupted);
            return Ok(events);
        }

        self.step += 1;
        events.step = self.step;

        let started = Instant::now();
        self.update();
        self.stats.update_time += started.elapsed().as_secs_f64();

        let observations = self.sense();
        let shooters = self.think(&observations);
        self.shoot(&shooters, &mut events);
        self.ui = UiInput::default();

        if let Some(reason) = self.check_end() {
            events.end = Some(reason);
            self.finish(reason);
            return Ok(events);
        }

        let started = Instant::now();
        self.prepare_movement(&mut events);
        for _ in 0..SIMULATION_SUBSTEPS {
            self.substep(&mut events);
        }
        self.commit_positions();
        self.stats.physics_time += started.elapsed().as_secs_f64();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            debug!(step = self.step, state_hash = hash, "Game state hash");
        }

        if self.step >= self.settings.max_steps {
            events.end = Some(EndReason::StepLimit);
            self.finish(EndReason::StepLimit);
        }
        Ok(events)
    }

    /// Play the match to the end.
    ///
    /// # Errors
    /// Returns [`GameError::InvalidState`] if the match is already over.
    pub fn run(&mut self) -> Result<&GameStats> {
        if self.state.is_terminal() {
            return Err(GameError::InvalidState("match is already over".to_string()));
        }
        while !self.state.is_terminal() {
            self.step()?;
        }
        Ok(&self.stats)
    }

    fn update(&mut self) {
        for ctrl in &self.tanks {
            if let Some(tank) = self.storage.get_mut(ctrl.tank).and_then(GameObject::as_tank_mut) {
                if tank.respawn_in > -1 {
                    tank.respawn_in -= 1;
                }
            }
        }

        let max_score = self.settings.max_score;
        for &id in &self.control_points {
            let Some(ObjectKind::ControlPoint(cp)) = self.storage.get_mut(id).map(|o| &mut o.kind)
            else {
                continue;
            };
            cp.reset_tally();
            match cp.team {
                Team::Red if self.score_red < max_score => {
                    self.score_red += 1;
                    self.score_blue -= 1;
                }
                Team::Blue if self.score_blue < max_score => {
                    self.score_blue += 1;
                    self.score_red -= 1;
                }
                _ => {}
            }
        }

        for id in self.fountains.clone() {
            let spawn = match self.storage.get_mut(id).map(|o| &mut o.kind) {
                Some(ObjectKind::Fountain(fountain)) => fountain.tick(),
                _ => false,
            };
            if spawn {
                self.spawn_child(id);
            }
        }
    }

    fn fill_fountain(&mut self, id: ObjectId) {
        let missing = match self.storage.get(id).map(|o| &o.kind) {
            Some(ObjectKind::Fountain(f)) => f.min_children.saturating_sub(f.children.len()),
            _ => 0,
        };
        for _ in 0..missing {
            self.spawn_child(id);
        }
    }

    /// Spawn one child of fountain `id`. Returns `false` when no free tile
    /// was found.
    fn spawn_child(&mut self, id: ObjectId) -> bool {
        let Some(fountain_obj) = self.storage.get(id) else {
            return false;
        };
        let ObjectKind::Fountain(fountain) = &fountain_obj.kind else {
            return false;
        };
        let (child, spread) = (fountain.child, fountain.spread);
        let center = fountain_obj.center();

        for _ in 0..FOUNTAIN_SPAWN_TRIES {
            let at = match spread {
                Spread::Fixed => center,
                Spread::Gaussian { sigma } => {
                    center + Vec2::new(gaussian(&mut self.rng), gaussian(&mut self.rng)) * sigma
                }
            };
            let (tx, ty) = self.field.tile_at(at);
            if self.field.is_wall(tx, ty) {
                continue;
            }
            let object = match child {
                PickupKind::Ammo => {
                    GameObject::ammo(at - Vec2::new(AMMO_SIZE / 2.0, AMMO_SIZE / 2.0), Some(id))
                }
                PickupKind::Crumb => {
                    GameObject::crumb(at - Vec2::new(CRUMB_SIZE / 2.0, CRUMB_SIZE / 2.0), Some(id))
                }
            };
            let child_id = self.add_object(object);
            if let Some(ObjectKind::Fountain(f)) = self.storage.get_mut(id).map(|o| &mut o.kind) {
                f.children.push(child_id);
            }
            return true;
        }
        debug!(fountain = id, "No free tile for fountain child");
        false
    }

    fn sense(&mut self) -> Vec<Observation> {
        let observations: Vec<Observation> = self
            .tanks
            .iter()
            .filter_map(|ctrl| self.observe_tank(ctrl.tank))
            .collect();
        for ctrl in &self.tanks {
            if let Some(tank) = self.storage.get_mut(ctrl.tank).and_then(GameObject::as_tank_mut) {
                tank.collided = false;
            }
        }
        observations
    }

    /// Build the observation for tank `id` from the current state.
    #[must_use]
    pub fn observe_tank(&self, id: ObjectId) -> Option<Observation> {
        let obj = self.storage.get(id)?;
        let tank = obj.as_tank()?;
        let center = obj.center();
        let bounds = obj.rect().inflate(self.settings.max_see);

        let mut friends = Vec::new();
        let mut foes = Vec::new();
        let mut objects = Vec::new();
        let mut visible = self.broadphase.query(&self.storage, bounds, false);
        visible.sort_unstable();
        for other_id in visible {
            if other_id == id {
                continue;
            }
            let Some(other) = self.storage.get(other_id) else {
                continue;
            };
            let loc: Loc = other.center().to_loc();
            match &other.kind {
                ObjectKind::Tank(t) if t.team == tank.team => friends.push(loc),
                ObjectKind::Tank(_) => foes.push(SeenTank {
                    loc,
                    angle: other.angle,
                }),
                ObjectKind::Ammo(_) => objects.push(PickupInfo {
                    loc,
                    kind: PickupKind::Ammo,
                }),
                ObjectKind::Crumb(_) => objects.push(PickupInfo {
                    loc,
                    kind: PickupKind::Crumb,
                }),
                _ => {}
            }
        }

        let control_points = self
            .control_points
            .iter()
            .filter_map(|&cp_id| {
                let cp = self.storage.get(cp_id)?;
                match &cp.kind {
                    ObjectKind::ControlPoint(state) => Some(ControlPointInfo {
                        loc: cp.center().to_loc(),
                        team: state.team,
                    }),
                    _ => None,
                }
            })
            .collect();

        Some(Observation {
            step: self.step,
            loc: center.to_loc(),
            angle: obj.angle,
            ammo: tank.ammo,
            respawn_in: tank.respawn_in,
            score: (self.score_red, self.score_blue),
            collided: tank.collided,
            friends,
            foes,
            control_points,
            objects,
            walls: local_wall_grid(&self.field, center, self.settings.max_see),
            selected: tank.selected,
            clicked: self.ui.clicked.map(|p| (p.x, p.y)),
            keys: self.ui.keys.clone(),
        })
    }

    /// Ask every controller for an action and apply it. Returns the tanks
    /// that fire this step.
    fn think(&mut self, observations: &[Observation]) -> Vec<ObjectId> {
        let budget = self.settings.think_time;
        let mut decisions = Vec::with_capacity(self.tanks.len());

        for (ctrl, observation) in self.tanks.iter_mut().zip(observations) {
            let (action, outcome, elapsed) = match &mut ctrl.control {
                Control::Replay(queue) => (queue.pop_front().unwrap_or(Action::NOOP), Outcome::Ok, 0.0),
                Control::Agent(agent) => {
                    let started = Instant::now();
                    let result = agent.observe(observation).and_then(|()| agent.act());
                    let elapsed = started.elapsed().as_secs_f64();
                    match result {
                        Ok(action) if !action.is_finite() => (
                            Action::NOOP,
                            Outcome::Fault(format!("non-finite action {action:?}")),
                            elapsed,
                        ),
                        Ok(_) if elapsed > budget => (Action::NOOP, Outcome::Timeout(elapsed), elapsed),
                        Ok(action) => (action, Outcome::Ok, elapsed),
                        Err(e) => (Action::NOOP, Outcome::Fault(e.to_string()), elapsed),
                    }
                }
            };
            ctrl.recorded.push(action);
            decisions.push((ctrl.tank, ctrl.team, ctrl.slot, action, outcome, elapsed));
        }

        let mut shooters = Vec::new();
        for (id, team, slot, action, outcome, elapsed) in decisions {
            self.stats.add_think_time(team, elapsed);
            match outcome {
                Outcome::Ok => {}
                Outcome::Timeout(t) => {
                    debug!(step = self.step, team = %team, slot, elapsed = t, "Think time exceeded");
                    self.stats.count_timeout(team);
                    self.push_log(format!(
                        "Step {}: {team} tank {slot} timed out ({:.1} ms)",
                        self.step,
                        t * 1000.0
                    ));
                }
                Outcome::Fault(message) => {
                    warn!(step = self.step, team = %team, slot, error = %message, "Agent fault");
                    self.stats.flag_error(team);
                    self.push_log(format!("Step {}: {team} tank {slot} error: {message}", self.step));
                }
            }
            if self.apply_action(id, action) {
                shooters.push(id);
            }
        }
        shooters
    }

    /// Turn, move and arm a live tank. Returns whether it fires.
    fn apply_action(&mut self, id: ObjectId, action: Action) -> bool {
        let max_turn = self.settings.max_turn;
        let max_speed = self.settings.max_speed;
        let Some(obj) = self.storage.get_mut(id) else {
            return false;
        };
        let alive = obj.as_tank().is_some_and(|t| t.is_alive());
        if !alive {
            return false;
        }
        let turn = angle_fix(action.turn).clamp(-max_turn, max_turn);
        obj.angle = angle_fix(obj.angle + turn);
        let speed = action.speed.clamp(-max_speed, max_speed);
        obj.position += Vec2::from_angle(obj.angle) * speed;

        match obj.as_tank_mut() {
            Some(tank) if action.shoot && tank.ammo > 0 => {
                tank.ammo -= 1;
                true
            }
            _ => false,
        }
    }

    fn shoot(&mut self, shooters: &[ObjectId], events: &mut StepEvents) {
        for &id in shooters {
            let Some(obj) = self.storage.get(id) else {
                continue;
            };
            let Some(team) = obj.as_tank().map(|t| t.team) else {
                continue;
            };
            let from = obj.sim_rect().center();
            let end = from + Vec2::from_angle(obj.angle) * self.settings.max_range;
            let first = self
                .broadphase
                .raycast(&self.storage, from, end, Some(id))
                .into_iter()
                .next();

            let mut shot = Shot {
                tank: id,
                team,
                from,
                to: end,
                hit: None,
            };
            if let Some(hit) = first {
                shot.to = hit.point;
                shot.hit = Some(hit.object);
                if let Some((victim, slot)) = self.kill(hit.object) {
                    self.push_log(format!(
                        "Step {}: {team} tank hit {victim} tank {slot}",
                        self.step
                    ));
                }
            }
            events.shots.push(shot);
        }
    }

    /// Schedule a live tank's respawn. Returns its team and slot.
    fn kill(&mut self, id: ObjectId) -> Option<(Team, usize)> {
        let spawn_time = self.settings.spawn_time;
        let tank = self.storage.get_mut(id).and_then(GameObject::as_tank_mut)?;
        if !tank.is_alive() {
            return None;
        }
        tank.respawn_in = spawn_time;
        Some((tank.team, tank.slot))
    }

    fn check_end(&self) -> Option<EndReason> {
        let ends = self.settings.end_condition;
        if ends.contains(EndCondition::SCORE) && (self.score_red == 0 || self.score_blue == 0) {
            return Some(EndReason::Score);
        }
        if ends.contains(EndCondition::CRUMBS)
            && !self
                .storage
                .iter()
                .any(|o| matches!(o.kind, ObjectKind::Crumb(_)))
        {
            return Some(EndReason::Crumbs);
        }
        None
    }

    fn prepare_movement(&mut self, events: &mut StepEvents) {
        let substeps = f64::from(SIMULATION_SUBSTEPS);
        let spawn_time = self.settings.spawn_time;
        for ctrl in &self.tanks {
            let Some(obj) = self.storage.get_mut(ctrl.tank) else {
                continue;
            };
            obj.body.delta = (obj.position - obj.body.position) * (1.0 / substeps);

            let respawn = match obj.as_tank_mut() {
                Some(tank) if tank.respawn_in == spawn_time => {
                    tank.ammo = 0;
                    Some((tank.spawn_position, tank.spawn_angle))
                }
                _ => None,
            };
            if let Some((position, angle)) = respawn {
                obj.position = position;
                obj.angle = angle;
                obj.body.position = position;
                obj.body.delta = Vec2::ZERO;
                events.respawns.push(ctrl.tank);
            }
        }
        self.broadphase.sort_movables(&self.storage);
    }

    fn substep(&mut self, events: &mut StepEvents) {
        self.broadphase.integrate(&mut self.storage);
        let pairs = self.broadphase.resolve(&mut self.storage);
        for (a, b) in pairs {
            self.collide(a, b, events);
            self.collide(b, a, events);
        }
    }

    /// Gameplay effect of `this` touching `other`. Only tanks react; dead
    /// tanks only register the bump.
    fn collide(&mut self, this: ObjectId, other: ObjectId, events: &mut StepEvents) {
        let Some((team, alive)) = self
            .storage
            .get(this)
            .and_then(GameObject::as_tank)
            .map(|t| (t.team, t.is_alive()))
        else {
            return;
        };
        let mode = self.settings.capture_mode;
        let Some(other_obj) = self.storage.get_mut(other) else {
            return;
        };
        let mut bumped = false;
        let taken = match &mut other_obj.kind {
            ObjectKind::Tank(_) | ObjectKind::Wall => {
                bumped = true;
                None
            }
            ObjectKind::ControlPoint(cp) if alive => {
                cp.touch(team, mode);
                None
            }
            ObjectKind::Ammo(pickup) if alive && !pickup.picked_up => {
                pickup.picked_up = true;
                Some((PickupKind::Ammo, pickup.parent))
            }
            ObjectKind::Crumb(pickup) if alive && !pickup.picked_up => {
                pickup.picked_up = true;
                Some((PickupKind::Crumb, pickup.parent))
            }
            _ => None,
        };
        if bumped {
            if let Some(tank) = self.storage.get_mut(this).and_then(GameObject::as_tank_mut) {
                tank.collided = true;
            }
        }
        if let Some((kind, parent)) = taken {
            self.take_pickup(this, team, other, kind, parent);
            events.pickups.push(PickupEvent {
                tank: this,
                team,
                kind,
            });
        }
    }

    fn take_pickup(
        &mut self,
        tank: ObjectId,
        team: Team,
        pickup: ObjectId,
        kind: PickupKind,
        parent: Option<ObjectId>,
    ) {
        self.remove_object(pickup);
        if let Some(ObjectKind::Fountain(f)) = parent
            .and_then(|p| self.storage.get_mut(p))
            .map(|o| &mut o.kind)
        {
            f.child_removed(pickup);
        }
        self.stats.count_pickup(team, kind == PickupKind::Crumb);
        if kind == PickupKind::Ammo {
            let amount = self.settings.ammo_amount;
            if let Some(t) = self.storage.get_mut(tank).and_then(GameObject::as_tank_mut) {
                t.ammo += amount;
            }
        }
    }

    fn commit_positions(&mut self) {
        for ctrl in &self.tanks {
            if let Some(obj) = self.storage.get_mut(ctrl.tank) {
                obj.position = obj.body.position;
                obj.body.delta = Vec2::ZERO;
                obj.angle = angle_fix(obj.angle);
            }
        }
        self.broadphase.sort_movables(&self.storage);
    }

    /// Stop the match: finalize stats, build the replay, notify agents.
    fn finish(&mut self, reason: EndReason) {
        let interrupted = reason == EndReason::Interrupted;
        self.state = if interrupted {
            GameState::Interrupt
        } else {
            GameState::Ended
        };

        self.stats.score_red = self.score_red;
        self.stats.score_blue = self.score_blue;
        self.stats.score = GameStats::normalized_score(self.score_red, self.score_blue);
        self.stats.steps = self.step;
        self.stats.interrupted = interrupted;

        if self.record {
            let mut settings = self.settings.clone();
            settings.max_steps = self.step.max(1);
            let actions = |team: Team| -> Vec<Vec<Action>> {
                self.tanks
                    .iter()
                    .filter(|c| c.team == team)
                    .map(|c| c.recorded.clone())
                    .collect()
            };
            self.replay = Some(ReplayData {
                version: REPLAY_VERSION,
                settings,
                field: (*self.field).clone(),
                name_red: self.names[0].clone(),
                name_blue: self.names[1].clone(),
                actions_red: actions(Team::Red),
                actions_blue: actions(Team::Blue),
                final_hash: self.state_hash(),
            });
        }

        let mut failures = Vec::new();
        for ctrl in &mut self.tanks {
            if let Control::Agent(agent) = &mut ctrl.control {
                if let Err(e) = agent.finalize(interrupted) {
                    warn!(team = %ctrl.team, slot = ctrl.slot, error = %e, "Agent finalize failed");
                    failures.push(format!("{} tank {}: finalize failed: {e}", ctrl.team, ctrl.slot));
                }
            }
        }
        for line in failures {
            self.push_log(line);
        }

        self.push_log(format!("Match ended ({reason:?}): {}", self.stats));
        info!(
            reason = ?reason,
            steps = self.step,
            score_red = self.score_red,
            score_blue = self.score_blue,
            "Match ended"
        );
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
    }

    /// Hash of the deterministic match state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.step.hash(&mut hasher);
        self.score_red.hash(&mut hasher);
        self.score_blue.hash(&mut hasher);

        let ids = self.storage.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            let Some(obj) = self.storage.get(id) else {
                continue;
            };
            id.hash(&mut hasher);
            obj.position.x.to_bits().hash(&mut hasher);
            obj.position.y.to_bits().hash(&mut hasher);
            obj.angle.to_bits().hash(&mut hasher);
            match &obj.kind {
                ObjectKind::Tank(t) => {
                    t.ammo.hash(&mut hasher);
                    t.respawn_in.hash(&mut hasher);
                }
                ObjectKind::ControlPoint(cp) => cp.team.hash(&mut hasher),
                _ => {}
            }
        }
        hasher.finish()
    }

    /// Snapshot of every tank, red first.
    #[must_use]
    pub fn tank_states(&self) -> Vec<TankSnapshot> {
        self.tanks
            .iter()
            .filter_map(|ctrl| {
                let obj = self.storage.get(ctrl.tank)?;
                let tank = obj.as_tank()?;
                Some(TankSnapshot {
                    id: ctrl.tank,
                    team: tank.team,
                    slot: tank.slot,
                    position: obj.position,
                    angle: obj.angle,
                    ammo: tank.ammo,
                    respawn_in: tank.respawn_in,
                })
            })
            .collect()
    }

    /// Select the `team` tanks whose centre lies inside `area`; deselect the
    /// rest of that team.
    pub fn select_tanks(&mut self, area: Rect, team: Team) {
        for ctrl in &self.tanks {
            let Some(obj) = self.storage.get_mut(ctrl.tank) else {
                continue;
            };
            let inside = area.contains_strict(obj.center());
            if let Some(tank) = obj.as_tank_mut() {
                if tank.team == team {
                    tank.selected = inside;
                }
            }
        }
    }

    /// Echo a click to every tank in the next observation.
    pub fn click(&mut self, position: Vec2) {
        self.ui.clicked = Some(position);
    }

    /// Echo a key press to every tank in the next observation.
    pub fn keypress(&mut self, key: impl Into<String>) {
        self.ui.keys.push(key.into());
    }

    /// Handle that stops the match before its next step.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Stop the match before its next step.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> GameState {
        self.state
    }

    /// Steps played.
    #[must_use]
    pub const fn step_count(&self) -> u32 {
        self.step
    }

    /// `(red, blue)` scores.
    #[must_use]
    pub const fn scores(&self) -> (i64, i64) {
        (self.score_red, self.score_blue)
    }

    /// Statistics, final once the match is over.
    #[must_use]
    pub const fn stats(&self) -> &GameStats {
        &self.stats
    }

    /// Match settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The field.
    #[must_use]
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Every object on the field.
    #[must_use]
    pub const fn objects(&self) -> &ObjectStorage {
        &self.storage
    }

    /// Sanitized `[red, blue]` agent names.
    #[must_use]
    pub const fn names(&self) -> &[String; 2] {
        &self.names
    }

    /// Match log lines.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Match log as one newline-separated string.
    #[must_use]
    pub fn log_text(&self) -> String {
        self.log.join("\n")
    }

    /// Recorded replay, available after a recorded match ends.
    #[must_use]
    pub const fn replay(&self) -> Option<&ReplayData> {
        self.replay.as_ref()
    }

    /// Take ownership of the recorded replay.
    pub fn take_replay(&mut self) -> Option<ReplayData> {
        self.replay.take()
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}
