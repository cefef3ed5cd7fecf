//! Game object model.
//!
//! Every entity on the field is a [`GameObject`]: a shared physical record
//! (position, size, shape, flags) plus an [`ObjectKind`] tag carrying the
//! variant-specific state. Behaviour is dispatched by the simulation on the
//! tag. Objects refer to each other only by [`ObjectId`] into the
//! simulation's [`ObjectStorage`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::capture::ControlPointState;
use crate::math::{Rect, Vec2};

/// Unique object identifier. Ids increase in insertion order.
pub type ObjectId = u64;

/// Edge length of a tank.
pub const TANK_SIZE: f64 = 16.0;
/// Distance of a spawned tank's corner from its spawn marker's corner.
pub const TANK_SPAWN_OFFSET: f64 = 2.0;
/// Diameter of a control point.
pub const CONTROL_POINT_SIZE: f64 = 24.0;
/// Diameter of an ammo pickup.
pub const AMMO_SIZE: f64 = 16.0;
/// Edge length of a crumb.
pub const CRUMB_SIZE: f64 = 4.0;
/// Edge length of an ammo fountain.
pub const AMMO_FOUNTAIN_SIZE: f64 = 16.0;
/// Edge length of a crumb fountain; also the sigma of its crumb spread.
pub const CRUMB_FOUNTAIN_SIZE: f64 = 50.0;
/// Edge length of a spawn marker.
pub const TANK_SPAWN_SIZE: f64 = 16.0;
/// Crumbs a crumb fountain keeps alive. Crumb fountains never refill.
pub const CRUMB_FOUNTAIN_CHILDREN: usize = 100;

/// Team affiliation. `Neutral` only appears as control point ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// Red team (left half).
    Red,
    /// Blue team (right half).
    Blue,
    /// Nobody.
    Neutral,
}

impl Team {
    /// Slot in per-team tallies.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Blue => 1,
            Self::Neutral => 2,
        }
    }

    /// The other playing team. Neutral has no opponent.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
            Self::Neutral => Self::Neutral,
        }
    }

    /// Lowercase name, as used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Collision shape. Circles use `width` as diameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Axis-aligned rectangle.
    Rect,
    /// Circle inscribed in the bounding box.
    Circle,
}

/// Kind of pickup, as reported in observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickupKind {
    /// Grants ammo.
    Ammo,
    /// Counts toward the crumb statistic; depletion may end the match.
    Crumb,
}

/// Tank-specific state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankState {
    /// Owning team.
    pub team: Team,
    /// Index within the team, also the index of its controller.
    pub slot: usize,
    /// Remaining shots.
    pub ammo: u32,
    /// `-1` while alive, otherwise steps until respawn.
    pub respawn_in: i32,
    /// Selected through the UI layer.
    pub selected: bool,
    /// Collided with a tank or wall since the last observation.
    pub collided: bool,
    /// Respawn position (top-left corner).
    pub spawn_position: Vec2,
    /// Respawn orientation.
    pub spawn_angle: f64,
}

impl TankState {
    /// Whether the tank is on the field and able to act.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.respawn_in == -1
    }
}

/// Ammo or crumb pickup state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pickup {
    /// Fountain that spawned this pickup, if any.
    pub parent: Option<ObjectId>,
    /// Set once a tank has taken it.
    pub picked_up: bool,
}

/// How a fountain scatters its children around its centre.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Spread {
    /// Every child at the centre.
    Fixed,
    /// Independent gaussian offset per axis.
    Gaussian {
        /// Standard deviation in world units.
        sigma: f64,
    },
}

/// Fountain state: keeps a minimum number of live children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FountainState {
    /// What the fountain spawns.
    pub child: PickupKind,
    /// Live children to maintain.
    pub min_children: usize,
    /// Steps to wait before refilling; `-1` never refills.
    pub delay: i32,
    /// Current countdown; `-1` when idle.
    pub countdown: i32,
    /// Live children, in spawn order.
    pub children: Vec<ObjectId>,
    /// Spawn position distribution.
    pub spread: Spread,
}

impl FountainState {
    /// Ammo fountain keeping one pickup alive, refilling after `delay` steps.
    #[must_use]
    pub fn ammo(delay: i32) -> Self {
        Self {
            child: PickupKind::Ammo,
            min_children: 1,
            delay,
            countdown: -1,
            children: Vec::new(),
            spread: Spread::Fixed,
        }
    }

    /// Crumb fountain: fills once with a gaussian cloud of crumbs.
    #[must_use]
    pub fn crumbs() -> Self {
        Self {
            child: PickupKind::Crumb,
            min_children: CRUMB_FOUNTAIN_CHILDREN,
            delay: -1,
            countdown: -1,
            children: Vec::new(),
            spread: Spread::Gaussian {
                sigma: CRUMB_FOUNTAIN_SIZE,
            },
        }
    }

    /// Advance the refill countdown by one step.
    ///
    /// Returns `true` when a child should be spawned this step.
    pub fn tick(&mut self) -> bool {
        if self.countdown > -1 {
            self.countdown -= 1;
        }
        if self.countdown == -1 && self.children.len() < self.min_children {
            self.countdown = self.delay;
        }
        self.countdown == 0
    }

    /// Forget a child that left the field.
    pub fn child_removed(&mut self, child: ObjectId) {
        self.children.retain(|&c| c != child);
    }
}

/// Variant-specific state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Agent-controlled tank.
    Tank(TankState),
    /// Static solid wall.
    Wall,
    /// Capturable control point.
    ControlPoint(ControlPointState),
    /// Ammo pickup.
    Ammo(Pickup),
    /// Crumb pickup.
    Crumb(Pickup),
    /// Ammo or crumb fountain.
    Fountain(FountainState),
    /// Non-physical spawn marker.
    TankSpawn {
        /// Team spawning here.
        team: Team,
        /// Orientation of spawned tanks.
        angle: f64,
    },
}

/// Solver-internal state: simulated position and per-substep delta.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct Body {
    /// Position during substeps; committed back after physics.
    pub position: Vec2,
    /// Displacement applied each substep.
    pub delta: Vec2,
    /// Moved since the last broadphase pass.
    pub moved: bool,
}

/// A single entity on the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObject {
    /// Identifier, assigned on insertion.
    pub id: ObjectId,
    /// Committed top-left position (the tank's target while acting).
    pub position: Vec2,
    /// Orientation in radians.
    pub angle: f64,
    /// Bounding box width (diameter for circles).
    pub width: f64,
    /// Bounding box height.
    pub height: f64,
    /// Collision shape.
    pub shape: Shape,
    /// Takes part in penetration resolution.
    pub solid: bool,
    /// Moved by the solver.
    pub movable: bool,
    /// Takes part in collision detection at all.
    pub physical: bool,
    /// Variant state.
    pub kind: ObjectKind,
    pub(crate) body: Body,
}

impl GameObject {
    fn base(position: Vec2, size: f64, shape: Shape, kind: ObjectKind) -> Self {
        Self {
            id: 0,
            position,
            angle: 0.0,
            width: size,
            height: size,
            shape,
            solid: true,
            movable: false,
            physical: true,
            kind,
            body: Body {
                position,
                ..Body::default()
            },
        }
    }

    /// Tank at `position` facing `angle`; it respawns at the same place.
    #[must_use]
    pub fn tank(position: Vec2, angle: f64, team: Team, slot: usize) -> Self {
        let mut obj = Self::base(
            position,
            TANK_SIZE,
            Shape::Circle,
            ObjectKind::Tank(TankState {
                team,
                slot,
                ammo: 0,
                respawn_in: -1,
                selected: false,
                collided: false,
                spawn_position: position,
                spawn_angle: angle,
            }),
        );
        obj.angle = angle;
        obj.movable = true;
        obj
    }

    /// Wall covering `rect`.
    #[must_use]
    pub fn wall(rect: Rect) -> Self {
        let position = Vec2::new(rect.x, rect.y);
        let mut obj = Self::base(position, rect.w, Shape::Rect, ObjectKind::Wall);
        obj.height = rect.h;
        obj
    }

    /// Neutral control point with its top-left corner at `position`.
    #[must_use]
    pub fn control_point(position: Vec2) -> Self {
        let mut obj = Self::base(
            position,
            CONTROL_POINT_SIZE,
            Shape::Circle,
            ObjectKind::ControlPoint(ControlPointState::default()),
        );
        obj.solid = false;
        obj
    }

    /// Ammo pickup.
    #[must_use]
    pub fn ammo(position: Vec2, parent: Option<ObjectId>) -> Self {
        let mut obj = Self::base(
            position,
            AMMO_SIZE,
            Shape::Circle,
            ObjectKind::Ammo(Pickup {
                parent,
                picked_up: false,
            }),
        );
        obj.solid = false;
        obj
    }

    /// Crumb pickup.
    #[must_use]
    pub fn crumb(position: Vec2, parent: Option<ObjectId>) -> Self {
        let mut obj = Self::base(
            position,
            CRUMB_SIZE,
            Shape::Rect,
            ObjectKind::Crumb(Pickup {
                parent,
                picked_up: false,
            }),
        );
        obj.solid = false;
        obj
    }

    /// Fountain; `state` decides what it spawns.
    #[must_use]
    pub fn fountain(position: Vec2, state: FountainState) -> Self {
        let size = match state.child {
            PickupKind::Ammo => AMMO_FOUNTAIN_SIZE,
            PickupKind::Crumb => CRUMB_FOUNTAIN_SIZE,
        };
        let mut obj = Self::base(position, size, Shape::Rect, ObjectKind::Fountain(state));
        obj.physical = false;
        obj
    }

    /// Spawn marker.
    #[must_use]
    pub fn tank_spawn(position: Vec2, team: Team, angle: f64) -> Self {
        let mut obj = Self::base(
            position,
            TANK_SPAWN_SIZE,
            Shape::Rect,
            ObjectKind::TankSpawn { team, angle },
        );
        obj.angle = angle;
        obj.physical = false;
        obj
    }

    /// Committed bounding box.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }

    /// Committed centre.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        self.rect().center()
    }

    /// Bounding box at the solver's current position.
    pub(crate) fn sim_rect(&self) -> Rect {
        Rect::new(self.body.position.x, self.body.position.y, self.width, self.height)
    }

    /// Tank state, if this is a tank.
    #[must_use]
    pub fn as_tank(&self) -> Option<&TankState> {
        match &self.kind {
            ObjectKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    /// Mutable tank state, if this is a tank.
    pub fn as_tank_mut(&mut self) -> Option<&mut TankState> {
        match &mut self.kind {
            ObjectKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    /// Pickup kind and state, if this is a pickup.
    #[must_use]
    pub fn as_pickup(&self) -> Option<(PickupKind, &Pickup)> {
        match &self.kind {
            ObjectKind::Ammo(p) => Some((PickupKind::Ammo, p)),
            ObjectKind::Crumb(p) => Some((PickupKind::Crumb, p)),
            _ => None,
        }
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            ObjectKind::Tank(_) => "tank",
            ObjectKind::Wall => "wall",
            ObjectKind::ControlPoint(_) => "control_point",
            ObjectKind::Ammo(_) => "ammo",
            ObjectKind::Crumb(_) => "crumb",
            ObjectKind::Fountain(_) => "fountain",
            ObjectKind::TankSpawn { .. } => "tank_spawn",
        }
    }
}

/// Id-indexed object table owned by the simulation.
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    objects: HashMap<ObjectId, GameObject>,
    next_id: ObjectId,
}

impl ObjectStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert an object and return its new id.
    pub fn insert(&mut self, mut object: GameObject) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        object.id = id;
        self.objects.insert(id, object);
        id
    }

    /// Remove an object by id.
    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        self.objects.remove(&id)
    }

    /// Get an object by id.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    /// Get a mutable reference to an object by id.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    /// Check if an object exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of live objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Ids in insertion order, for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.objects.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over all objects (not in deterministic order).
    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }
}

impl Default for ObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_ids_increase() {
        let mut storage = ObjectStorage::new();
        let a = storage.insert(GameObject::wall(Rect::new(0.0, 0.0, 16.0, 16.0)));
        let b = storage.insert(GameObject::control_point(Vec2::new(40.0, 40.0)));
        assert!(b > a);
        assert_eq!(storage.get(a).map(|o| o.id), Some(a));
        storage.remove(a);
        let c = storage.insert(GameObject::ammo(Vec2::ZERO, None));
        assert!(c > b);
        assert_eq!(storage.sorted_ids(), vec![b, c]);
    }

    #[test]
    fn test_object_flags() {
        let tank = GameObject::tank(Vec2::ZERO, 0.0, Team::Red, 0);
        assert!(tank.solid && tank.movable && tank.physical);
        assert_eq!(tank.shape, Shape::Circle);

        let cp = GameObject::control_point(Vec2::ZERO);
        assert!(!cp.solid && cp.physical && !cp.movable);

        let spawn = GameObject::tank_spawn(Vec2::ZERO, Team::Blue, 0.0);
        assert!(!spawn.physical);

        let fountain = GameObject::fountain(Vec2::ZERO, FountainState::crumbs());
        assert!(!fountain.physical);
        assert_eq!(fountain.width, CRUMB_FOUNTAIN_SIZE);
    }

    #[test]
    fn test_ammo_fountain_countdown() {
        let mut fountain = FountainState::ammo(3);
        // Empty: countdown starts at the delay, spawns when it hits zero.
        assert!(!fountain.tick());
        assert_eq!(fountain.countdown, 3);
        assert!(!fountain.tick());
        assert!(!fountain.tick());
        assert!(fountain.tick());
        fountain.children.push(7);
        // Full: goes idle.
        assert!(!fountain.tick());
        assert_eq!(fountain.countdown, -1);
        assert!(!fountain.tick());

        fountain.child_removed(7);
        assert!(fountain.children.is_empty());
        assert!(!fountain.tick());
        assert_eq!(fountain.countdown, 3);
    }

    #[test]
    fn test_crumb_fountain_never_refills() {
        let mut fountain = FountainState::crumbs();
        for _ in 0..50 {
            assert!(!fountain.tick());
        }
        assert_eq!(fountain.countdown, -1);
    }

    #[test]
    fn test_team_opponent() {
        assert_eq!(Team::Red.opponent(), Team::Blue);
        assert_eq!(Team::Blue.opponent(), Team::Red);
        assert_eq!(Team::Neutral.opponent(), Team::Neutral);
    }
}
