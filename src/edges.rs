//! Classification of the left and right ends of the plane the body hangs on.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use bevy_transform::prelude::*;
use core::f32::consts::FRAC_PI_2;
use tracing::debug;

use crate::{
    body::{CapsuleSize, local_offset},
    config::ParkourConfig,
    hang_point::find_hang_point,
    query::GeometryQuery,
};

/// Outer corners are looked for this many capsule radii ahead of the body.
const OUTER_CORNER_REACH: f32 = 3.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// `-1` for left, `1` for right.
    pub fn sign(self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }

    /// A quarter turn toward this side.
    fn quarter_turn(self) -> Quat {
        Quat::from_rotation_y(-self.sign() * FRAC_PI_2)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum EdgeState {
    /// Not probed yet on this plane, or the plane keeps going.
    #[default]
    Unknown,
    /// The plane ends and nothing can be hung on past it.
    Block,
    /// The plane continues around a corner.
    Corner,
}

/// How an edge region reacts to the body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RegionKind {
    /// Acts as a wall the body cannot move into.
    Blocker,
    /// Starts a corner traversal to `target` once the body enters it.
    CornerTrigger { target: Transform },
}

/// An oriented box placed at one end of the hang plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeRegion {
    pub side: Side,
    pub center: Vec3,
    pub rotation: Quat,
    pub half_extents: Vec3,
    pub kind: RegionKind,
}

impl EdgeRegion {
    fn to_local(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.center)
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.to_local(point).abs().cmple(self.half_extents).all()
    }

    /// Pushes `point` back so it stays at least `clearance` away from the region's center,
    /// measured toward the body. Returns the corrected point if it had to move.
    pub fn keep_out(&self, point: Vec3, clearance: f32) -> Option<Vec3> {
        let local = self.to_local(point);
        if local.y.abs() > self.half_extents.y || local.z.abs() > self.half_extents.z {
            return None;
        }
        // The body approaches from the opposite side of the one the region sits on.
        let depth = clearance + self.side.sign() * local.x;
        if depth <= 0.0 {
            return None;
        }
        let outward = self.rotation * Vec3::X * -self.side.sign();
        Some(point + outward * depth)
    }
}

/// Handle into a [`RegionArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionId(usize);

/// Owns the short-lived edge regions. Slots are reused after a region is destroyed.
#[derive(Clone, Debug, Default)]
pub struct RegionArena {
    slots: Vec<Option<EdgeRegion>>,
}

impl RegionArena {
    pub fn spawn(&mut self, region: EdgeRegion) -> RegionId {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(region);
            return RegionId(index);
        }
        self.slots.push(Some(region));
        RegionId(self.slots.len() - 1)
    }

    pub fn get(&self, id: RegionId) -> Option<&EdgeRegion> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn destroy(&mut self, id: RegionId) -> Option<EdgeRegion> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &EdgeRegion)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|region| (RegionId(i), region)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct EdgeSlot {
    state: EdgeState,
    region: Option<RegionId>,
}

/// What the body ran into while hanging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EdgeContact {
    /// The body entered a corner trigger and should traverse to `target`.
    Corner { side: Side, target: Transform },
}

/// Resolves each end of the current hang plane at most once and keeps the matching regions.
#[derive(Clone, Debug, Default)]
pub struct EdgeClassifier {
    left: EdgeSlot,
    right: EdgeSlot,
    regions: RegionArena,
}

impl EdgeClassifier {
    fn slot(&self, side: Side) -> &EdgeSlot {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut EdgeSlot {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn state(&self, side: Side) -> EdgeState {
        self.slot(side).state
    }

    pub fn region(&self, side: Side) -> Option<&EdgeRegion> {
        self.slot(side).region.and_then(|id| self.regions.get(id))
    }

    pub fn regions(&self) -> &RegionArena {
        &self.regions
    }

    /// Forgets both edges and destroys their regions. Used whenever a plane is left.
    pub fn reset(&mut self) {
        self.left = EdgeSlot::default();
        self.right = EdgeSlot::default();
        self.regions.clear();
    }

    /// Probes each still-unknown side of the body's current plane.
    pub fn update_edge_statuses(
        &mut self,
        cfg: &ParkourConfig,
        capsule: CapsuleSize,
        world: &dyn GeometryQuery,
        location: Vec3,
        rotation: Quat,
    ) {
        for side in Side::BOTH {
            if self.state(side) != EdgeState::Unknown {
                continue;
            }

            let probe = location + local_offset(rotation, 0.0, side.sign() * capsule.radius / 2.0, 0.0);
            if find_hang_point(cfg, capsule, world, probe, rotation).is_some() {
                continue;
            }

            let corner = test_for_corner(cfg, capsule, world, location, rotation, side, false)
                .or_else(|| test_for_corner(cfg, capsule, world, location, rotation, side, true));
            let (state, kind) = match corner {
                Some(target) => (EdgeState::Corner, RegionKind::CornerTrigger { target }),
                None => (EdgeState::Block, RegionKind::Blocker),
            };
            debug!(?side, ?state, "resolved hang edge");

            let region = self.regions.spawn(EdgeRegion {
                side,
                center: location + local_offset(rotation, 0.0, side.sign() * capsule.radius, 0.0),
                rotation,
                half_extents: cfg.edge_region_half_extents,
                kind,
            });
            let slot = self.slot_mut(side);
            slot.state = state;
            slot.region = Some(region);
        }
    }

    /// Checks the body against the edge regions. Blockers push the body back, which is
    /// reflected in the returned location; corner triggers are reported as a contact.
    pub fn resolve_contacts(&self, location: Vec3, capsule: CapsuleSize) -> (Vec3, Option<EdgeContact>) {
        let mut location = location;
        let mut contact = None;
        for side in Side::BOTH {
            let Some(region) = self.region(side) else {
                continue;
            };
            match region.kind {
                RegionKind::Blocker => {
                    if let Some(corrected) = region.keep_out(location, capsule.radius) {
                        location = corrected;
                    }
                }
                RegionKind::CornerTrigger { target } => {
                    if contact.is_none() && region.contains(location) {
                        contact = Some(EdgeContact::Corner { side, target });
                    }
                }
            }
        }
        (location, contact)
    }
}

/// Looks for a hangable plane around an inner corner (turning toward `side` from slightly
/// behind) or an outer corner (turning away from `side` from ahead and beside the body).
fn test_for_corner(
    cfg: &ParkourConfig,
    capsule: CapsuleSize,
    world: &dyn GeometryQuery,
    location: Vec3,
    rotation: Quat,
    side: Side,
    outer: bool,
) -> Option<Transform> {
    let (turn, forward, right) = if outer {
        (
            side.quarter_turn().inverse(),
            OUTER_CORNER_REACH * capsule.radius,
            side.sign() * capsule.radius,
        )
    } else {
        (side.quarter_turn(), -capsule.radius, 0.0)
    };
    let probe_location = location + local_offset(rotation, forward, right, 0.0);
    find_hang_point(cfg, capsule, world, probe_location, rotation * turn)
}
