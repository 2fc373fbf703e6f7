//! Obstruction scans around the body: ahead, behind, both sides, up and down.

use bevy_math::prelude::*;
use bevy_reflect::prelude::*;
use tracing::trace;

use crate::{
    body::{CapsuleSize, local_offset, yaw_only},
    query::{GeometryQuery, TraceHit},
};

/// Body-relative directions scanned for obstructions every tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum TraceDirection {
    Ahead,
    Behind,
    Left,
    Right,
    Up,
    Down,
}

impl TraceDirection {
    pub const ALL: [TraceDirection; 6] = [
        TraceDirection::Ahead,
        TraceDirection::Behind,
        TraceDirection::Left,
        TraceDirection::Right,
        TraceDirection::Up,
        TraceDirection::Down,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// World-space unit vector for a body with the given rotation. Only the yaw is used.
    pub fn to_world(self, rotation: Quat) -> Vec3 {
        let yaw = yaw_only(rotation);
        match self {
            TraceDirection::Ahead => local_offset(yaw, 1.0, 0.0, 0.0),
            TraceDirection::Behind => local_offset(yaw, -1.0, 0.0, 0.0),
            TraceDirection::Left => local_offset(yaw, 0.0, -1.0, 0.0),
            TraceDirection::Right => local_offset(yaw, 0.0, 1.0, 0.0),
            TraceDirection::Up => Vec3::Y,
            TraceDirection::Down => Vec3::NEG_Y,
        }
    }

    /// How far the scan in this direction reaches.
    pub fn trace_length(self, capsule: CapsuleSize, side_radius_factor: f32) -> f32 {
        match self {
            TraceDirection::Up | TraceDirection::Down => capsule.half_height + capsule.radius,
            _ => capsule.radius * side_radius_factor,
        }
    }
}

/// A direction that started or stopped being blocked during a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionChange {
    Blocked(TraceDirection),
    Cleared(TraceDirection),
}

/// Remembers which directions around the body are obstructed.
#[derive(Clone, Debug, Default)]
pub struct DirectionScanner {
    blocked: [bool; 6],
    hits: [Option<TraceHit>; 6],
}

impl DirectionScanner {
    /// Casts one ray per direction from `origin` and returns the changes since the last scan,
    /// in [`TraceDirection::ALL`] order. The scan is complete before any change is reported,
    /// so handlers always see the state of every direction.
    pub fn update(
        &mut self,
        world: &dyn GeometryQuery,
        origin: Vec3,
        rotation: Quat,
        capsule: CapsuleSize,
        side_radius_factor: f32,
    ) -> Vec<DirectionChange> {
        let mut changes = Vec::new();
        for direction in TraceDirection::ALL {
            let length = direction.trace_length(capsule, side_radius_factor);
            let end = origin + direction.to_world(rotation) * length;
            let hit = world.line_trace(origin, end);

            let i = direction.index();
            let was_blocked = self.blocked[i];
            self.blocked[i] = hit.is_some();
            self.hits[i] = hit;

            match (was_blocked, hit.is_some()) {
                (false, true) => changes.push(DirectionChange::Blocked(direction)),
                (true, false) => changes.push(DirectionChange::Cleared(direction)),
                _ => {}
            }
        }
        if !changes.is_empty() {
            trace!(?changes, "blocked directions changed");
        }
        changes
    }

    pub fn is_blocked(&self, direction: TraceDirection) -> bool {
        self.blocked[direction.index()]
    }

    /// The hit of the most recent scan in `direction`, if it was blocked.
    pub fn hit(&self, direction: TraceDirection) -> Option<&TraceHit> {
        self.hits[direction.index()].as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::BoxWorld;

    const FACTOR: f32 = 5.0;

    fn scan(scanner: &mut DirectionScanner, world: &BoxWorld) -> Vec<DirectionChange> {
        scanner.update(
            world,
            Vec3::new(0.0, 1.0, 0.0),
            Quat::IDENTITY,
            CapsuleSize::default(),
            FACTOR,
        )
    }

    #[test]
    fn reports_walls_and_floor() {
        // Wall 1 m to the left, floor 1 m below.
        let world = BoxWorld::default()
            .with_floor()
            .with(Vec3::new(-2.0, 0.0, -5.0), Vec3::new(-1.0, 3.0, 5.0));
        let mut scanner = DirectionScanner::default();
        let changes = scan(&mut scanner, &world);

        assert_eq!(
            changes,
            vec![
                DirectionChange::Blocked(TraceDirection::Left),
                DirectionChange::Blocked(TraceDirection::Down),
            ]
        );
        assert!(scanner.is_blocked(TraceDirection::Left));
        assert!(!scanner.is_blocked(TraceDirection::Right));
        assert_eq!(scanner.hit(TraceDirection::Left).unwrap().normal, Vec3::X);
    }

    #[test]
    fn only_edges_are_reported() {
        let walled = BoxWorld::default().with(Vec3::new(1.0, 0.0, -5.0), Vec3::new(2.0, 3.0, 5.0));
        let mut scanner = DirectionScanner::default();

        assert_eq!(
            scan(&mut scanner, &walled),
            vec![DirectionChange::Blocked(TraceDirection::Right)]
        );
        assert!(scan(&mut scanner, &walled).is_empty());
        assert_eq!(
            scan(&mut scanner, &BoxWorld::default()),
            vec![DirectionChange::Cleared(TraceDirection::Right)]
        );
        assert!(scanner.hit(TraceDirection::Right).is_none());
    }

    #[test]
    fn side_scans_are_longer_than_vertical_ones() {
        let capsule = CapsuleSize::default();
        assert_eq!(
            TraceDirection::Up.trace_length(capsule, FACTOR),
            capsule.half_height + capsule.radius
        );
        assert_eq!(
            TraceDirection::Ahead.trace_length(capsule, FACTOR),
            capsule.radius * FACTOR
        );
        // Ceiling 1.5 m above is out of reach, a wall 1.5 m ahead is not.
        let world = BoxWorld::default()
            .with(Vec3::new(-5.0, 2.5, -5.0), Vec3::new(5.0, 3.0, 5.0))
            .with(Vec3::new(-5.0, 0.0, -3.0), Vec3::new(5.0, 2.0, -1.5));
        let mut scanner = DirectionScanner::default();
        scan(&mut scanner, &world);
        assert!(!scanner.is_blocked(TraceDirection::Up));
        assert!(scanner.is_blocked(TraceDirection::Ahead));
    }

    #[test]
    fn directions_follow_body_yaw() {
        let turned = Quat::from_rotation_y(core::f32::consts::FRAC_PI_2);
        assert!(
            TraceDirection::Ahead
                .to_world(turned)
                .abs_diff_eq(Vec3::NEG_X, 1.0e-6)
        );
        assert!(
            TraceDirection::Right
                .to_world(turned)
                .abs_diff_eq(Vec3::NEG_Z, 1.0e-6)
        );
        assert_eq!(TraceDirection::Down.to_world(turned), Vec3::NEG_Y);
    }
}
