//! Fixtures shared by the unit tests: an axis-aligned box world and a plain body.

use bevy_math::prelude::*;

use crate::{
    body::{CapsuleSize, ParkourBody},
    query::{GeometryQuery, TraceHit},
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct Block {
    pub min: Vec3,
    pub max: Vec3,
    pub simulating_physics: bool,
}

/// Static boxes. Sweeps are exact as long as the swept box is yaw-aligned to a world axis.
#[derive(Clone, Debug, Default)]
pub(crate) struct BoxWorld {
    pub blocks: Vec<Block>,
}

impl BoxWorld {
    pub fn with(mut self, min: Vec3, max: Vec3) -> Self {
        self.blocks.push(Block {
            min,
            max,
            simulating_physics: false,
        });
        self
    }

    pub fn with_dynamic(mut self, min: Vec3, max: Vec3) -> Self {
        self.blocks.push(Block {
            min,
            max,
            simulating_physics: true,
        });
        self
    }

    /// A wall facing +Z whose front face sits at `z = front_z`, spanning `x` in `[x_min, x_max]`,
    /// `height` tall and `depth` deep.
    pub fn with_wall(self, x_min: f32, x_max: f32, front_z: f32, height: f32, depth: f32) -> Self {
        self.with(
            Vec3::new(x_min, 0.0, front_z - depth),
            Vec3::new(x_max, height, front_z),
        )
    }

    pub fn with_floor(self) -> Self {
        self.with(Vec3::new(-50.0, -1.0, -50.0), Vec3::new(50.0, 0.0, 50.0))
    }

    fn cast(&self, start: Vec3, end: Vec3, inflate: Vec3) -> Option<TraceHit> {
        let delta = end - start;
        let mut best: Option<(f32, TraceHit)> = None;
        for block in &self.blocks {
            let min = block.min - inflate;
            let max = block.max + inflate;
            let Some((t, normal)) = segment_vs_aabb(start, delta, min, max) else {
                continue;
            };
            if best.is_some_and(|(best_t, _)| best_t <= t) {
                continue;
            }
            best = Some((
                t,
                TraceHit {
                    point: start + delta * t - normal * inflate,
                    normal,
                    simulating_physics: block.simulating_physics,
                },
            ));
        }
        best.map(|(_, hit)| hit)
    }
}

/// Slab test. Segments starting inside a box do not hit it.
fn segment_vs_aabb(start: Vec3, delta: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let inside = start.cmpgt(min).all() && start.cmplt(max).all();
    if inside {
        return None;
    }
    let mut t_enter = 0.0_f32;
    let mut t_exit = 1.0_f32;
    let mut normal = Vec3::ZERO;
    for axis in 0..3 {
        if delta[axis].abs() < 1.0e-9 {
            if start[axis] < min[axis] || start[axis] > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / delta[axis];
        let mut t0 = (min[axis] - start[axis]) * inv;
        let mut t1 = (max[axis] - start[axis]) * inv;
        let mut axis_normal = Vec3::ZERO;
        axis_normal[axis] = -delta[axis].signum();
        if t0 > t1 {
            core::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_enter {
            t_enter = t0;
            normal = axis_normal;
        }
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }
    if normal == Vec3::ZERO {
        // Touching at t = 0 without entering through a face.
        return None;
    }
    Some((t_enter, normal))
}

impl GeometryQuery for BoxWorld {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit> {
        self.cast(start, end, Vec3::ZERO)
    }

    fn box_sweep(
        &self,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        half_extents: Vec3,
    ) -> Option<TraceHit> {
        let world_extents = (rotation * Vec3::X * half_extents.x).abs()
            + (rotation * Vec3::Y * half_extents.y).abs()
            + (rotation * Vec3::Z * half_extents.z).abs();
        self.cast(start, end, world_extents)
    }
}

/// A body with directly inspectable outputs.
#[derive(Clone, Debug)]
pub(crate) struct TestBody {
    pub capsule: CapsuleSize,
    pub location: Vec3,
    pub rotation: Quat,
    pub view_rotation: Quat,
    pub velocity: Vec3,
    pub gravity_scale: f32,
    pub collision_enabled: bool,
    pub input_enabled: bool,
    pub plane_constraint: Option<Dir3>,
    pub movement_input: Vec2,
    pub grounded: bool,
    pub crouching: bool,
}

impl Default for TestBody {
    fn default() -> Self {
        Self {
            capsule: CapsuleSize::default(),
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            view_rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            gravity_scale: 1.0,
            collision_enabled: true,
            input_enabled: true,
            plane_constraint: None,
            movement_input: Vec2::ZERO,
            grounded: true,
            crouching: false,
        }
    }
}

impl TestBody {
    pub fn at(location: Vec3) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    pub fn airborne(mut self) -> Self {
        self.grounded = false;
        self
    }
}

impl ParkourBody for TestBody {
    fn location(&self) -> Vec3 {
        self.location
    }

    fn set_location(&mut self, location: Vec3) {
        self.location = location;
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    fn view_rotation(&self) -> Quat {
        self.view_rotation
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    fn set_collision_enabled(&mut self, enabled: bool) {
        self.collision_enabled = enabled;
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn set_plane_constraint(&mut self, normal: Option<Dir3>) {
        self.plane_constraint = normal;
    }

    fn movement_input(&self) -> Vec2 {
        self.movement_input
    }

    fn is_grounded(&self) -> bool {
        self.grounded
    }

    fn is_crouching(&self) -> bool {
        self.crouching
    }

    fn crouch(&mut self) {
        self.crouching = true;
    }

    fn uncrouch(&mut self) {
        self.crouching = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_reports_entry_face() {
        let world = BoxWorld::default().with_wall(-1.0, 1.0, -1.0, 2.0, 1.0);
        let hit = world
            .line_trace(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, -3.0))
            .unwrap();
        assert!(hit.point.abs_diff_eq(Vec3::new(0.0, 1.0, -1.0), 1.0e-5));
        assert_eq!(hit.normal, Vec3::Z);

        let top = world
            .line_trace(Vec3::new(0.0, 3.0, -1.5), Vec3::new(0.0, 0.5, -1.5))
            .unwrap();
        assert!((top.point.y - 2.0).abs() < 1.0e-5);
        assert_eq!(top.normal, Vec3::Y);
    }

    #[test]
    fn ray_starting_inside_ignores_box() {
        let world = BoxWorld::default().with_wall(-1.0, 1.0, -1.0, 2.0, 1.0);
        assert!(
            world
                .line_trace(Vec3::new(0.0, 1.0, -1.5), Vec3::new(0.0, 1.0, 3.0))
                .is_none()
        );
    }

    #[test]
    fn sweep_accounts_for_box_size() {
        let world = BoxWorld::default().with_wall(-1.0, 1.0, -1.0, 2.0, 1.0);
        // Passes 0.05 above the wall with the center, but the box is 0.1 tall.
        let hit = world.box_sweep(
            Vec3::new(0.0, 2.05, 0.0),
            Vec3::new(0.0, 2.05, -3.0),
            Quat::IDENTITY,
            Vec3::new(0.1, 0.1, 0.1),
        );
        assert!(hit.is_some());
        let miss = world.box_sweep(
            Vec3::new(0.0, 2.2, 0.0),
            Vec3::new(0.0, 2.2, -3.0),
            Quat::IDENTITY,
            Vec3::new(0.1, 0.1, 0.1),
        );
        assert!(miss.is_none());
    }
}
