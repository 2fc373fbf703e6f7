//! Adapters between the parkour state machine and an Avian world.

use core::time::Duration;

use crate::{
    ParkourControllerState,
    body::ParkourBody,
    prelude::*,
    query::{GeometryQuery, TraceHit},
};

/// [`GeometryQuery`] over a [`SpatialQueryPipeline`].
///
/// `simulating_physics` tells whether a hit collider belongs to a dynamic rigid body.
pub struct AvianGeometry<'a, F> {
    pipeline: &'a SpatialQueryPipeline,
    filter: &'a SpatialQueryFilter,
    simulating_physics: F,
}

impl<'a, F: Fn(Entity) -> bool> AvianGeometry<'a, F> {
    pub fn new(
        pipeline: &'a SpatialQueryPipeline,
        filter: &'a SpatialQueryFilter,
        simulating_physics: F,
    ) -> Self {
        Self {
            pipeline,
            filter,
            simulating_physics,
        }
    }
}

impl<F: Fn(Entity) -> bool> GeometryQuery for AvianGeometry<'_, F> {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit> {
        let (direction, distance) = Dir3::new_and_length(end - start).ok()?;
        let hit = self
            .pipeline
            .cast_ray(start, direction, distance, true, self.filter)?;
        Some(TraceHit {
            point: start + direction * hit.distance,
            normal: hit.normal,
            simulating_physics: (self.simulating_physics)(hit.entity),
        })
    }

    fn box_sweep(
        &self,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        half_extents: Vec3,
    ) -> Option<TraceHit> {
        let (direction, distance) = Dir3::new_and_length(end - start).ok()?;
        let size = half_extents * 2.0;
        let shape = Collider::cuboid(size.x, size.y, size.z);
        let hit = self.pipeline.cast_shape(
            &shape,
            start,
            rotation,
            direction,
            &ShapeCastConfig::from_max_distance(distance),
            self.filter,
        )?;
        Some(TraceHit {
            point: hit.point1,
            normal: hit.normal1,
            simulating_physics: (self.simulating_physics)(hit.entity),
        })
    }
}

/// [`ParkourBody`] over a controller's components for the duration of one tick.
///
/// Crouch requests are only recorded here; the integrator resolves them afterwards,
/// standing up only when there is room.
pub struct AvianBody<'a> {
    pub transform: &'a mut Transform,
    pub velocity: &'a mut Vec3,
    pub state: &'a mut ParkourControllerState,
    pub view_rotation: Quat,
    pub movement_input: Vec2,
    /// Grace period after leaving the ground during which the body still counts as grounded.
    pub coyote_time: Duration,
}

impl ParkourBody for AvianBody<'_> {
    fn location(&self) -> Vec3 {
        self.transform.translation
    }

    fn set_location(&mut self, location: Vec3) {
        self.transform.translation = location;
    }

    fn rotation(&self) -> Quat {
        self.transform.rotation
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.transform.rotation = rotation;
    }

    fn view_rotation(&self) -> Quat {
        self.view_rotation
    }

    fn velocity(&self) -> Vec3 {
        *self.velocity
    }

    fn set_velocity(&mut self, velocity: Vec3) {
        *self.velocity = velocity;
    }

    fn set_gravity_scale(&mut self, scale: f32) {
        self.state.gravity_scale = scale;
    }

    fn set_collision_enabled(&mut self, enabled: bool) {
        self.state.collision_enabled = enabled;
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.state.input_enabled = enabled;
    }

    fn set_plane_constraint(&mut self, normal: Option<Dir3>) {
        self.state.plane_constraint = normal;
    }

    fn movement_input(&self) -> Vec2 {
        if self.state.input_enabled {
            self.movement_input
        } else {
            Vec2::ZERO
        }
    }

    fn is_grounded(&self) -> bool {
        self.state.grounded.is_some() || self.state.last_ground.elapsed() < self.coyote_time
    }

    fn is_crouching(&self) -> bool {
        self.state.crouching
    }

    fn crouch(&mut self) {
        self.state.crouch_requested = true;
        self.state.crouching = true;
    }

    fn uncrouch(&mut self) {
        self.state.crouch_requested = false;
    }
}
