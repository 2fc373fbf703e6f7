//! Collision queries the parkour machine asks of the world.

use bevy_math::prelude::*;

/// A blocking hit reported by a [`GeometryQuery`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceHit {
    /// World-space impact point.
    pub point: Vec3,
    /// World-space surface normal at the impact point.
    pub normal: Vec3,
    /// Whether the hit surface belongs to a physics-simulated (dynamic) body.
    pub simulating_physics: bool,
}

/// Synchronous geometry queries against the world the body lives in.
///
/// Implementations own their filtering. In particular they must never report hits
/// against the body that is being moved.
pub trait GeometryQuery {
    /// Casts a ray from `start` to `end`, returning the closest blocking hit.
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit>;

    /// Sweeps an oriented box with the given half extents from `start` to `end`,
    /// returning the closest blocking hit.
    fn box_sweep(
        &self,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        half_extents: Vec3,
    ) -> Option<TraceHit>;
}

impl<T: GeometryQuery + ?Sized> GeometryQuery for &T {
    fn line_trace(&self, start: Vec3, end: Vec3) -> Option<TraceHit> {
        (**self).line_trace(start, end)
    }

    fn box_sweep(
        &self,
        start: Vec3,
        end: Vec3,
        rotation: Quat,
        half_extents: Vec3,
    ) -> Option<TraceHit> {
        (**self).box_sweep(start, end, rotation, half_extents)
    }
}
