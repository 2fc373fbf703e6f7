//! Geometric validation of ledge-hang attachment points.

use bevy_math::prelude::*;
use bevy_transform::prelude::*;

use crate::{
    body::{CapsuleSize, local_offset, yaw_facing, yaw_only},
    config::ParkourConfig,
    query::GeometryQuery,
};

/// Extra length added to probes so they reach exactly the surface they are aimed at.
const PROBE_MARGIN: f32 = 0.01;
/// The surface probe runs this far below the bottom of the hands.
const SURFACE_PROBE_DROP: f32 = 0.03;

/// Works out where a body at `origin` facing `origin_rotation` would hang, if anywhere.
///
/// Runs a fixed chain of probes and stops at the first one that fails:
/// a forward probe for a wall that is not physics-simulated, a box sweep checking the
/// hands fit over the ledge, a downward probe measuring the ledge height, and three probes
/// across the corrected body position checking the body fits below the ledge.
///
/// On success the returned transform has unit scale and a yaw-only rotation facing the wall.
pub fn find_hang_point(
    cfg: &ParkourConfig,
    capsule: CapsuleSize,
    world: &dyn GeometryQuery,
    origin: Vec3,
    origin_rotation: Quat,
) -> Option<Transform> {
    let origin_rotation = yaw_only(origin_rotation);
    let hand = cfg.hand_half_extents;

    let surface_start = origin
        + local_offset(
            origin_rotation,
            -capsule.radius,
            0.0,
            cfg.grab_height - hand.y - SURFACE_PROBE_DROP,
        );
    let surface_end = surface_start
        + local_offset(
            origin_rotation,
            cfg.grab_reach + PROBE_MARGIN + capsule.radius,
            0.0,
            0.0,
        );
    let surface = world.line_trace(surface_start, surface_end)?;
    if surface.simulating_physics {
        return None;
    }

    let attach_rotation = yaw_facing(-surface.normal)?;
    let mut attach_location =
        surface.point + local_offset(attach_rotation, -cfg.attach_distance, 0.0, 0.0);

    let hands_start = attach_location + Vec3::Y * (cfg.grab_height + hand.y / 2.0);
    let hands_end = hands_start + local_offset(attach_rotation, cfg.attach_distance + hand.z, 0.0, 0.0);
    if world
        .box_sweep(hands_start, hands_end, attach_rotation, hand)
        .is_some()
    {
        return None;
    }

    let ledge_start = surface.point
        + Vec3::Y * (cfg.grab_height + PROBE_MARGIN)
        + local_offset(attach_rotation, hand.z, 0.0, 0.0);
    let ledge_end = ledge_start - Vec3::Y * (cfg.grab_height + PROBE_MARGIN);
    let ledge = world.line_trace(ledge_start, ledge_end)?;

    attach_location.y = ledge.point.y - cfg.attach_height;

    let body_probes = [
        (
            local_offset(attach_rotation, -capsule.radius, 0.0, 0.0),
            local_offset(attach_rotation, capsule.radius, 0.0, 0.0),
        ),
        (
            local_offset(attach_rotation, 0.0, -capsule.radius, 0.0),
            local_offset(attach_rotation, 0.0, capsule.radius, 0.0),
        ),
        (
            local_offset(attach_rotation, 0.0, 0.0, capsule.half_height),
            local_offset(attach_rotation, capsule.radius, 0.0, -capsule.half_height),
        ),
    ];
    for (from, to) in body_probes {
        if world
            .line_trace(attach_location + from, attach_location + to)
            .is_some()
        {
            return None;
        }
    }

    Some(Transform::from_translation(attach_location).with_rotation(attach_rotation))
}
